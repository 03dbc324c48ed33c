use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// A concurrency gate shared by every session that increments it. Cloning is
/// cheap (it's an `Arc` around the counter); a guard ([`InFlight`]) is handed
/// back on successful acquisition and decrements the counter on drop, so a
/// session that errors out mid-flight never leaks a slot.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    max_concurrent: usize,
    concurrent: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        ConcurrencyLimiter {
            max_concurrent,
            concurrent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns `None` when unlimited (`max_concurrent == 0`) or once over the
    /// limit. An `Some(InFlight)` must be kept alive for as long as the slot
    /// is in use.
    pub fn is_allowed(&self) -> Option<InFlight> {
        if self.max_concurrent == 0 {
            return Some(InFlight { limiter: None });
        }
        let current = self.concurrent.fetch_add(1, Ordering::Relaxed) + 1;
        if current <= self.max_concurrent {
            Some(InFlight {
                limiter: Some(self.concurrent.clone()),
            })
        } else {
            self.concurrent.fetch_sub(1, Ordering::Relaxed);
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.concurrent.load(Ordering::Relaxed) > 0
    }

    pub fn active_count(&self) -> usize {
        self.concurrent.load(Ordering::Relaxed)
    }
}

/// RAII guard for one concurrency-limited slot.
pub struct InFlight {
    limiter: Option<Arc<AtomicUsize>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(counter) = &self.limiter {
            counter.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
