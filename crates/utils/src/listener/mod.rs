use tokio::sync::watch;

use crate::listener::limiter::ConcurrencyLimiter;

pub mod limiter;

/// Identifies one bound listener (e.g. a TCP port) and the protocol it
/// speaks.
pub struct ServerInstance {
    pub id: String,
    pub listener_id: u16,
    pub protocol: ServerProtocol,
    pub hostname: String,
    pub data: String,
    pub is_tls_implicit: bool,
    pub limiter: ConcurrencyLimiter,
    pub shutdown_rx: watch::Receiver<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerProtocol {
    Lmtp,
    Smtp,
}

impl ServerInstance {
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}
