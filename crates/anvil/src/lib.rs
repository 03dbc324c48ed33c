/*
 * Copyright (c) 2023 Stalwart Labs Ltd.
 *
 * This file is part of Stalwart Mail Server.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 * You can be released from the requirements of the AGPLv3 license by
 * purchasing a commercial license. Please contact licensing@stalw.art
 * for more details.
*/

//! The per-user concurrency registry (the "Anvil" of the GLOSSARY): a
//! process-wide ledger enforcing a per-user concurrent-session cap, queried
//! with a `LOOKUP\t<service>/<escaped-user>` message (spec.md §4.3, §6).
//! Backed by a `DashMap`-per-key atomic counter.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

/// Build the exact query string spec.md §4.3 names: `LOOKUP\t<service>/<escaped-username>`.
pub fn lookup_query(service: &str, username: &str) -> String {
    format!("LOOKUP\t{service}/{}", escape_username(username))
}

/// Escape the characters that would otherwise be ambiguous in the
/// `service/user` key (tabs and slashes), mirroring the original's
/// conservative escaping of the anvil key.
fn escape_username(username: &str) -> String {
    let mut escaped = String::with_capacity(username.len());
    for c in username.chars() {
        match c {
            '/' => escaped.push_str("%2F"),
            '\t' => escaped.push_str("%09"),
            '%' => escaped.push_str("%25"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[async_trait]
pub trait ConcurrencyRegistry: Send + Sync {
    /// Issue a `LOOKUP` query for `service`/`username` and await whether
    /// another concurrent session is permitted. This is one of the
    /// suspension points of spec.md §5: the caller must detach its reader
    /// while awaiting the reply.
    async fn query(&self, service: &str, username: &str) -> bool;

    /// Release a slot previously granted by `query`. Called once the
    /// session that held it ends.
    fn release(&self, service: &str, username: &str);
}

/// An in-process reference registry: each `service/user` key gets an atomic
/// counter capped at `max_per_user`. Good enough for a single-process
/// deployment and for the engine's own tests; a production anvil would be a
/// separate daemon queried over a socket, which is out of scope here (the
/// wire protocol to it is fixed, not its internals).
pub struct InProcessAnvil {
    max_per_user: usize,
    counts: DashMap<String, AtomicUsize>,
}

impl InProcessAnvil {
    pub fn new(max_per_user: usize) -> Self {
        InProcessAnvil {
            max_per_user,
            counts: DashMap::new(),
        }
    }

    fn key(service: &str, username: &str) -> String {
        format!("{service}/{}", escape_username(username))
    }
}

#[async_trait]
impl ConcurrencyRegistry for InProcessAnvil {
    async fn query(&self, service: &str, username: &str) -> bool {
        if self.max_per_user == 0 {
            return true;
        }
        let key = Self::key(service, username);
        let entry = self.counts.entry(key).or_insert_with(|| AtomicUsize::new(0));
        let current = entry.fetch_add(1, Ordering::Relaxed) + 1;
        if current <= self.max_per_user {
            true
        } else {
            entry.fetch_sub(1, Ordering::Relaxed);
            false
        }
    }

    fn release(&self, service: &str, username: &str) {
        let key = Self::key(service, username);
        if let Some(entry) = self.counts.get(&key) {
            entry.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_the_lookup_query_verbatim() {
        assert_eq!(lookup_query("lmtp", "alice"), "LOOKUP\tlmtp/alice");
        assert_eq!(lookup_query("lmtp", "a/b"), "LOOKUP\tlmtp/a%2Fb");
    }

    #[tokio::test]
    async fn caps_concurrent_sessions_per_user() {
        let anvil = InProcessAnvil::new(1);
        assert!(anvil.query("lmtp", "alice").await);
        assert!(!anvil.query("lmtp", "alice").await);
        anvil.release("lmtp", "alice");
        assert!(anvil.query("lmtp", "alice").await);
    }

    #[tokio::test]
    async fn zero_means_unlimited() {
        let anvil = InProcessAnvil::new(0);
        for _ in 0..50 {
            assert!(anvil.query("lmtp", "bob").await);
        }
    }
}
