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

//! The mailbox storage collaborator interface (spec.md §4.6, §6).
//!
//! How mailboxes are actually written to disk is a Non-goal (spec.md §1).
//! This crate fixes the shape of the lookup + delivery interface the engine
//! depends on, the `wanted header list` raw-mail view it reads, and the
//! unlinked-temp-file spill primitive used by Payload Ingest (spec.md §4.4) —
//! plus a reference in-memory implementation (`MemoryStore`) for tests.

pub mod memory;
pub mod rawmail;
pub mod spill;

use async_trait::async_trait;

/// How the `Delivered-To:` trace header (spec.md §4.5) should be filled in
/// for a single-recipient delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryAddressPolicy {
    /// Use the recipient's effective (post-routing) address.
    Final,
    /// Use the ORCPT from the RCPT parameters if present, else the effective
    /// address.
    #[default]
    Original,
    /// Omit the header.
    None,
}

#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub uid: u32,
    pub gid: u32,
    pub home_dir: std::path::PathBuf,
    pub delivery_address_policy: DeliveryAddressPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    NotFound,
    Found(ResolvedUser),
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("mailbox store error for {username}: {reason}")]
pub struct StoreError {
    pub username: String,
    pub reason: String,
}

/// Outcome of handing a composed message to local delivery for one
/// recipient, already mapped onto the reply classes spec.md §4.6 defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Accepted,
    TemporaryFailure(String),
    PermanentFailure(String),
}

#[async_trait]
pub trait MailStore: Send + Sync {
    async fn lookup_user(&self, username: &str) -> Result<UserLookup, StoreError>;

    /// Deliver `message` (the composed trace headers + body) to `user`.
    /// `reused_from` is `Some` when an earlier recipient's successful save
    /// can be used as a server-side copy source instead of re-parsing the
    /// message (spec.md §4.6).
    async fn deliver(
        &self,
        user: &ResolvedUser,
        message: &rawmail::RawMessageView,
        reused_from: Option<&DeliveryHandle>,
    ) -> (DeliveryOutcome, Option<DeliveryHandle>);

    /// Directory new unlinked spill files are created under.
    fn temp_dir(&self) -> &std::path::Path;
}

/// Opaque handle to a successfully saved message, reusable as a copy source
/// for subsequent recipients in the same envelope.
#[derive(Debug, Clone)]
pub struct DeliveryHandle {
    pub id: u64,
}
