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

//! The passdb collaborator interface (spec.md §4.3, §6).
//!
//! How user records are actually stored is explicitly a Non-goal (spec.md
//! §1); this crate only fixes the shape of the lookup the engine depends on,
//! plus one reference implementation (`MemoryDirectory`) good enough to run
//! the engine and its tests without a database.

pub mod memory;

use std::net::IpAddr;

use async_trait::async_trait;

/// Connection metadata passed alongside a passdb lookup, matching the fields
/// spec.md §4.3 says the lookup carries: "`username` plus connection
/// metadata (local/remote IP+port, service name)".
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub service: String,
}

/// One `key=value` field returned by a passdb record (spec.md §4.3 step 2).
pub type PassdbField = (String, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassdbResult {
    /// `ret == 0`: no record, fall through to the local path.
    NotFound,
    /// A record was found; `fields` are the raw `key=value` pairs.
    Found(Vec<PassdbField>),
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("passdb lookup failed for {username}: {reason}")]
pub struct DirectoryError {
    pub username: String,
    pub reason: String,
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// `ret < 0` in spec.md's terms becomes `Err`, `ret == 0` becomes
    /// `Ok(PassdbResult::NotFound)`, a record becomes
    /// `Ok(PassdbResult::Found(..))`.
    async fn lookup_passdb(
        &self,
        username: &str,
        conn: &ConnectionInfo,
    ) -> Result<PassdbResult, DirectoryError>;
}

/// Looks for `key` in a passdb field list, case-sensitively on the key as
/// the original does.
pub fn field<'a>(fields: &'a [PassdbField], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
