use std::{collections::HashMap, net::IpAddr};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{ConnectionInfo, Directory, DirectoryError, PassdbField, PassdbResult};

/// An in-process passdb, the reference implementation used by the engine's
/// own tests and small deployments that don't need a real directory server.
#[derive(Default)]
pub struct MemoryDirectory {
    records: RwLock<HashMap<String, Vec<PassdbField>>>,
    /// Usernames that should fail the lookup outright (simulates a transient
    /// backend error for tests).
    erroring: RwLock<std::collections::HashSet<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&self, username: impl Into<String>, fields: Vec<PassdbField>) {
        self.records.write().insert(username.into(), fields);
    }

    pub fn add_proxy_user(
        &self,
        username: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) {
        self.add_record(
            username,
            vec![
                ("proxy".into(), "1".into()),
                ("host".into(), host.into()),
                ("port".into(), port.to_string()),
            ],
        );
    }

    pub fn fail_lookups_for(&self, username: impl Into<String>) {
        self.erroring.write().insert(username.into());
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn lookup_passdb(
        &self,
        username: &str,
        _conn: &ConnectionInfo,
    ) -> Result<PassdbResult, DirectoryError> {
        if self.erroring.read().contains(username) {
            return Err(DirectoryError {
                username: username.to_string(),
                reason: "simulated backend failure".to_string(),
            });
        }
        Ok(match self.records.read().get(username) {
            Some(fields) => PassdbResult::Found(fields.clone()),
            None => PassdbResult::NotFound,
        })
    }
}

pub fn test_connection() -> ConnectionInfo {
    ConnectionInfo {
        local_ip: IpAddr::from([127, 0, 0, 1]),
        local_port: 24,
        remote_ip: IpAddr::from([127, 0, 0, 1]),
        remote_port: 0,
        service: "lmtp".to_string(),
    }
}
