use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::{
    rawmail::RawMessageView, DeliveryAddressPolicy, DeliveryHandle, DeliveryOutcome, MailStore,
    ResolvedUser, StoreError, UserLookup,
};

/// An in-process mailbox store: good enough to run the engine's own tests
/// without a real maildir/database backend.
pub struct MemoryStore {
    temp_dir: PathBuf,
    users: RwLock<HashMap<String, ResolvedUser>>,
    erroring: RwLock<std::collections::HashSet<String>>,
    delivered: Mutex<Vec<(String, Vec<u8>)>>,
    next_handle: AtomicU64,
}

impl MemoryStore {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        MemoryStore {
            temp_dir: temp_dir.into(),
            users: RwLock::new(HashMap::new()),
            erroring: RwLock::new(std::collections::HashSet::new()),
            delivered: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn add_user(&self, username: impl Into<String>, uid: u32, gid: u32) {
        self.users.write().insert(
            username.into(),
            ResolvedUser {
                uid,
                gid,
                home_dir: self.temp_dir.clone(),
                delivery_address_policy: DeliveryAddressPolicy::default(),
            },
        );
    }

    pub fn fail_delivery_for(&self, username: impl Into<String>) {
        self.erroring.write().insert(username.into());
    }

    pub fn delivered_messages(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl MailStore for MemoryStore {
    async fn lookup_user(&self, username: &str) -> Result<UserLookup, StoreError> {
        if self.erroring.read().contains(username) {
            return Err(StoreError {
                username: username.to_string(),
                reason: "simulated storage failure".to_string(),
            });
        }
        Ok(match self.users.read().get(username) {
            Some(user) => UserLookup::Found(user.clone()),
            None => UserLookup::NotFound,
        })
    }

    async fn deliver(
        &self,
        _user: &ResolvedUser,
        message: &RawMessageView,
        _reused_from: Option<&DeliveryHandle>,
    ) -> (DeliveryOutcome, Option<DeliveryHandle>) {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.delivered.lock().push((
            message.header("to").unwrap_or_default().to_string(),
            Vec::new(),
        ));
        (DeliveryOutcome::Accepted, Some(DeliveryHandle { id }))
    }

    fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}
