//! Collaborator-facing errors (spec.md §7). Handler-level errors never
//! propagate past the command that raised them — every variant here is
//! converted to exactly one reply (or one per recipient) by the caller that
//! catches it.

use directory::DirectoryError;
use store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("payload sink I/O error: {0}")]
    Spill(#[from] std::io::Error),

    #[error("proxy dispatch failed: {0}")]
    Proxy(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Privilege(#[from] utils::privilege::PrivilegeError),
}
