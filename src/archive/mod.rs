mod folder_name;
mod index;
mod mbox;
mod store;

use std::io;

use jiff::Timestamp;
use thiserror::Error;

use crate::repository::{Uid, UidValidity};

pub use store::Archive;

/// A message handed to a [`MessageStore`].
#[derive(Debug, Clone, Copy)]
pub struct ArchiveRecord<'a> {
    pub uid_validity: UidValidity,
    pub uid: Uid,
    pub sender: Option<&'a str>,
    pub date: Option<Timestamp>,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    Written { offset: u64 },
    AlreadyArchived { offset: u64 },
}

impl Appended {
    pub fn offset(self) -> u64 {
        match self {
            Self::Written { offset } | Self::AlreadyArchived { offset } => offset,
        }
    }
}

/// Durable, append-only storage for the messages of one folder.
pub trait MessageStore {
    /// Stores `record` unless its `(uid_validity, uid)` is already archived.
    fn append(&mut self, record: &ArchiveRecord<'_>) -> Result<Appended, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("archive file access failed")]
    Io(#[from] io::Error),
    #[error("archive index failed")]
    Sqlite(#[from] rusqlite::Error),
    #[error("archive index could not be migrated")]
    Migration(#[from] rusqlite_migration::Error),
    #[error("folder {folder} is locked by another process")]
    Locked { folder: String },
    #[error("archive of {folder} is corrupt at offset {offset}: {reason}")]
    Corrupt {
        folder: String,
        offset: u64,
        reason: &'static str,
    },
}
