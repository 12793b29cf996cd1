//! The backup engine: folder listing, snapshots, download into the archive and retention.
//!
//! The engine only talks to the server through [`RemoteSession`] and to the archive through
//! [`MessageStore`](crate::archive::MessageStore), one folder at a time.

mod catalog;
mod download;
#[cfg(test)]
pub mod fake_server;
mod progress;
mod retention;
mod run;
mod snapshot;

use jiff::civil::Date;
use thiserror::Error;

use crate::{
    archive::StoreError,
    imap::{FetchItem, ImapError, MessageInfo, Selection},
    repository::{SequenceSet, Uid, UidValidity},
};

pub use catalog::list_folders;
pub use download::DownloadReport;
pub use download::download;
pub use progress::LogProgress;
pub use progress::Progress;
pub use retention::delete_messages_before;
pub use run::BackupPlan;
pub use run::FolderOutcome;
pub use run::FolderResult;
pub use run::restore_folders;
pub use run::run_backup;
pub use snapshot::FolderSnapshot;
pub use snapshot::MessageMeta;
pub use snapshot::build_snapshot;

/// A connected, authenticated session with a single selected folder at a time.
pub trait RemoteSession {
    type Messages<'a>: MessageStream
    where
        Self: 'a;

    async fn list_folders(&mut self, pattern: &str) -> Result<Vec<String>, ImapError>;

    /// Makes `folder` the selected folder. A missing folder is reported as [`ImapError::No`].
    async fn select(&mut self, folder: &str) -> Result<Selection, ImapError>;

    async fn fetch_metadata(&mut self, set: &SequenceSet) -> Result<Vec<MessageInfo>, ImapError>;

    /// Starts fetching UID, size, envelope and body of every message in `set`.
    fn fetch_full(&mut self, set: &SequenceSet) -> Self::Messages<'_>;

    async fn uid_search_before(&mut self, date: Date) -> Result<Vec<Uid>, ImapError>;

    async fn uid_store_deleted(&mut self, uids: &SequenceSet) -> Result<(), ImapError>;

    async fn expunge(&mut self) -> Result<(), ImapError>;

    async fn append(&mut self, folder: &str, message: &[u8]) -> Result<(), ImapError>;
}

/// Messages of a running fetch. Must be closed to release the session.
pub trait MessageStream {
    async fn next_message(&mut self) -> Option<Result<Vec<FetchItem>, ImapError>>;

    /// Discards unread messages and reports how the fetch completed.
    async fn close(self) -> Result<(), ImapError>;
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("server command failed")]
    Protocol(#[from] ImapError),
    #[error("folder {folder} does not exist or is not accessible")]
    NotFound {
        folder: String,
        #[source]
        source: ImapError,
    },
    #[error("uid validity of {folder} changed from {expected} to {found}")]
    Consistency {
        folder: String,
        expected: UidValidity,
        found: UidValidity,
    },
    #[error("archiving failed")]
    Storage(#[from] StoreError),
}

impl BackupError {
    /// Whether the run has to stop instead of going on with the next folder.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_connection_failure(),
            Self::Storage(_) => true,
            Self::NotFound { .. } | Self::Consistency { .. } => false,
        }
    }
}

/// Selects `folder`, reporting a rejected `SELECT` as [`BackupError::NotFound`].
async fn select_folder<S: RemoteSession>(
    session: &mut S,
    folder: &str,
) -> Result<Selection, BackupError> {
    match session.select(folder).await {
        Ok(selection) => Ok(selection),
        Err(source @ ImapError::No { .. }) => Err(BackupError::NotFound {
            folder: folder.to_owned(),
            source,
        }),
        Err(e) => Err(e.into()),
    }
}
