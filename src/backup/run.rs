use std::error::Error;

use jiff::civil::Date;
use log::{debug, error, info, warn};

use crate::{
    archive::Archive,
    backup::{
        BackupError, DownloadReport, LogProgress, RemoteSession, build_snapshot,
        delete_messages_before, download, list_folders,
    },
};

/// Which folders a backup run covers and whether it prunes the server afterwards.
#[derive(Debug, Default, Clone)]
pub struct BackupPlan {
    /// Folders to back up, all listed folders if empty.
    pub folders: Vec<String>,
    /// Delete messages dated before this day once their folder is archived.
    pub cutoff: Option<Date>,
}

#[derive(Debug)]
pub enum FolderOutcome {
    Archived {
        report: DownloadReport,
        /// Messages deleted from the server, `None` if retention did not run.
        deleted: Option<usize>,
    },
    Restored {
        messages: usize,
    },
    Skipped(BackupError),
    Failed(BackupError),
}

#[derive(Debug)]
pub struct FolderResult {
    pub folder: String,
    pub outcome: FolderOutcome,
}

impl FolderResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, FolderOutcome::Failed(_))
    }
}

/// Backs up every folder of `plan`, one after the other.
///
/// Folder level errors are recorded in the returned results. Errors that leave the session or
/// the archive unusable end the run.
pub async fn run_backup<S: RemoteSession>(
    session: &mut S,
    archive: &Archive,
    plan: &BackupPlan,
) -> Result<Vec<FolderResult>, BackupError> {
    let listed = list_folders(session).await?;
    let folders = if plan.folders.is_empty() {
        listed
    } else {
        for folder in plan.folders.iter().filter(|f| !listed.contains(f)) {
            debug!("{folder} was not listed by the server");
        }
        plan.folders.clone()
    };

    let mut results = Vec::with_capacity(folders.len());
    for folder in folders {
        let outcome = match backup_folder(session, archive, &folder, plan.cutoff).await {
            Ok(outcome) => outcome,
            Err(e) => settle(&folder, e)?,
        };
        results.push(FolderResult { folder, outcome });
    }
    Ok(results)
}

async fn backup_folder<S: RemoteSession>(
    session: &mut S,
    archive: &Archive,
    folder: &str,
    cutoff: Option<Date>,
) -> Result<FolderOutcome, BackupError> {
    let snapshot = build_snapshot(session, folder).await?;
    let mut store = archive.folder(folder)?;
    let mut progress = LogProgress::new(folder, snapshot.total_size());
    let report = download(session, &snapshot, &mut store, &mut progress).await?;
    debug!(
        "{folder}: {} of {} listed bytes transferred",
        progress.transferred(),
        snapshot.total_size()
    );

    let snapshot = snapshot.resolved(report.offsets());
    for message in snapshot.unresolved() {
        debug!(
            "{folder}: message {} (uid {}) was listed but is not archived",
            message.seq_num(),
            message.uid()
        );
    }

    let deleted = match cutoff {
        Some(cutoff) if report.is_complete() => {
            Some(delete_messages_before(session, folder, cutoff).await?)
        }
        Some(_) => {
            warn!("{folder}: not every message could be archived, skipping retention");
            None
        }
        None => None,
    };
    Ok(FolderOutcome::Archived { report, deleted })
}

/// Uploads archived folders back to the server.
///
/// Every archived folder is restored if `folders` is empty. Messages are appended in archive
/// order without checking what the server already has.
pub async fn restore_folders<S: RemoteSession>(
    session: &mut S,
    archive: &Archive,
    folders: &[String],
) -> Result<Vec<FolderResult>, BackupError> {
    let archived = archive.folders()?;
    let folders: Vec<String> = if folders.is_empty() {
        archived
    } else {
        folders
            .iter()
            .filter(|folder| {
                let known = archived.contains(folder);
                if !known {
                    warn!("{folder} has no archived messages, nothing to restore");
                }
                known
            })
            .cloned()
            .collect()
    };

    let mut results = Vec::with_capacity(folders.len());
    for folder in folders {
        let outcome = match restore_folder(session, archive, &folder).await {
            Ok(messages) => FolderOutcome::Restored { messages },
            Err(e) => settle(&folder, e)?,
        };
        results.push(FolderResult { folder, outcome });
    }
    Ok(results)
}

async fn restore_folder<S: RemoteSession>(
    session: &mut S,
    archive: &Archive,
    folder: &str,
) -> Result<usize, BackupError> {
    let store = archive.folder(folder)?;
    let entries = store.entries()?;
    for entry in &entries {
        let message = store.read(entry)?;
        session.append(folder, &message).await?;
    }
    info!("{folder}: restored {} messages", entries.len());
    Ok(entries.len())
}

/// Turns a folder error into its outcome, or hands it back if the run cannot go on.
fn settle(folder: &str, error: BackupError) -> Result<FolderOutcome, BackupError> {
    if error.is_fatal() {
        error!("{folder}: {}, stopping", describe(&error));
        return Err(error);
    }
    if let BackupError::NotFound { .. } = error {
        warn!("skipping {}", describe(&error));
        Ok(FolderOutcome::Skipped(error))
    } else {
        error!("{folder}: {}", describe(&error));
        Ok(FolderOutcome::Failed(error))
    }
}

fn describe(error: &dyn Error) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}
