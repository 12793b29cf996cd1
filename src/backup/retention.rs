use jiff::civil::Date;
use log::{debug, info, warn};

use crate::{
    backup::{BackupError, RemoteSession, select_folder},
    repository::SequenceSet,
};

/// Deletes every message of `folder` dated before `cutoff` from the server.
///
/// Only call this after a successful download of `folder` under its current uid validity,
/// nothing here checks that the deleted messages are archived.
pub async fn delete_messages_before<S: RemoteSession>(
    session: &mut S,
    folder: &str,
    cutoff: Date,
) -> Result<usize, BackupError> {
    let selection = select_folder(session, folder).await?;
    if selection.exists() == 0 {
        debug!("{folder} is empty, nothing to delete");
        return Ok(0);
    }
    if selection.readonly() {
        warn!("{folder} is read-only, not deleting messages before {cutoff}");
        return Ok(0);
    }

    let uids = session.uid_search_before(cutoff).await?;
    let Ok(set) = SequenceSet::try_from(uids.as_slice()) else {
        debug!("{folder}: no messages before {cutoff}");
        return Ok(0);
    };
    session.uid_store_deleted(&set).await?;
    session.expunge().await?;

    let deleted = set.len();
    info!("{folder}: deleted {deleted} messages before {cutoff}");
    Ok(deleted)
}
