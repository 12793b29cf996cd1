use log::debug;

use crate::backup::{BackupError, RemoteSession};

/// All folders of the account, sorted by name.
pub async fn list_folders<S: RemoteSession>(session: &mut S) -> Result<Vec<String>, BackupError> {
    let mut folders = session.list_folders("*").await?;
    folders.sort_unstable();
    folders.dedup();
    debug!("server lists {} folders", folders.len());
    Ok(folders)
}
