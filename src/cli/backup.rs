use std::path::Path;

use anyhow::{Context as _, Result};
use jiff::civil::Date;
use log::info;

use crate::{
    archive::Archive,
    backup::{BackupPlan, FolderOutcome, run_backup},
    cli::{login, logout, runtime, summarize},
    config::AccountConfig,
};

pub fn backup(
    account: &AccountConfig,
    archive_dir: &Path,
    folders: Vec<String>,
    cutoff: Option<Date>,
) -> Result<()> {
    let archive = Archive::open(archive_dir)
        .with_context(|| format!("opening archive at {} failed", archive_dir.display()))?;
    let folders = if folders.is_empty() {
        account.folders().map(<[String]>::to_vec).unwrap_or_default()
    } else {
        folders
    };
    let plan = BackupPlan { folders, cutoff };

    let results = runtime()?.block_on(async {
        let mut session = login(account).await?;
        let results = run_backup(&mut session, &archive, &plan).await?;
        logout(session).await;
        anyhow::Ok(results)
    })?;

    let (appended, deleted) = results
        .iter()
        .fold((0, 0), |(appended, deleted), result| match &result.outcome {
            FolderOutcome::Archived { report, deleted: d } => {
                (appended + report.appended(), deleted + d.unwrap_or_default())
            }
            _ => (appended, deleted),
        });
    info!(
        "backup finished: {} folders, {appended} new messages, {deleted} deleted from server",
        results.len()
    );
    summarize(&results)
}
