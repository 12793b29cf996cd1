use std::path::Path;

use anyhow::{Context as _, Result};

use crate::{
    archive::Archive,
    backup::restore_folders,
    cli::{login, logout, runtime, summarize},
    config::AccountConfig,
};

pub fn restore(account: &AccountConfig, archive_dir: &Path, folders: &[String]) -> Result<()> {
    let archive = Archive::open(archive_dir)
        .with_context(|| format!("opening archive at {} failed", archive_dir.display()))?;

    let results = runtime()?.block_on(async {
        let mut session = login(account).await?;
        let results = restore_folders(&mut session, &archive, folders).await?;
        logout(session).await;
        anyhow::Ok(results)
    })?;

    summarize(&results)
}
