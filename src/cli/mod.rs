mod backup;
mod folders;
mod restore;

use anyhow::{Context as _, Result};
use jiff::{Span, Zoned, civil::Date};
use log::{info, warn};
use tokio::runtime::Runtime;

pub use backup::backup;
pub use folders::folders;
pub use restore::restore;

use crate::{
    backup::FolderResult,
    config::{AccountConfig, AuthConfig},
    imap::{Client, Connection, Session},
};

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("tokio runtime should be buildable")
}

async fn login(account: &AccountConfig) -> Result<Session<Connection>> {
    let AuthConfig::Plain(auth) = account.auth();
    let password = auth.password()?;
    let client = Client::connect(account.host(), account.port())
        .await
        .with_context(|| format!("connecting to {}:{} failed", account.host(), account.port()))?;
    let session = client
        .login(auth.user(), &password)
        .await
        .with_context(|| format!("login of {} failed", auth.user()))?;
    info!("logged in to {} as {}", account.host(), auth.user());
    Ok(session)
}

async fn logout(session: Session<Connection>) {
    if let Err(e) = session.logout().await {
        warn!("logout failed: {e}");
    }
}

/// The day before which messages are old enough to be deleted from the server.
pub fn cutoff(keep_days: u32) -> Result<Date> {
    Span::new()
        .try_days(i64::from(keep_days))
        .and_then(|span| Zoned::now().date().checked_sub(span))
        .with_context(|| format!("cannot keep {keep_days} days"))
}

/// Fails if any folder failed, after logging the failed folders.
fn summarize(results: &[FolderResult]) -> Result<()> {
    let failed: Vec<&str> = results
        .iter()
        .filter(|result| result.is_failure())
        .map(|result| result.folder.as_str())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} of {} folders failed: {}", failed.len(), results.len(), failed.join(", "))
    }
}
