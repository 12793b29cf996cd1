mod archive;
mod backup;
mod cli;
mod config;
mod imap;
mod logging;
mod repository;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jiff::civil::Date;

use config::Config;

/// Backs up the folders of an IMAP account into local mbox archives.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file, defaults to `$XDG_CONFIG_HOME/imapbackup/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    account: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the folders of the account.
    Folders,
    /// Archive new messages and optionally delete old ones from the server.
    Backup {
        /// Only back up this folder, may be repeated.
        #[arg(short, long = "folder")]
        folders: Vec<String>,
        /// Delete archived messages dated before this day (YYYY-MM-DD).
        #[arg(long, conflicts_with = "keep_days")]
        prune_before: Option<Date>,
        /// Delete archived messages older than this many days.
        #[arg(long)]
        keep_days: Option<u32>,
    },
    /// Upload archived messages back to the server.
    Restore {
        /// Only restore this folder, may be repeated.
        #[arg(short, long = "folder")]
        folders: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(Some(&args.account));

    let config = Config::load_from_file(args.config.as_deref())?;
    let account = config.account(&args.account)?;
    let archive_dir = config.archive_dir(&args.account)?;

    match args.command {
        Command::Folders => cli::folders(account),
        Command::Backup {
            folders,
            prune_before,
            keep_days,
        } => {
            let cutoff = match (prune_before, keep_days.or(account.retention_days())) {
                (Some(date), _) => Some(date),
                (None, Some(days)) => Some(cli::cutoff(days)?),
                (None, None) => None,
            };
            cli::backup(account, &archive_dir, folders, cutoff)
        }
        Command::Restore { folders } => cli::restore(account, &archive_dir, &folders),
    }
}
