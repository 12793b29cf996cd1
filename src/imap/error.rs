use std::io;

use imap_proto::Status;
use thiserror::Error;
use tokio_native_tls::native_tls;

#[derive(Debug, Error)]
pub enum ImapError {
    #[error("connection to server failed")]
    Io(#[from] io::Error),
    #[error("tls handshake failed")]
    Tls(#[from] native_tls::Error),
    #[error("server greeting was not OK: {0}")]
    Greeting(String),
    #[error("{command} rejected by server: {information}")]
    No {
        command: &'static str,
        information: String,
    },
    #[error("{command} reported as malformed by server: {information}")]
    Bad {
        command: &'static str,
        information: String,
    },
    #[error("connection closed before {command} completed")]
    Closed { command: &'static str },
    #[error("unexpected response to {command}: {response}")]
    Unexpected {
        command: &'static str,
        response: String,
    },
}

impl ImapError {
    /// Whether the session is unusable after this error.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Greeting(_) | Self::Closed { .. }
        )
    }
}

/// Maps the status of a tagged completion to `Ok` or the matching error.
pub fn completion(
    command: &'static str,
    status: &Status,
    information: Option<&str>,
) -> Result<(), ImapError> {
    let information = || information.unwrap_or_default().to_owned();
    match status {
        Status::Ok => Ok(()),
        Status::No => Err(ImapError::No {
            command,
            information: information(),
        }),
        Status::Bad => Err(ImapError::Bad {
            command,
            information: information(),
        }),
        _ => Err(ImapError::Unexpected {
            command,
            response: format!("{status:?} {}", information()),
        }),
    }
}
