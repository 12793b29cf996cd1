use futures::stream::StreamExt as _;
use imap_proto::{Response, Status};
use log::{debug, trace};
use thiserror::Error;

use crate::imap::{
    ImapError,
    connection::{Connection, SendCommand},
    error::completion,
    session::{Session, quoted},
};

pub struct Client<T: SendCommand> {
    connection: T,
}

impl Client<Connection> {
    pub async fn connect(host: &str, port: u16) -> Result<Self, ImapError> {
        let (connection, greeting) = Connection::connect_to(host, port).await?;
        match greeting.parsed() {
            Response::Data {
                status: Status::Ok,
                information,
                ..
            } => {
                debug!("server greeting: {}", information.as_deref().unwrap_or_default());
                Ok(Self::new(connection))
            }
            other => Err(ImapError::Greeting(format!("{other:?}"))),
        }
    }
}

impl<T: SendCommand> Client<T> {
    pub fn new(connection: T) -> Self {
        Self { connection }
    }

    pub async fn login(mut self, username: &str, password: &str) -> Result<Session<T>, LoginError> {
        debug!("LOGIN <user> <password>");
        let command = format!("LOGIN {} {}", quoted(username), quoted(password));
        let mut responses = self.connection.send(command);
        while let Some(response) = responses.next().await {
            let response = response.map_err(ImapError::from)?;
            if let Response::Done {
                status,
                code,
                information,
                ..
            } = response.parsed()
            {
                trace!("{code:?}");
                return match completion("LOGIN", status, information.as_deref()) {
                    Ok(()) => {
                        drop(responses);
                        Ok(Session::new(self.connection))
                    }
                    Err(ImapError::No { .. }) => Err(LoginError::Rejected),
                    Err(e) => Err(e.into()),
                };
            }
        }
        Err(ImapError::Closed { command: "LOGIN" }.into())
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("username or password rejected")]
    Rejected,
    #[error(transparent)]
    Imap(#[from] ImapError),
}
