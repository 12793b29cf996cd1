use derive_builder::Builder;
use derive_getters::Getters;
use futures::StreamExt as _;
use imap_proto::{AttributeValue, MailboxDatum, Response, ResponseCode, Status};
use jiff::civil::Date;
use log::{debug, trace};

use crate::{
    backup::RemoteSession,
    imap::{
        ImapError,
        connection::{ContinuationCommand as _, SendCommand},
        error::completion,
        fetch::FetchStream,
    },
    repository::{SequenceSet, Uid, UidValidity},
};

/// State of a mailbox right after `SELECT`.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Getters)]
pub struct Selection {
    name: String,
    #[getter(skip)]
    uid_validity: UidValidity,
    exists: u32,
    #[builder(default)]
    readonly: bool,
}

/// Result of the cheap metadata pass over a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct MessageInfo {
    seq_num: u32,
    #[getter(skip)]
    uid: Uid,
    size: u32,
}

impl Selection {
    pub fn uid_validity(&self) -> UidValidity {
        self.uid_validity
    }
}

impl MessageInfo {
    pub fn new(seq_num: u32, uid: Uid, size: u32) -> Self {
        Self { seq_num, uid, size }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }
}

/// An authenticated connection.
#[derive(Debug)]
pub struct Session<T: SendCommand> {
    connection: T,
}

impl<T: SendCommand> Session<T> {
    pub fn new(connection: T) -> Self {
        Self { connection }
    }

    #[cfg(test)]
    pub fn connection(&self) -> &T {
        &self.connection
    }

    pub async fn logout(mut self) -> Result<(), ImapError> {
        self.run("LOGOUT", "LOGOUT".to_owned(), |_| Ok(())).await
    }

    /// Sends `command` and hands every response to `on_response` until the tagged completion.
    ///
    /// The first error returned by `on_response` is reported after the command completed, so
    /// the connection is always left ready for the next command.
    async fn run(
        &mut self,
        name: &'static str,
        command: String,
        mut on_response: impl FnMut(&Response<'_>) -> Result<(), ImapError>,
    ) -> Result<(), ImapError> {
        debug!("{command}");
        let mut responses = self.connection.send(command);
        let mut failure = None;
        while let Some(response) = responses.next().await {
            let response = response?;
            let parsed = response.parsed();
            if failure.is_none() {
                failure = on_response(parsed).err();
            }
            if let Response::Done {
                status,
                information,
                ..
            } = parsed
            {
                completion(name, status, information.as_deref())?;
                return failure.map_or(Ok(()), Err);
            }
        }
        Err(ImapError::Closed { command: name })
    }
}

impl<T: SendCommand> RemoteSession for Session<T> {
    type Messages<'a>
        = FetchStream<T::Responses<'a>>
    where
        Self: 'a;

    async fn list_folders(&mut self, pattern: &str) -> Result<Vec<String>, ImapError> {
        let mut folders = Vec::new();
        self.run("LIST", format!("LIST \"\" {}", quoted(pattern)), |response| {
            if let Response::MailboxData(MailboxDatum::List { name, .. }) = response {
                folders.push(name.to_string());
            }
            Ok(())
        })
        .await?;
        Ok(folders)
    }

    async fn select(&mut self, folder: &str) -> Result<Selection, ImapError> {
        let mut selection = SelectionBuilder::default();
        selection.name(folder.to_owned());
        self.run("SELECT", format!("SELECT {}", quoted(folder)), |response| {
            match response {
                Response::MailboxData(MailboxDatum::Exists(exists)) => {
                    selection.exists(*exists);
                }
                Response::Data {
                    status: Status::Ok,
                    code: Some(ResponseCode::UidValidity(validity)),
                    ..
                } => {
                    let validity =
                        UidValidity::try_from(validity).map_err(|e| ImapError::Unexpected {
                            command: "SELECT",
                            response: e.to_owned(),
                        })?;
                    selection.uid_validity(validity);
                }
                Response::Done {
                    code: Some(ResponseCode::ReadOnly),
                    ..
                } => {
                    selection.readonly(true);
                }
                _ => trace!("ignoring response to SELECT: {response:?}"),
            }
            Ok(())
        })
        .await?;
        let selection = selection.build().map_err(|e| ImapError::Unexpected {
            command: "SELECT",
            response: e.to_string(),
        })?;
        trace!("selection = {selection:?}");
        Ok(selection)
    }

    async fn fetch_metadata(&mut self, set: &SequenceSet) -> Result<Vec<MessageInfo>, ImapError> {
        let mut messages = Vec::with_capacity(set.len());
        self.run("FETCH", format!("FETCH {set} (UID RFC822.SIZE)"), |response| {
            let Response::Fetch(seq_num, attributes) = response else {
                return Ok(());
            };
            let mut uid = None;
            let mut size = None;
            for attribute in attributes {
                match attribute {
                    AttributeValue::Uid(value) => uid = Uid::try_from(value).ok(),
                    AttributeValue::Rfc822Size(value) => size = Some(*value),
                    _ => {}
                }
            }
            match (uid, size) {
                (Some(uid), Some(size)) => messages.push(MessageInfo::new(*seq_num, uid, size)),
                // unsolicited flag update
                (None, None) => trace!("ignoring fetch response {attributes:?}"),
                _ => {
                    return Err(ImapError::Unexpected {
                        command: "FETCH",
                        response: format!("{seq_num} {attributes:?}"),
                    });
                }
            }
            Ok(())
        })
        .await?;
        Ok(messages)
    }

    fn fetch_full(&mut self, set: &SequenceSet) -> Self::Messages<'_> {
        let command = format!("FETCH {set} (UID RFC822.SIZE ENVELOPE BODY.PEEK[])");
        debug!("{command}");
        FetchStream::new(self.connection.send(command))
    }

    async fn uid_search_before(&mut self, date: Date) -> Result<Vec<Uid>, ImapError> {
        let mut uids = Vec::new();
        let command = format!("UID SEARCH BEFORE {}", date.strftime("%d-%b-%Y"));
        self.run("SEARCH", command, |response| {
            if let Response::MailboxData(MailboxDatum::Search(found)) = response {
                uids.extend(found.iter().filter_map(|uid| Uid::try_from(uid).ok()));
            }
            Ok(())
        })
        .await?;
        Ok(uids)
    }

    async fn uid_store_deleted(&mut self, uids: &SequenceSet) -> Result<(), ImapError> {
        let command = format!("UID STORE {uids} +FLAGS.SILENT (\\Deleted)");
        self.run("STORE", command, |_| Ok(())).await
    }

    async fn expunge(&mut self) -> Result<(), ImapError> {
        let mut expunged = 0usize;
        self.run("EXPUNGE", "EXPUNGE".to_owned(), |response| {
            if let Response::Expunge(_) = response {
                expunged += 1;
            }
            Ok(())
        })
        .await?;
        debug!("server expunged {expunged} messages");
        Ok(())
    }

    async fn append(&mut self, folder: &str, message: &[u8]) -> Result<(), ImapError> {
        let command = format!("APPEND {} {{{}}}", quoted(folder), message.len());
        debug!("{command}");
        let mut responses = self.connection.send(command);
        while let Some(response) = responses.next().await {
            let response = response?;
            match response.parsed() {
                Response::Continue { .. } => responses.send(message).await?,
                Response::Done {
                    status,
                    information,
                    ..
                } => return completion("APPEND", status, information.as_deref()),
                other => trace!("ignoring response to APPEND: {other:?}"),
            }
        }
        Err(ImapError::Closed { command: "APPEND" })
    }
}

/// Renders `value` as an IMAP quoted string.
pub fn quoted(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
