use std::{borrow::Cow, io};

use bytes::Bytes;
use futures::{Stream, StreamExt as _};
use imap_proto::{Address, AttributeValue, Envelope, Response};
use jiff::{Timestamp, fmt::rfc2822};
use log::{debug, trace, warn};

use crate::{
    backup::MessageStream,
    imap::{
        ImapError,
        connection::ResponseData,
        error::completion,
    },
    repository::Uid,
};

/// One data item of a FETCH response, in the order the server sent it.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    Uid(Uid),
    Size(u32),
    Envelope {
        from: Option<String>,
        date: Option<Timestamp>,
    },
    Body(Bytes),
}

pub fn fetch_items(response: &ResponseData, attributes: &[AttributeValue<'_>]) -> Vec<FetchItem> {
    let mut items = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        match attribute {
            AttributeValue::Uid(uid) => match Uid::try_from(uid) {
                Ok(uid) => items.push(FetchItem::Uid(uid)),
                Err(e) => warn!("ignoring invalid UID in FETCH response: {e}"),
            },
            AttributeValue::Rfc822Size(size) => items.push(FetchItem::Size(*size)),
            AttributeValue::Envelope(envelope) => items.push(envelope_item(envelope)),
            AttributeValue::BodySection {
                section: None,
                data,
                ..
            }
            | AttributeValue::Rfc822(data) => items.push(FetchItem::Body(
                data.as_deref()
                    .map(|data| response.share(data))
                    .unwrap_or_default(),
            )),
            _ => trace!("ignoring fetch attribute {attribute:?}"),
        }
    }
    items
}

fn envelope_item(envelope: &Envelope<'_>) -> FetchItem {
    let from = envelope
        .from
        .as_ref()
        .and_then(|addresses| addresses.first())
        .and_then(address);
    let date = envelope
        .date
        .as_deref()
        .and_then(|date| parse_envelope_date(&String::from_utf8_lossy(date)));
    FetchItem::Envelope { from, date }
}

fn address(address: &Address<'_>) -> Option<String> {
    let lossy = |part: &Cow<'_, [u8]>| String::from_utf8_lossy(part).into_owned();
    match (address.mailbox.as_ref(), address.host.as_ref()) {
        (Some(mailbox), Some(host)) => Some(format!("{}@{}", lossy(mailbox), lossy(host))),
        (Some(mailbox), None) => Some(lossy(mailbox)),
        (None, _) => None,
    }
}

/// Parses an RFC 2822 envelope date. A trailing comment like `(CEST)` is ignored.
pub fn parse_envelope_date(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    let date = match raw.rfind('(') {
        Some(comment) if raw.ends_with(')') => raw[..comment].trim_end(),
        _ => raw,
    };
    match rfc2822::parse(date) {
        Ok(zoned) => Some(zoned.timestamp()),
        Err(e) => {
            debug!("cannot parse envelope date {raw:?}: {e}");
            None
        }
    }
}

/// Messages of a running `FETCH`, one item list per untagged FETCH response.
pub struct FetchStream<R> {
    responses: R,
    done: bool,
}

impl<R> FetchStream<R> {
    pub fn new(responses: R) -> Self {
        Self {
            responses,
            done: false,
        }
    }
}

impl<R> MessageStream for FetchStream<R>
where
    R: Stream<Item = io::Result<ResponseData>> + Unpin,
{
    async fn next_message(&mut self) -> Option<Result<Vec<FetchItem>, ImapError>> {
        if self.done {
            return None;
        }
        while let Some(response) = self.responses.next().await {
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };
            match response.parsed() {
                Response::Fetch(seq_num, attributes) => {
                    let items = fetch_items(&response, attributes);
                    if !items
                        .iter()
                        .any(|item| matches!(item, FetchItem::Uid(_) | FetchItem::Body(_)))
                    {
                        trace!("ignoring flag update for message {seq_num}");
                        continue;
                    }
                    trace!("received message {seq_num}");
                    return Some(Ok(items));
                }
                Response::Done {
                    status,
                    information,
                    ..
                } => {
                    self.done = true;
                    return completion("FETCH", status, information.as_deref())
                        .err()
                        .map(Err);
                }
                other => trace!("ignoring response to FETCH: {other:?}"),
            }
        }
        self.done = true;
        Some(Err(ImapError::Closed { command: "FETCH" }))
    }

    async fn close(mut self) -> Result<(), ImapError> {
        let mut skipped = 0usize;
        while let Some(message) = self.next_message().await {
            message?;
            skipped += 1;
        }
        if skipped > 0 {
            debug!("discarded {skipped} messages while closing FETCH");
        }
        Ok(())
    }
}
