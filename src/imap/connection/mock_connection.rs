use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::BytesMut;
use futures::Stream;
use tokio_util::codec::Decoder as _;

use super::{
    codec::ImapCodec,
    send_command::{ContinuationCommand, Response, SendCommand},
};

/// Replays scripted server output, one chunk of raw response lines per sent command.
///
/// Every chunk runs through the real [`ImapCodec`], so scripts are written exactly as a
/// server would send them. Commands and continuation data are recorded in order.
#[derive(Debug)]
pub struct MockConnection {
    script: VecDeque<&'static str>,
    sent: Vec<String>,
}

impl MockConnection {
    pub fn new(script: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            script: script.into_iter().collect(),
            sent: Vec::new(),
        }
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }
}

impl SendCommand for MockConnection {
    type Responses<'a> = MockResponses<'a>;

    fn send(&mut self, command: String) -> Self::Responses<'_> {
        self.sent.push(command);
        let chunk = self.script.pop_front().unwrap_or_default();
        MockResponses {
            buffer: BytesMut::from(chunk.as_bytes()),
            codec: ImapCodec::default(),
            sent: &mut self.sent,
            done: false,
        }
    }
}

pub struct MockResponses<'a> {
    buffer: BytesMut,
    codec: ImapCodec,
    sent: &'a mut Vec<String>,
    done: bool,
}

impl Stream for MockResponses<'_> {
    type Item = Response;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        let this = &mut *self;
        match this.codec.decode(&mut this.buffer) {
            Ok(Some(data)) => {
                this.done = data.request_id().is_some();
                Poll::Ready(Some(Ok(data)))
            }
            Ok(None) => {
                // script exhausted, behaves like a closed connection
                this.done = true;
                Poll::Ready(None)
            }
            Err(e) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
        }
    }
}

impl ContinuationCommand for MockResponses<'_> {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.sent.push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use futures::StreamExt as _;
    use imap_proto::{Response, Status};

    use super::*;

    #[tokio::test]
    async fn test_mock_replays_script_until_tagged_response() {
        let mut connection = MockConnection::new(["* OK still here\r\n0000 OK done\r\n"]);

        let mut responses: Vec<_> = connection.send("NOOP".to_owned()).collect().await;

        assert_eq!(2, responses.len());
        let last = assert_ok!(responses.pop().expect("two responses"));
        assert_matches!(
            last.parsed(),
            Response::Done {
                status: Status::Ok,
                ..
            }
        );
        assert_eq!(["NOOP"], connection.sent());
    }

    #[tokio::test]
    async fn test_mock_without_script_behaves_like_closed_connection() {
        let mut connection = MockConnection::new([]);

        let mut responses = connection.send("NOOP".to_owned());

        assert_none!(responses.next().await);
    }
}
