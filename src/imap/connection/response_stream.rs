use std::{
    borrow::Cow,
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};

use futures::{SinkExt as _, Stream, TryStreamExt as _};
use imap_proto::Request;
use log::trace;

use super::{
    connection::ImapStream,
    send_command::{ContinuationCommand, Response},
    tag_generator::TagGenerator,
};

enum ResponseStreamState {
    Start,
    Sending,
    Receiving,
    Done,
}

pub struct ResponseStream<'a> {
    imap_stream: &'a mut ImapStream,
    state: ResponseStreamState,
    tag_generator: &'a mut TagGenerator,
    tag: String,
    command: String,
}

impl<'a> ResponseStream<'a> {
    pub fn new(
        imap_stream: &'a mut ImapStream,
        tag_generator: &'a mut TagGenerator,
        command: String,
    ) -> Self {
        Self {
            imap_stream,
            state: ResponseStreamState::Start,
            tag_generator,
            tag: String::with_capacity(0),
            command,
        }
    }

    fn start_sending(&mut self) -> io::Result<()> {
        let tag = self.tag_generator.next();
        let request = Request(
            Cow::Borrowed(tag.as_bytes()),
            Cow::Borrowed(self.command.as_bytes()),
        );
        self.imap_stream.start_send_unpin(&request)?;
        self.tag = tag;
        self.state = ResponseStreamState::Sending;
        Ok(())
    }

    fn fail(&mut self, error: io::Error) -> Poll<Option<Response>> {
        self.state = ResponseStreamState::Done;
        Poll::Ready(Some(Err(error)))
    }
}

impl Stream for ResponseStream<'_> {
    type Item = Response;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.state {
                ResponseStreamState::Start => {
                    if let Err(e) = ready!(self.imap_stream.poll_ready_unpin(cx))
                        .and_then(|()| self.start_sending())
                    {
                        return self.fail(e);
                    }
                }
                ResponseStreamState::Sending => {
                    if let Err(e) = ready!(self.imap_stream.poll_flush_unpin(cx)) {
                        return self.fail(e);
                    }
                    self.state = ResponseStreamState::Receiving;
                }
                ResponseStreamState::Receiving => {
                    match ready!(self.imap_stream.try_poll_next_unpin(cx)) {
                        None => {
                            self.state = ResponseStreamState::Done;
                            return Poll::Ready(None);
                        }
                        Some(Ok(data)) => {
                            trace!("response = {:?}", data.parsed());
                            if let Some(tag) = data.request_id() {
                                if tag.0 != self.tag {
                                    let error = io::Error::new(
                                        io::ErrorKind::InvalidData,
                                        format!(
                                            "response tag {} does not match request tag {}",
                                            tag.0, self.tag
                                        ),
                                    );
                                    return self.fail(error);
                                }
                                self.state = ResponseStreamState::Done;
                            }
                            return Poll::Ready(Some(Ok(data)));
                        }
                        Some(Err(e)) => return self.fail(e),
                    }
                }
                ResponseStreamState::Done => return Poll::Ready(None),
            }
        }
    }
}

impl ContinuationCommand for ResponseStream<'_> {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let request = Request(Cow::Borrowed(&[]), Cow::Borrowed(data));
        self.imap_stream.send(&request).await
    }
}
