use std::io;

use futures::Stream;

use super::codec::ResponseData;

pub type Response = io::Result<ResponseData>;

pub trait SendCommand {
    type Responses<'a>: Stream<Item = Response> + ContinuationCommand + Unpin
    where
        Self: 'a;

    /// Sends `command` under a fresh tag. The returned stream ends after the tagged completion.
    fn send(&mut self, command: String) -> Self::Responses<'_>;
}

pub trait ContinuationCommand {
    /// Sends continuation data (a literal) after the server asked for it with `+`.
    async fn send(&mut self, data: &[u8]) -> io::Result<()>;
}
