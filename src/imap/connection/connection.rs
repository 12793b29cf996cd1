use futures::StreamExt as _;
use log::{debug, trace};
use tokio::net::TcpStream;
use tokio_native_tls::{TlsConnector, TlsStream, native_tls};
use tokio_util::codec::Framed;

use crate::imap::ImapError;

use super::{
    SendCommand,
    codec::{ImapCodec, ResponseData},
    response_stream::ResponseStream,
    tag_generator::TagGenerator,
};

pub type ImapStream = Framed<TlsStream<TcpStream>, ImapCodec>;

pub struct Connection {
    stream: ImapStream,
    tag_generator: TagGenerator,
}

impl Connection {
    /// Opens a TLS connection and returns it together with the server greeting.
    pub async fn connect_to(host: &str, port: u16) -> Result<(Self, ResponseData), ImapError> {
        debug!("Connecting to {host}:{port}");
        let tls = TlsConnector::from(native_tls::TlsConnector::new()?);
        let stream = TcpStream::connect((host, port)).await?;
        let stream = tls.connect(host, stream).await?;

        let mut stream = Framed::new(stream, ImapCodec::default());

        let response_data = stream.next().await.ok_or(ImapError::Closed {
            command: "greeting",
        })??;
        trace!("greeting = {response_data:?}");

        Ok((
            Connection {
                stream,
                tag_generator: TagGenerator::default(),
            },
            response_data,
        ))
    }
}

impl SendCommand for Connection {
    type Responses<'a> = ResponseStream<'a>;

    fn send(&mut self, command: String) -> Self::Responses<'_> {
        ResponseStream::new(&mut self.stream, &mut self.tag_generator, command)
    }
}
