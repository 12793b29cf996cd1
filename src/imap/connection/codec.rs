use std::{io, mem::transmute};

use bytes::{BufMut as _, Bytes, BytesMut};
use imap_proto::{Request, RequestId, Response};
use nom::Needed;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Default)]
pub struct ImapCodec {
    decode_need_message_bytes: usize,
}

impl Decoder for ImapCodec {
    type Item = ResponseData;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.decode_need_message_bytes > buf.len() {
            return Ok(None);
        }
        let (response, rsp_len) = match Response::from_bytes(buf) {
            Ok((remaining, response)) => {
                // the parsed response borrows from the heap storage of `buf`, which is frozen
                // into `raw` below and kept alive next to it
                let response = unsafe { transmute::<Response<'_>, Response<'static>>(response) };
                (response, buf.len() - remaining.len())
            }
            Err(nom::Err::Incomplete(Needed::Size(min))) => {
                self.decode_need_message_bytes = buf.len() + min.get();
                return Ok(None);
            }
            Err(nom::Err::Incomplete(Needed::Unknown)) => return Ok(None),
            Err(
                nom::Err::Error(nom::error::Error { code, .. })
                | nom::Err::Failure(nom::error::Error { code, .. }),
            ) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "{code:?} during parsing of {:?}",
                        String::from_utf8_lossy(buf)
                    ),
                ));
            }
        };
        let raw = buf.split_to(rsp_len).freeze();
        self.decode_need_message_bytes = 0;
        Ok(Some(ResponseData { raw, response }))
    }
}

impl<'a> Encoder<&'a Request<'a>> for ImapCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: &'a Request<'a>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(msg.0.len() + msg.1.len() + 3);
        if !msg.0.is_empty() {
            dst.put_slice(&msg.0);
            dst.put_u8(b' ');
        }
        dst.put_slice(&msg.1);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// One server response together with the frame it was parsed from.
pub struct ResponseData {
    raw: Bytes,
    response: Response<'static>,
}

impl ResponseData {
    pub fn request_id(&self) -> Option<&RequestId> {
        match self.response {
            Response::Done { ref tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn parsed(&self) -> &Response<'_> {
        &self.response
    }

    /// Returns `data` as [`Bytes`] sharing the response frame when it points into it.
    pub fn share(&self, data: &[u8]) -> Bytes {
        let frame = self.raw.as_ptr_range();
        let part = data.as_ptr_range();
        if data.is_empty() {
            Bytes::new()
        } else if frame.start <= part.start && part.end <= frame.end {
            self.raw.slice_ref(data)
        } else {
            Bytes::copy_from_slice(data)
        }
    }
}

impl std::fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseData")
            .field("raw", &self.raw.len())
            .field("response", &self.response)
            .finish()
    }
}
