//! Multipart framing on top of `LengthDelimitedCodec`.
//!
//! A message body is a sequence of `u32` big-endian length-prefixed parts.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, Framed, LengthDelimitedCodec};

/// One wire message.
pub type Multipart = Vec<Bytes>;

/// Framed TCP connection carrying multipart messages.
pub type MultipartFraming = Framed<TcpStream, MultipartCodec>;

/// Wrap a TCP stream with the canonical framing.
pub fn framed(stream: TcpStream, max_frame_len: usize) -> MultipartFraming {
    Framed::new(stream, MultipartCodec::new(max_frame_len))
}

#[derive(Debug)]
pub struct MultipartCodec {
    frames: LengthDelimitedCodec,
}

impl MultipartCodec {
    #[must_use]
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_len)
                .new_codec(),
        }
    }
}

impl Encoder<Multipart> for MultipartCodec {
    type Error = io::Error;

    fn encode(&mut self, parts: Multipart, dst: &mut BytesMut) -> Result<(), io::Error> {
        let body_len = parts.iter().map(|p| 4 + p.len()).sum();
        let mut body = BytesMut::with_capacity(body_len);
        for part in parts {
            let len = u32::try_from(part.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "message part too large"))?;
            body.put_u32(len);
            body.put(part);
        }
        self.frames.encode(body.freeze(), dst)
    }
}

impl Decoder for MultipartCodec {
    type Error = io::Error;
    type Item = Multipart;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Multipart>, io::Error> {
        let Some(mut body) = self.frames.decode(src)? else {
            return Ok(None);
        };

        let mut parts = Vec::new();
        while body.has_remaining() {
            if body.remaining() < 4 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated part header"));
            }
            let len = body.get_u32() as usize;
            if body.remaining() < len {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated part"));
            }
            parts.push(body.split_to(len).freeze());
        }
        Ok(Some(parts))
    }
}
