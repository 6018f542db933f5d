//! Tokio codec for framed responses, plus request framing helpers
//!
//! Clients read responses through [`ResponseCodec`]. Servers (and test
//! servers) read requests with [`read_request`] and answer with
//! [`write_response`].

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::encoding::{XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::header::{
    RequestHeader, ResponseHeader, ResponseStatus, REQUEST_FIXED_SIZE, RESPONSE_HEADER_SIZE,
};
use crate::stream::StreamId;

/// Maximum accepted payload size (256 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 0x1000_0000;

/// A complete response: header and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub header: ResponseHeader,
    pub data: Bytes,
}

impl ResponseFrame {
    /// Build a frame, filling in the header's data length
    pub fn new(stream_id: StreamId, status: ResponseStatus, data: Bytes) -> Self {
        Self {
            header: ResponseHeader::new(stream_id, status, data.len() as i32),
            data,
        }
    }
}

/// Codec for decoding responses (and encoding them on the server side)
#[derive(Debug, Default)]
pub struct ResponseCodec {
    /// Header whose payload has not fully arrived yet
    pending_header: Option<ResponseHeader>,
}

impl ResponseCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for ResponseCodec {
    type Item = ResponseFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match ResponseHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        let payload_len = header.data_length as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let data = src.split_to(payload_len).freeze();
        Ok(Some(ResponseFrame { header, data }))
    }
}

impl Encoder<ResponseFrame> for ResponseCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: ResponseFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frame.data.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: frame.data.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let header = ResponseHeader::new(
            frame.header.stream_id,
            frame.header.status,
            frame.data.len() as i32,
        );
        header.encode(dst);
        dst.extend_from_slice(&frame.data);
        Ok(())
    }
}

/// A request as read by a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub header: RequestHeader,
    /// Everything after the header: 16 parameter bytes, the data length
    /// and the data itself
    pub body: Bytes,
}

impl RequestFrame {
    /// Decode the body into a request type
    pub fn decode_body<T: XrdDecode>(&self) -> Result<T, ProtocolError> {
        let mut body = self.body.clone();
        T::decode(&mut body)
    }

    /// Trailing data of the request
    pub fn data(&self) -> Bytes {
        self.body.slice(20.min(self.body.len())..)
    }
}

/// Read one request: the fixed 24 bytes, then the announced data
pub async fn read_request<R>(reader: &mut R) -> Result<RequestFrame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut fixed = [0u8; REQUEST_FIXED_SIZE];
    reader.read_exact(&mut fixed).await?;

    let dlen = i32::from_be_bytes([fixed[20], fixed[21], fixed[22], fixed[23]]);
    if dlen < 0 {
        return Err(ProtocolError::InvalidLength(dlen));
    }
    let dlen = dlen as usize;
    if dlen > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: dlen,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(REQUEST_FIXED_SIZE + dlen);
    buf.extend_from_slice(&fixed);
    buf.resize(REQUEST_FIXED_SIZE + dlen, 0);
    reader.read_exact(&mut buf[REQUEST_FIXED_SIZE..]).await?;

    let mut bytes = buf.freeze();
    let header = RequestHeader::decode(&mut bytes)?;
    Ok(RequestFrame {
        header,
        body: bytes,
    })
}

/// Write a response header and marshaled body in a single write
pub async fn write_response<W, T>(
    writer: &mut W,
    stream_id: StreamId,
    status: ResponseStatus,
    body: &T,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: XrdEncode + ?Sized,
{
    let mut payload = BytesMut::new();
    body.encode(&mut payload)?;

    let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_SIZE + payload.len());
    ResponseCodec::new().encode(
        ResponseFrame::new(stream_id, status, payload.freeze()),
        &mut buf,
    )?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
