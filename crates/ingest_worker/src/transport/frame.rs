//! Inbound frame layout.
//!
//! ```text
//! ┌──────────────┬──────────────┬───────────────────┬──────────────────────┐
//! │ 4 bytes (BE) │ 4 bytes (BE) │ header            │ attachment           │
//! │ body length  │ header len   │ JSON envelope     │ rest of the body     │
//! └──────────────┴──────────────┴───────────────────┴──────────────────────┘
//! ```
//!
//! The outer length prefix is handled by [`frame_codec`]; [`InboundFrame`]
//! splits the body into header and attachment.

use crate::domain::InboundMessage;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use common::domain::DomainError;
use thiserror::Error;
use tokio_util::codec::LengthDelimitedCodec;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const HEADER_LEN_BYTES: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame body of {0} bytes is too short for a header length")]
    TooShort(usize),

    #[error("declared header length {declared} exceeds remaining {available} bytes")]
    HeaderOverrun { declared: usize, available: usize },

    #[error("frame carries an empty header")]
    EmptyHeader,
}

impl From<FrameError> for DomainError {
    fn from(e: FrameError) -> Self {
        DomainError::FrameError(e.to_string())
    }
}

/// Length-delimited codec shared by the inbound listener and the control-plane client
pub fn frame_codec(max_frame_bytes: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_bytes)
        .new_codec()
}

/// Splits and assembles frame bodies
pub struct InboundFrame;

impl InboundFrame {
    pub fn decode(mut body: Bytes) -> Result<InboundMessage, FrameError> {
        if body.len() < HEADER_LEN_BYTES {
            return Err(FrameError::TooShort(body.len()));
        }

        let declared = body.get_u32() as usize;
        if declared > body.len() {
            return Err(FrameError::HeaderOverrun {
                declared,
                available: body.len(),
            });
        }
        if declared == 0 {
            return Err(FrameError::EmptyHeader);
        }

        let header = body.split_to(declared);
        Ok(InboundMessage {
            header,
            attachment: body,
        })
    }

    pub fn encode(message: &InboundMessage) -> Bytes {
        let mut body =
            BytesMut::with_capacity(HEADER_LEN_BYTES + message.header.len() + message.attachment.len());
        body.put_u32(message.header.len() as u32);
        body.put_slice(&message.header);
        body.put_slice(&message.attachment);
        body.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[test]
    fn test_decode_header_and_attachment() {
        let mut body = BytesMut::new();
        body.put_u32(2);
        body.put_slice(b"{}");
        body.put_slice(b"\x00\x01heap");

        let message = InboundFrame::decode(body.freeze()).unwrap();

        assert_eq!(&message.header[..], b"{}");
        assert_eq!(&message.attachment[..], b"\x00\x01heap");
    }

    #[test]
    fn test_decode_without_attachment() {
        let body = InboundFrame::encode(&InboundMessage::new(&b"{\"a\":1}"[..], Bytes::new()));

        let message = InboundFrame::decode(body).unwrap();

        assert_eq!(&message.header[..], b"{\"a\":1}");
        assert!(message.attachment.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_bodies() {
        assert_eq!(
            InboundFrame::decode(Bytes::from_static(b"\x00\x01")),
            Err(FrameError::TooShort(2))
        );
        assert_eq!(
            InboundFrame::decode(Bytes::from_static(b"\x00\x00\x00\x09{}")),
            Err(FrameError::HeaderOverrun {
                declared: 9,
                available: 2
            })
        );
        assert_eq!(
            InboundFrame::decode(Bytes::from_static(b"\x00\x00\x00\x00rest")),
            Err(FrameError::EmptyHeader)
        );
    }

    #[tokio::test]
    async fn test_codec_enforces_max_frame_length() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FramedWrite::new(client, frame_codec(1024));
        let mut reader = FramedRead::new(server, frame_codec(8));

        writer.send(Bytes::from_static(b"0123456789")).await.unwrap();

        let result = reader.next().await.unwrap();
        assert!(result.is_err());
    }
}
