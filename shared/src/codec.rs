//! Length-prefixed codec for observer TCP framing
//!
//! All frames are laid out as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: JSON document ]
//! ```
//!
//! This keeps frame boundaries intact over TCP streams.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum frame size (1 MB); snapshots are a few kilobytes
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("Invalid frame length prefix: {0}")]
    InvalidLength(u32),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a value into a length-prefixed byte buffer
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a value directly into a provided buffer
pub fn encode_into<T: Serialize>(value: &T, buf: &mut BytesMut) -> Result<(), CodecError> {
    let body = serde_json::to_vec(value)?;

    if body.len() > MAX_FRAME_SIZE as usize {
        return Err(CodecError::FrameTooLarge(body.len()));
    }

    buf.reserve(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(&body);

    Ok(())
}

/// Try to decode a length-prefixed value from a buffer
///
/// Returns:
/// - `Ok(Some(value))` if a complete frame was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, CodecError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if frame_len > MAX_FRAME_SIZE {
        return Err(CodecError::InvalidLength(frame_len));
    }

    let total_len = 4 + frame_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let body = buf.split_to(frame_len as usize);

    Ok(Some(serde_json::from_slice(&body)?))
}

/// Decoder state for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        decode(&mut self.buffer)
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ObserverEvent, ServerFrame};

    fn heartbeat_frame() -> ServerFrame {
        ServerFrame::Event(ObserverEvent::HeartbeatReceived { system_id: 1 })
    }

    #[test]
    fn test_length_prefix_matches_body() {
        let encoded = encode(&heartbeat_frame()).expect("encode failed");

        let len_prefix = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len_prefix as usize, encoded.len() - 4);

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded: ServerFrame = decode(&mut buf).expect("decode failed").expect("no frame");
        assert_eq!(decoded, heartbeat_frame());
        assert!(buf.is_empty(), "buffer should be empty after decode");
    }

    #[test]
    fn test_partial_decode() {
        let encoded = encode(&heartbeat_frame()).expect("encode failed");

        let mut buf = BytesMut::from(&encoded[..5]);
        let result: Option<ServerFrame> =
            decode(&mut buf).expect("decode should not fail on partial data");
        assert!(result.is_none(), "should return None for partial data");

        // Nothing consumed
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_frame_decoder_chunks() {
        let encoded = encode(&heartbeat_frame()).expect("encode failed");

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encoded[..5]);
        assert!(decoder
            .decode_next::<ServerFrame>()
            .expect("decode error")
            .is_none());

        decoder.extend(&encoded[5..]);
        let decoded: ServerFrame = decoder
            .decode_next()
            .expect("decode error")
            .expect("should have frame");
        assert_eq!(decoded, heartbeat_frame());
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_into(&heartbeat_frame(), &mut buf).expect("encode failed");
        encode_into(&heartbeat_frame(), &mut buf).expect("encode failed");

        let mut decoder = FrameDecoder::new();
        decoder.extend(&buf);

        assert!(decoder.decode_next::<ServerFrame>().expect("decode error").is_some());
        assert!(decoder.decode_next::<ServerFrame>().expect("decode error").is_some());
        assert!(decoder.decode_next::<ServerFrame>().expect("decode error").is_none());
    }

    #[test]
    fn test_frame_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_SIZE + 1);
        buf.put_bytes(0, 100);

        let result: Result<Option<ServerFrame>, _> = decode(&mut buf);
        assert!(matches!(result, Err(CodecError::InvalidLength(_))));
    }

    #[test]
    fn test_garbage_body_is_json_error() {
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.put_slice(b"{{{");

        let result: Result<Option<ServerFrame>, _> = decode(&mut buf);
        assert!(matches!(result, Err(CodecError::Json(_))));
    }
}
