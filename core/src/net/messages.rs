//! Tugwar protocol messages
//!
//! Three message kinds travel between peers, none of them carrying data:
//!
//! - `Click` - the sender added exactly one to its own score
//! - `Ready` - the sender is ready for a fresh match
//! - `Reset` - the sender's match ended, return to the pre-match state
//!
//! # Wire Format
//!
//! ```text
//! [TUGW][version:u16][length:u32][bitcode payload...]
//! ```
//!
//! The payload is a tag byte plus an opaque extension blob. Tags this build
//! does not know decode to `Ok(None)` and are dropped by the receiver.

use bitcode::{Decode, Encode};
use thiserror::Error;

/// Protocol magic bytes
pub const TUGW_MAGIC: [u8; 4] = *b"TUGW";

/// Current protocol version
pub const TUGW_VERSION: u16 = 1;

/// Header size: magic (4) + version (2) + length (4)
pub const TUGW_HEADER_SIZE: usize = 10;

const TAG_CLICK: u8 = 1;
const TAG_READY: u8 = 2;
const TAG_RESET: u8 = 3;

/// Messages exchanged between the two peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMessage {
    Click,
    Ready,
    Reset,
}

/// On-the-wire record. `extra` is reserved for future payloads.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
struct WireMessage {
    tag: u8,
    extra: Vec<u8>,
}

/// Errors that can occur when decoding a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Message too short for header")]
    TooShort,
    #[error("Invalid magic bytes")]
    InvalidMagic,
    #[error("Protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u16, got: u16 },
    #[error("Incomplete payload: expected {expected} bytes, got {got}")]
    IncompletePayload { expected: usize, got: usize },
    #[error("Frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("Failed to decode message: {0}")]
    DecodeFailed(String),
}

impl GameMessage {
    fn tag(self) -> u8 {
        match self {
            Self::Click => TAG_CLICK,
            Self::Ready => TAG_READY,
            Self::Reset => TAG_RESET,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_CLICK => Some(Self::Click),
            TAG_READY => Some(Self::Ready),
            TAG_RESET => Some(Self::Reset),
            _ => None,
        }
    }

    /// Serialize message to bytes with framing
    pub fn to_bytes(self) -> Vec<u8> {
        let payload = bitcode::encode(&WireMessage {
            tag: self.tag(),
            extra: Vec::new(),
        });
        let mut bytes = Vec::with_capacity(TUGW_HEADER_SIZE + payload.len());

        bytes.extend_from_slice(&TUGW_MAGIC);
        bytes.extend_from_slice(&TUGW_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        bytes
    }

    /// Deserialize one framed message.
    ///
    /// Returns `Ok(None)` for a well-formed frame with an unknown tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Option<Self>, DecodeError> {
        let length = payload_len(bytes)?;

        if bytes.len() < TUGW_HEADER_SIZE + length {
            return Err(DecodeError::IncompletePayload {
                expected: length,
                got: bytes.len() - TUGW_HEADER_SIZE,
            });
        }

        let payload = &bytes[TUGW_HEADER_SIZE..TUGW_HEADER_SIZE + length];
        let wire: WireMessage =
            bitcode::decode(payload).map_err(|e| DecodeError::DecodeFailed(e.to_string()))?;

        let msg = Self::from_tag(wire.tag);
        if msg.is_none() {
            tracing::debug!(tag = wire.tag, "Ignoring unknown message tag");
        }
        Ok(msg)
    }
}

/// Validate the header and return the payload length it announces.
fn payload_len(bytes: &[u8]) -> Result<usize, DecodeError> {
    if bytes.len() < TUGW_HEADER_SIZE {
        return Err(DecodeError::TooShort);
    }
    if bytes[0..4] != TUGW_MAGIC {
        return Err(DecodeError::InvalidMagic);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != TUGW_VERSION {
        return Err(DecodeError::VersionMismatch {
            expected: TUGW_VERSION,
            got: version,
        });
    }
    Ok(u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize)
}

/// Reassembles frames from a byte stream.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    max_frame: usize,
}

impl FrameBuffer {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame.
    ///
    /// `Ok(None)` means more bytes are needed. A corrupt header is an error;
    /// the stream cannot be resynchronised after one.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        if self.buf.len() < TUGW_HEADER_SIZE {
            return Ok(None);
        }
        let total = TUGW_HEADER_SIZE + payload_len(&self.buf)?;
        if total > self.max_frame {
            return Err(DecodeError::FrameTooLarge {
                len: total,
                max: self.max_frame,
            });
        }
        if self.buf.len() < total {
            return Ok(None);
        }
        Ok(Some(self.buf.drain(..total).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_tag(tag: u8) -> Vec<u8> {
        let payload = bitcode::encode(&WireMessage {
            tag,
            extra: vec![9, 9],
        });
        let mut bytes = TUGW_MAGIC.to_vec();
        bytes.extend_from_slice(&TUGW_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        bytes
    }

    #[test]
    fn test_all_kinds_decode() {
        for msg in [GameMessage::Click, GameMessage::Ready, GameMessage::Reset] {
            assert_eq!(GameMessage::from_bytes(&msg.to_bytes()), Ok(Some(msg)));
        }
    }

    #[test]
    fn test_unknown_tag_is_ignored() {
        assert_eq!(GameMessage::from_bytes(&frame_with_tag(42)), Ok(None));
    }

    #[test]
    fn test_extension_blob_is_tolerated() {
        assert_eq!(
            GameMessage::from_bytes(&frame_with_tag(TAG_READY)),
            Ok(Some(GameMessage::Ready))
        );
    }

    #[test]
    fn test_invalid_magic() {
        let bytes = [b'X', b'X', b'X', b'X', 1, 0, 0, 0, 0, 0];
        assert_eq!(GameMessage::from_bytes(&bytes), Err(DecodeError::InvalidMagic));
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = GameMessage::Click.to_bytes();
        bytes[4] = 99;
        bytes[5] = 0;
        assert_eq!(
            GameMessage::from_bytes(&bytes),
            Err(DecodeError::VersionMismatch {
                expected: 1,
                got: 99
            })
        );
    }

    #[test]
    fn test_too_short() {
        assert_eq!(GameMessage::from_bytes(b"TUGW"), Err(DecodeError::TooShort));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = GameMessage::Reset.to_bytes();
        let result = GameMessage::from_bytes(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(DecodeError::IncompletePayload { .. })));
    }

    #[test]
    fn test_frame_buffer_splits_stream() {
        let mut stream = GameMessage::Click.to_bytes();
        stream.extend(GameMessage::Ready.to_bytes());
        let (first, second) = stream.split_at(7);

        let mut frames = FrameBuffer::new(1024);
        frames.extend(first);
        assert_eq!(frames.next_frame(), Ok(None));

        frames.extend(second);
        let a = frames.next_frame().unwrap().unwrap();
        let b = frames.next_frame().unwrap().unwrap();
        assert_eq!(GameMessage::from_bytes(&a), Ok(Some(GameMessage::Click)));
        assert_eq!(GameMessage::from_bytes(&b), Ok(Some(GameMessage::Ready)));
        assert_eq!(frames.next_frame(), Ok(None));
    }

    #[test]
    fn test_frame_buffer_rejects_oversized_frame() {
        let mut bytes = TUGW_MAGIC.to_vec();
        bytes.extend_from_slice(&TUGW_VERSION.to_le_bytes());
        bytes.extend_from_slice(&4096u32.to_le_bytes());

        let mut frames = FrameBuffer::new(64);
        frames.extend(&bytes);
        assert!(matches!(
            frames.next_frame(),
            Err(DecodeError::FrameTooLarge { .. })
        ));
    }
}
