//! # Invalidation Wire Codec
//!
//! Fixed-layout binary frames carried over the invalidation fabric.
//!
//! ## Frame Layout
//!
//! ```text
//! Cache flush (25 bytes):
//! ┌─────┬──────────────────────┬────────────────────┐
//! │ 'C' │ object id (16 bytes) │ f64 epoch (8 bytes)│
//! └─────┴──────────────────────┴────────────────────┘
//!
//! Liveness (1 byte):
//! ┌─────┐
//! │ 'P' │
//! └─────┘
//! ```
//!
//! The transport is message-framed, so no length prefix appears inside the
//! payload; receivers dispatch on frame length and leading byte. The
//! timestamp is a native-endian IEEE-754 double, matching what producers
//! write with a straight memory copy.
//!
//! All operations here are pure; no I/O, no shared state.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Leading byte of a cache-flush frame.
pub const FLUSH_TAG: u8 = b'C';

/// Sole byte of a liveness frame.
pub const LIVENESS_TAG: u8 = b'P';

/// Binary length of an object identifier.
pub const OBJECT_ID_LEN: usize = 16;

/// Source-form length of an object identifier (32 hex characters).
pub const OBJECT_ID_HEX_LEN: usize = 32;

/// Total length of a cache-flush frame: tag + id + timestamp.
pub const FLUSH_FRAME_LEN: usize = 1 + OBJECT_ID_LEN + 8;

/// The complete liveness frame payload.
pub const LIVENESS_FRAME: [u8; 1] = [LIVENESS_TAG];

/// Errors from encoding or decoding wire data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The object identifier was not 32 well-formed hex characters.
    #[error("malformed object identifier: {reason}")]
    MalformedIdentifier {
        /// What was wrong with the input.
        reason: &'static str,
    },

    /// The frame did not match any known shape.
    #[error("malformed message: {reason}")]
    MalformedMessage {
        /// What was wrong with the frame.
        reason: &'static str,
    },
}

/// A 16-byte object identifier, the binary form of a 32-hex-char UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Parse a 32-hex-character identifier into its binary form.
    ///
    /// Each pair of hex characters maps to one byte, most-significant
    /// nibble first. Input of any other length, or containing non-hex
    /// characters, is rejected; this function never reads past the
    /// validated window.
    pub fn parse_hex32(source: &str) -> Result<Self, WireError> {
        let src = source.as_bytes();
        if src.len() != OBJECT_ID_HEX_LEN {
            return Err(WireError::MalformedIdentifier {
                reason: "identifier must be exactly 32 hex characters",
            });
        }

        let mut bytes = [0u8; OBJECT_ID_LEN];
        for (i, out) in bytes.iter_mut().enumerate() {
            let hi = hex_nibble(src[2 * i]);
            let lo = hex_nibble(src[2 * i + 1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => *out = (hi << 4) | lo,
                _ => {
                    return Err(WireError::MalformedIdentifier {
                        reason: "identifier contains non-hex characters",
                    })
                }
            }
        }

        Ok(Self(bytes))
    }

    /// Build an identifier from its raw binary form.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw binary form.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// Render back to lowercase 32-hex-character source form.
    #[must_use]
    pub fn to_hex32(&self) -> String {
        let mut out = String::with_capacity(OBJECT_ID_HEX_LEN);
        for byte in self.0 {
            out.push(char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0'));
            out.push(char::from_digit(u32::from(byte & 0x0f), 16).unwrap_or('0'));
        }
        out
    }
}

impl From<Uuid> for ObjectId {
    fn from(uuid: Uuid) -> Self {
        Self(*uuid.as_bytes())
    }
}

impl From<ObjectId> for Uuid {
    fn from(id: ObjectId) -> Self {
        Uuid::from_bytes(id.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex32())
    }
}

/// Map one ASCII hex character to its value.
fn hex_nibble(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// One cache-flush event: which object changed, and when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheFlush {
    /// The changed object.
    pub object_id: ObjectId,
    /// Event time as a floating-point epoch value.
    pub timestamp: f64,
}

impl CacheFlush {
    /// Encode to the fixed 25-byte frame: tag, identifier, timestamp.
    #[must_use]
    pub fn encode(&self) -> [u8; FLUSH_FRAME_LEN] {
        let mut frame = [0u8; FLUSH_FRAME_LEN];
        frame[0] = FLUSH_TAG;
        frame[1..1 + OBJECT_ID_LEN].copy_from_slice(self.object_id.as_bytes());
        frame[1 + OBJECT_ID_LEN..].copy_from_slice(&self.timestamp.to_ne_bytes());
        frame
    }
}

/// A decoded frame from the fabric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    /// An invalidation notice for one object.
    CacheFlush(CacheFlush),
    /// A broker liveness heartbeat.
    Liveness,
}

impl Frame {
    /// Decode a frame, dispatching on length and leading byte.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        match (buf.len(), buf.first()) {
            (1, Some(&LIVENESS_TAG)) => Ok(Self::Liveness),
            (FLUSH_FRAME_LEN, Some(&FLUSH_TAG)) => {
                let mut id = [0u8; OBJECT_ID_LEN];
                id.copy_from_slice(&buf[1..1 + OBJECT_ID_LEN]);
                let mut ts = [0u8; 8];
                ts.copy_from_slice(&buf[1 + OBJECT_ID_LEN..]);
                Ok(Self::CacheFlush(CacheFlush {
                    object_id: ObjectId::from_bytes(id),
                    timestamp: f64::from_ne_bytes(ts),
                }))
            }
            (0, None) => Err(WireError::MalformedMessage {
                reason: "empty frame",
            }),
            (1, Some(_)) => Err(WireError::MalformedMessage {
                reason: "unknown single-byte frame",
            }),
            (FLUSH_FRAME_LEN, Some(_)) => Err(WireError::MalformedMessage {
                reason: "unknown frame tag",
            }),
            _ => Err(WireError::MalformedMessage {
                reason: "unexpected frame length",
            }),
        }
    }
}
