//! Wire protocol layout and header parsing.
//!
//! Every frame on the wire is an *event*: an [`EventHeader`] followed by a
//! type-specific body. All integers are big-endian and all length fields
//! are expressed in words (1 word = 4 bytes) for alignment.
//!
//! # EventHeader Layout
//!
//! ```text
//! Offset  Size  Field
//! 0       4     fragment bit (MSB) + event length in bytes (31 bits)
//! 4       1     protocol version (upper 2 bits) | event type (lower 6 bits)
//! 5       1     header words
//! 6       1     type-specific
//! 7       1     reserved
//! ```
//!
//! # ConfirmHeader Layout
//!
//! ```text
//! Offset  Size  Field
//! 0       1     header words (upper nibble) | per-message words (lower nibble)
//! 1       3     reserved
//! ```
//!
//! A CONFIRM event body is a `ConfirmHeader` followed by N confirm records
//! of `per_message_words * 4` bytes each. Records are read by declared
//! length rather than by a fixed struct layout, so fields added in later
//! protocol versions are naturally ignored by older readers; unknown
//! trailing bytes are reserved and must be preserved on echo, never parsed.

use bytes::BufMut;
use nom::number::complete::{be_u8, be_u32};
use nom::IResult;
use nombytes::NomBytes;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{EVENT_HEADER_SIZE, EVENT_HEADER_WORDS, GUID_SIZE, WORD_SIZE};
use crate::encode::ToByte;
use crate::error::{Error, Result};

// CRC-32C polynomial used for key derivation (Castagnoli)
// Using a simple implementation since we don't want to add dependencies
const CRC32C_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0x82F63B78; // CRC-32C polynomial
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Compute CRC-32C checksum (Castagnoli polynomial).
///
/// Used as the hash step of queue-key and app-key derivation.
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32C_TABLE[index];
    }
    !crc
}

/// Type of an event on the wire.
///
/// Encoded in the lower 6 bits of byte 4 of the [`EventHeader`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Default, Serialize, Deserialize,
)]
pub enum EventType {
    /// Not a real event; zero-initialized headers decode to this.
    #[default]
    Undefined = 0,
    /// Schema-encoded control message.
    Control = 1,
    /// Message publication.
    Put = 2,
    /// Consumer confirmation of message processing.
    Confirm = 3,
    /// Message delivery to a consumer.
    Push = 4,
    /// Broker acknowledgement of a PUT.
    Ack = 5,
    /// Cluster state advisory traffic.
    ClusterState = 6,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Undefined => "UNDEFINED",
            EventType::Control => "CONTROL",
            EventType::Put => "PUT",
            EventType::Confirm => "CONFIRM",
            EventType::Push => "PUSH",
            EventType::Ack => "ACK",
            EventType::ClusterState => "CLUSTER_STATE",
        };
        f.write_str(name)
    }
}

/// Fixed header starting every event on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// Set when this frame is a fragment of a larger event.
    pub fragment: bool,
    /// Total event length in bytes, header included.
    pub length: u32,
    /// Protocol version (2 bits on the wire).
    pub protocol_version: u8,
    /// Event type.
    pub event_type: EventType,
    /// Size of this header in words; readers must skip `header_words * 4`
    /// bytes to find the body, tolerating future header growth.
    pub header_words: u8,
    /// Type-specific byte, meaning depends on `event_type`.
    pub type_specific: u8,
}

impl EventHeader {
    /// Create a header for an event of the given type and total length.
    pub fn new(event_type: EventType, length: u32) -> Self {
        Self {
            fragment: false,
            length,
            protocol_version: 1,
            event_type,
            header_words: EVENT_HEADER_WORDS,
            type_specific: 0,
        }
    }

    /// Size of this header in bytes, as declared by `header_words`.
    pub fn header_size(&self) -> usize {
        self.header_words as usize * WORD_SIZE
    }
}

impl ToByte for EventHeader {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        let frag_and_length = (u32::from(self.fragment) << 31) | (self.length & 0x7FFF_FFFF);
        buffer.put_u32(frag_and_length);
        buffer.put_u8((self.protocol_version << 6) | (self.event_type as u8 & 0x3F));
        buffer.put_u8(self.header_words);
        buffer.put_u8(self.type_specific);
        buffer.put_u8(0);
        Ok(())
    }
}

/// Parse an [`EventHeader`] with nom.
///
/// Fails with `Eof` if fewer than 8 bytes are available and with `Verify`
/// if the event type bits do not name a known type.
pub fn parse_event_header(s: NomBytes) -> IResult<NomBytes, EventHeader> {
    let (s, frag_and_length) = be_u32(s)?;
    let (s, ver_and_type) = be_u8(s)?;
    let (s, header_words) = be_u8(s)?;
    let (s, type_specific) = be_u8(s)?;
    let (s, _reserved) = be_u8(s)?;

    let event_type = match num_traits::FromPrimitive::from_u8(ver_and_type & 0x3F) {
        Some(t) => t,
        None => {
            return Err(nom::Err::Failure(nom::error::Error::new(
                s,
                nom::error::ErrorKind::Verify,
            )));
        }
    };

    Ok((
        s,
        EventHeader {
            fragment: frag_and_length & 0x8000_0000 != 0,
            length: frag_and_length & 0x7FFF_FFFF,
            protocol_version: ver_and_type >> 6,
            event_type,
            header_words,
            type_specific,
        },
    ))
}

impl EventHeader {
    /// Decode a header from the first bytes of a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < EVENT_HEADER_SIZE {
            return Err(Error::MissingData(format!(
                "event header needs {} bytes, have {}",
                EVENT_HEADER_SIZE,
                bytes.len()
            )));
        }
        match parse_event_header(NomBytes::from(bytes)) {
            Ok((_, header)) => Ok(header),
            Err(_) => Err(Error::DecodingError(bytes::Bytes::copy_from_slice(
                &bytes[..EVENT_HEADER_SIZE],
            ))),
        }
    }
}

/// Header starting the body of a CONFIRM event.
///
/// The first byte nibble-packs two word counts: the size of this header
/// (upper nibble) and the size of each subsequent confirm record (lower
/// nibble). Both are re-read from the wire on every use so that future
/// versions can grow either without breaking older readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmHeader {
    /// Size of this header in words.
    pub header_words: u8,
    /// Size of each confirm record in words.
    pub per_message_words: u8,
}

impl ConfirmHeader {
    /// Create a header with the current protocol's sizes.
    pub fn new(header_words: u8, per_message_words: u8) -> Self {
        debug_assert!(header_words <= 0xF && per_message_words <= 0xF);
        Self {
            header_words,
            per_message_words,
        }
    }

    /// Size of this header in bytes, as declared on the wire.
    pub fn header_size(&self) -> usize {
        self.header_words as usize * WORD_SIZE
    }

    /// Size of each confirm record in bytes, as declared on the wire.
    pub fn per_message_size(&self) -> usize {
        self.per_message_words as usize * WORD_SIZE
    }

    /// Decode from the first byte of a header window.
    pub fn from_first_byte(byte: u8) -> Self {
        Self {
            header_words: byte >> 4,
            per_message_words: byte & 0x0F,
        }
    }
}

impl ToByte for ConfirmHeader {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_u8((self.header_words << 4) | (self.per_message_words & 0x0F));
        buffer.put_u8(0);
        buffer.put_u8(0);
        buffer.put_u8(0);
        Ok(())
    }
}

/// A globally unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MessageGuid(pub [u8; GUID_SIZE]);

impl MessageGuid {
    /// Create a GUID from raw bytes.
    pub const fn from_bytes(bytes: [u8; GUID_SIZE]) -> Self {
        MessageGuid(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; GUID_SIZE] {
        &self.0
    }
}

impl fmt::Display for MessageGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl ToByte for MessageGuid {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put(&self.0[..]);
        Ok(())
    }
}

/// Result category of a PUT acknowledgement.
///
/// Non-`Success` values are carried in NACKs generated by the cluster
/// when a message cannot be accepted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Default, Serialize, Deserialize,
)]
pub enum AckResult {
    /// The message was accepted.
    #[default]
    Success = 0,
    /// An unexpected error occurred.
    Unknown = -1,
    /// The operation timed out.
    Timeout = -2,
    /// Not connected to the cluster.
    NotConnected = -3,
    /// The queue is not ready to accept messages.
    NotReady = -8,
    /// The queue reached its maximum number of outstanding messages.
    LimitMessages = -100,
    /// The queue reached its maximum number of outstanding bytes.
    LimitBytes = -101,
    /// The storage layer failed to persist the message.
    StorageFailure = -104,
}

impl AckResult {
    /// Wire code carried in the ACK message status field.
    #[inline]
    pub const fn to_code(self) -> i32 {
        self as i32
    }

    /// Decode a wire code, mapping unknown codes to `Unknown`.
    pub fn from_code(code: i32) -> Self {
        num_traits::FromPrimitive::from_i32(code).unwrap_or(AckResult::Unknown)
    }
}

impl fmt::Display for AckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AckResult::Success => "SUCCESS",
            AckResult::Unknown => "UNKNOWN",
            AckResult::Timeout => "TIMEOUT",
            AckResult::NotConnected => "NOT_CONNECTED",
            AckResult::NotReady => "NOT_READY",
            AckResult::LimitMessages => "LIMIT_MESSAGES",
            AckResult::LimitBytes => "LIMIT_BYTES",
            AckResult::StorageFailure => "STORAGE_FAILURE",
        };
        f.write_str(name)
    }
}
