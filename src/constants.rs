//! Centralized protocol and configuration constants.
//!
//! This module consolidates the magic numbers and protocol constants used
//! throughout the stratomq broker core. Having them in one place makes it
//! easier to:
//!
//! - Understand the protocol constraints
//! - Update values consistently
//! - Document the rationale for each constant
//!
//! # Categories
//!
//! - **Wire Protocol Constants**: event framing sizes and limits
//! - **Key Constants**: queue/app key derivation widths
//! - **Coordinator Constants**: cluster coordination limits

// =============================================================================
// Wire Protocol Constants
// =============================================================================

/// Size of one protocol word, in bytes.
///
/// Every length field on the wire is expressed in words for alignment.
pub const WORD_SIZE: usize = 4;

/// Size of an `EventHeader` on the wire, consisting of:
/// - fragment bit + event length (4 bytes)
/// - protocol version + event type (1 byte)
/// - header words (1 byte)
/// - type-specific (1 byte)
/// - reserved (1 byte)
///
/// Total: 8 bytes (2 words)
pub const EVENT_HEADER_SIZE: usize = 8;

/// Number of words in an `EventHeader`.
pub const EVENT_HEADER_WORDS: u8 = (EVENT_HEADER_SIZE / WORD_SIZE) as u8;

/// Minimum size of a `ConfirmHeader`, consisting of:
/// - header words + per-message words (1 byte, nibble-packed)
/// - reserved (3 bytes)
///
/// Total: 4 bytes (1 word). A header declaring fewer bytes than this is
/// malformed.
pub const MIN_CONFIRM_HEADER_SIZE: usize = 4;

/// Byte offset of the queue id field within a confirm record.
pub const CONFIRM_QUEUE_ID_OFFSET: usize = 0;

/// Byte offset of the sub-queue id field within a confirm record.
pub const CONFIRM_SUB_QUEUE_ID_OFFSET: usize = 4;

/// Byte offset of the message GUID within a confirm record.
pub const CONFIRM_GUID_OFFSET: usize = 8;

/// Size of a message GUID on the wire.
pub const GUID_SIZE: usize = 16;

/// Maximum number of bytes hex-dumped from a blob for diagnostics.
pub const MAX_BLOB_DUMP_BYTES: usize = 128;

/// Maximum declared event length accepted from the wire.
///
/// Events larger than this are rejected at the framing layer before any
/// iterator is constructed.
pub const MAX_EVENT_SIZE: usize = 64 * 1024 * 1024;

// =============================================================================
// Key Constants
// =============================================================================

/// Width of a queue key, in bytes.
///
/// Queue keys are derived by hashing the queue URI and truncating to this
/// width; they only need to be unique within a partition.
pub const QUEUE_KEY_WIDTH: usize = 4;

/// Width of an app key, in bytes.
///
/// App keys are derived from app ids with the same hash-then-truncate
/// scheme and must be collision-free within a queue.
pub const APP_KEY_WIDTH: usize = 4;

/// Maximum salted retries when deriving a unique key before giving up.
pub const MAX_KEY_COLLISION_RETRIES: u32 = 32;

// =============================================================================
// Coordinator Constants
// =============================================================================

/// Default number of partitions in a cluster.
pub const DEFAULT_PARTITION_COUNT: usize = 4;

/// Lease id assigned to the very first primary of a partition.
///
/// Lease ids are 1-based; 0 means "never had a primary".
pub const FIRST_LEASE_ID: u64 = 1;

/// Maximum queue URI length accepted by the coordinator.
pub const MAX_URI_LENGTH: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_header_is_whole_words() {
        assert_eq!(EVENT_HEADER_SIZE % WORD_SIZE, 0);
        assert_eq!(EVENT_HEADER_WORDS, 2);
    }

    #[test]
    fn test_confirm_header_minimum_is_one_word() {
        assert_eq!(MIN_CONFIRM_HEADER_SIZE, WORD_SIZE);
    }

    #[test]
    fn test_guid_fits_min_confirm_record() {
        // A full confirm record (queue id + sub-queue id + GUID) is 6 words.
        assert_eq!(CONFIRM_GUID_OFFSET + GUID_SIZE, 6 * WORD_SIZE);
    }
}
