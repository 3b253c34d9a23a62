//! Forward-only iteration over CONFIRM event payloads.
//!
//! A CONFIRM event carries a [`ConfirmHeader`] followed by N fixed-size
//! confirm records. [`ConfirmMessageIterator`] walks those records in
//! place over the event blob, opening a [`BlobWindow`] per record sized
//! to the *declared* record length rather than to any compiled-in struct
//! layout. That windowed read is the protocol-evolution mechanism: a
//! newer peer that appends fields to the record simply declares a larger
//! `per_message_words`, and this reader still lands on every record
//! boundary while ignoring the bytes it does not know.
//!
//! The same pattern is shared by the ACK, PUSH and PUT iterators of the
//! full protocol; CONFIRM is the simplest of the family.
//!
//! # Usage
//!
//! ```rust
//! use stratomq::confirm::{ConfirmEventBuilder, ConfirmMessage, ConfirmMessageIterator, NextStatus};
//! use stratomq::protocol::{EventHeader, MessageGuid};
//! use stratomq::types::QueueId;
//!
//! let mut builder = ConfirmEventBuilder::new();
//! builder.append(ConfirmMessage::new(QueueId::new(7), 0, MessageGuid::default()));
//! let (blob, event_header) = builder.build();
//!
//! let mut iter = ConfirmMessageIterator::new();
//! assert!(iter.reset(&blob, &event_header).is_ok());
//! while iter.next() == NextStatus::HasNext {
//!     let record = iter.message().unwrap();
//!     assert_eq!(record.queue_id(), Some(QueueId::new(7)));
//! }
//! ```

use bytes::BytesMut;
use std::fmt;
use tracing::debug;

use crate::blob::{Blob, BlobCursor, BlobPosition, BlobWindow, hex_dump};
use crate::constants::{
    CONFIRM_GUID_OFFSET, CONFIRM_QUEUE_ID_OFFSET, CONFIRM_SUB_QUEUE_ID_OFFSET, GUID_SIZE,
    MAX_BLOB_DUMP_BYTES, MIN_CONFIRM_HEADER_SIZE, WORD_SIZE,
};
use crate::encode::ToByte;
use crate::protocol::{ConfirmHeader, EventHeader, EventType, MessageGuid};
use crate::types::QueueId;

/// Outcome of [`ConfirmMessageIterator::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStatus {
    /// The iterator is positioned and ready.
    Ok = 0,
    /// The blob does not contain a complete EventHeader, or the header is
    /// not followed by any ConfirmHeader byte.
    InvalidEventHeader = -1,
    /// The ConfirmHeader is malformed (declares less than the minimum
    /// size).
    InvalidConfirmHeader = -2,
    /// The ConfirmHeader declares more bytes than remain in the blob.
    NotEnoughBytes = -3,
}

impl ResetStatus {
    /// Wire-style integer code.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// True on success.
    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, ResetStatus::Ok)
    }
}

/// Outcome of [`ConfirmMessageIterator::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStatus {
    /// A record is loaded; another call may yield more.
    HasNext = 1,
    /// Iteration is complete.
    AtEnd = 0,
    /// The iterator is in an invalid state (used before reset, after the
    /// end, or after a failed reset).
    Invalid = -1,
    /// The blob holds fewer bytes than the record size declared in the
    /// header.
    NotEnoughBytes = -2,
    /// The header declares a zero record size; iteration would never
    /// terminate.
    InvalidAdvanceLength = -3,
}

impl NextStatus {
    /// Wire-style integer code.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// A confirm record, read through the iterator's message window.
///
/// Accessors return `None` when the declared record length does not
/// cover the field, which is how records from older protocol versions
/// read: present fields decode, absent fields are `None`.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmRecord<'a> {
    window: &'a BlobWindow,
}

impl ConfirmRecord<'_> {
    /// Queue id the confirmation applies to.
    pub fn queue_id(&self) -> Option<QueueId> {
        self.window.read_u32(CONFIRM_QUEUE_ID_OFFSET).map(QueueId)
    }

    /// Sub-queue id (fan-out consumer) of the confirmation.
    pub fn sub_queue_id(&self) -> Option<u32> {
        self.window.read_u32(CONFIRM_SUB_QUEUE_ID_OFFSET)
    }

    /// GUID of the confirmed message.
    pub fn guid(&self) -> Option<MessageGuid> {
        let mut bytes = [0u8; GUID_SIZE];
        self.window
            .read_slice(CONFIRM_GUID_OFFSET, &mut bytes)
            .then(|| MessageGuid::from_bytes(bytes))
    }

    /// Length of the record as declared on the wire.
    pub fn length(&self) -> usize {
        self.window.length()
    }
}

/// Iterator over the confirm records of one CONFIRM event.
///
/// The iterator is short-lived: it aliases the event blob and is reset
/// per event. After construction (or a failed [`reset`](Self::reset)) it
/// is invalid; a successful reset positions it *before* the first record
/// so that the first [`next`](Self::next) call skips the ConfirmHeader
/// and loads record zero.
#[derive(Debug, Clone, Default)]
pub struct ConfirmMessageIterator {
    cursor: BlobCursor,
    advance_length: usize,
    header: BlobWindow,
    message: BlobWindow,
}

impl ConfirmMessageIterator {
    /// Create an invalid iterator; call [`reset`](Self::reset) before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the iterator over `blob`, whose framing `event_header`
    /// has already been read.
    pub fn reset(&mut self, blob: &Blob, event_header: &EventHeader) -> ResetStatus {
        self.cursor
            .reset(blob, BlobPosition::default(), blob.length(), true);

        // Skip the EventHeader to point to the ConfirmHeader.
        if !self.cursor.advance(event_header.header_size()) {
            self.header.unset();
            return ResetStatus::InvalidEventHeader;
        }

        // Read the ConfirmHeader bounded to the minimum size, then resize
        // the window to the size the header itself declares. The resize
        // keeps the window's span bit-exact with the wire header, which
        // diagnostics rely on.
        self.header
            .reset_bounded(blob, self.cursor.position(), MIN_CONFIRM_HEADER_SIZE);
        if !self.header.is_set() {
            return ResetStatus::InvalidConfirmHeader;
        }

        let Some(confirm_header) = self.header_fields() else {
            self.header.unset();
            return ResetStatus::InvalidConfirmHeader;
        };

        let header_size = confirm_header.header_size();
        if header_size < MIN_CONFIRM_HEADER_SIZE {
            // Header declares fewer bytes than expected, probably
            // malformed. Unset so that is_valid() reports false.
            debug!(header_size, "confirm header declares less than the minimum");
            self.header.unset();
            return ResetStatus::InvalidConfirmHeader;
        }

        if header_size > self.cursor.remaining() {
            // The header declares more bytes than are left in the blob.
            debug!(
                header_size,
                remaining = self.cursor.remaining(),
                "confirm header overruns the blob"
            );
            self.header.unset();
            return ResetStatus::NotEnoughBytes;
        }

        self.header.resize(header_size);
        if !self.header.is_set() {
            return ResetStatus::InvalidConfirmHeader;
        }

        self.message.unset();

        // Preload the advance length with the header size so the first
        // next() skips over the ConfirmHeader.
        self.advance_length = header_size;

        ResetStatus::Ok
    }

    /// Advance to the next confirm record.
    pub fn next(&mut self) -> NextStatus {
        if !self.is_valid() {
            return NextStatus::Invalid;
        }

        if !self.cursor.advance(self.advance_length) {
            self.header.unset();
            return NextStatus::AtEnd;
        }

        // Re-read the record size on every iteration (reset() seeds the
        // advance length with the *header* size so the first call lands
        // on record zero; later protocol versions may also vary it).
        let Some(confirm_header) = self.header_fields() else {
            self.header.unset();
            return NextStatus::Invalid;
        };
        self.advance_length = confirm_header.per_message_size();

        // A zero advance would make iteration infinite.
        if self.advance_length == 0 {
            debug!("confirm header declares zero-size records");
            return NextStatus::InvalidAdvanceLength;
        }

        // Open the record window at the declared length, not at the size
        // of any in-memory struct, to support protocol evolution.
        let Some(blob) = self.cursor.blob().cloned() else {
            self.header.unset();
            return NextStatus::Invalid;
        };
        self.message
            .reset(&blob, self.cursor.position(), self.advance_length);

        if !self.message.is_set() {
            debug!(
                record_size = self.advance_length,
                remaining = self.cursor.remaining(),
                "confirm record overruns the blob"
            );
            return NextStatus::NotEnoughBytes;
        }

        NextStatus::HasNext
    }

    /// True exactly while the header window is set.
    pub fn is_valid(&self) -> bool {
        self.header.is_set()
    }

    /// The ConfirmHeader fields, read through the header window.
    pub fn header_fields(&self) -> Option<ConfirmHeader> {
        self.header.read_u8(0).map(ConfirmHeader::from_first_byte)
    }

    /// The record loaded by the last successful [`next`](Self::next).
    pub fn message(&self) -> Option<ConfirmRecord<'_>> {
        self.message.is_set().then_some(ConfirmRecord {
            window: &self.message,
        })
    }

    /// Deep-copy `other`'s position and windows, re-aliasing the same
    /// underlying blob. After the copy the two iterators advance
    /// independently.
    pub fn copy_from(&mut self, other: &ConfirmMessageIterator) {
        self.cursor = other.cursor.clone();
        self.advance_length = other.advance_length;

        if !other.header.is_set() {
            self.header.unset();
            self.message.unset();
            return;
        }

        let Some(blob) = other.header.blob().cloned() else {
            self.header.unset();
            self.message.unset();
            return;
        };
        self.header
            .reset(&blob, other.header.position(), other.header.length());

        if other.message.is_set() {
            let per_message_size = other
                .header_fields()
                .map(|h| h.per_message_size())
                .unwrap_or(0);
            self.message
                .reset(&blob, other.message.position(), per_message_size);
        } else {
            self.message.unset();
        }
    }

    /// Hex-dump the start of the event blob (up to 128 bytes) for
    /// diagnostics.
    pub fn dump_blob(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        // For now, print only the beginning of the blob; the bytes around
        // the current position may be added later.
        match self.cursor.blob() {
            Some(blob) => out.write_str(&hex_dump(blob, MAX_BLOB_DUMP_BYTES)),
            None => out.write_str("/no blob/"),
        }
    }
}

/// A confirm record in its builder (write-side) form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmMessage {
    /// Queue id the confirmation applies to.
    pub queue_id: QueueId,
    /// Sub-queue id of the confirming consumer.
    pub sub_queue_id: u32,
    /// GUID of the confirmed message.
    pub guid: MessageGuid,
}

impl ConfirmMessage {
    /// Number of words in the current-version record.
    pub const WORDS: u8 = 6;

    /// Create a record.
    pub const fn new(queue_id: QueueId, sub_queue_id: u32, guid: MessageGuid) -> Self {
        Self {
            queue_id,
            sub_queue_id,
            guid,
        }
    }
}

impl ToByte for ConfirmMessage {
    fn encode<T: bytes::BufMut>(&self, buffer: &mut T) -> crate::error::Result<()> {
        self.queue_id.encode(buffer)?;
        self.sub_queue_id.encode(buffer)?;
        self.guid.encode(buffer)?;
        Ok(())
    }
}

/// Builds a CONFIRM event blob: EventHeader, ConfirmHeader, records.
///
/// The write-side twin of [`ConfirmMessageIterator`], used by brokers to
/// batch confirmations upstream and by tests to fabricate events.
#[derive(Debug, Default)]
pub struct ConfirmEventBuilder {
    records: Vec<ConfirmMessage>,
}

impl ConfirmEventBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one confirm record.
    pub fn append(&mut self, message: ConfirmMessage) -> &mut Self {
        self.records.push(message);
        self
    }

    /// Number of records appended so far.
    pub fn message_count(&self) -> usize {
        self.records.len()
    }

    /// Render the event and return it with its framing header.
    pub fn build(&self) -> (Blob, EventHeader) {
        let confirm_header = ConfirmHeader::new(
            (MIN_CONFIRM_HEADER_SIZE / WORD_SIZE) as u8,
            ConfirmMessage::WORDS,
        );
        let length = crate::constants::EVENT_HEADER_SIZE
            + confirm_header.header_size()
            + self.records.len() * confirm_header.per_message_size();
        let event_header = EventHeader::new(EventType::Confirm, length as u32);

        let mut buf = BytesMut::with_capacity(length);
        event_header
            .encode(&mut buf)
            .expect("BytesMut encode cannot fail");
        confirm_header
            .encode(&mut buf)
            .expect("BytesMut encode cannot fail");
        for record in &self.records {
            record.encode(&mut buf).expect("BytesMut encode cannot fail");
        }

        (Blob::from_bytes(buf.freeze()), event_header)
    }
}
