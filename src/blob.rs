//! Zero-copy traversal of scatter-gather byte buffers.
//!
//! A frame in flight is a [`Blob`]: an ordered list of [`Bytes`] segments
//! shared behind a reference-counted handle. Parsing never copies the
//! payload; instead it walks the blob with a [`BlobCursor`] and exposes
//! bounded views through [`BlobWindow`]s. A window holds its own handle to
//! the blob, so it remains valid as long as any reader keeps it, even
//! after the cursor that created it has moved on or been dropped.
//!
//! Positions are `(buffer index, offset in buffer)` pairs ordered
//! lexicographically; all length accounting is in bytes.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::constants::MAX_BLOB_DUMP_BYTES;

/// A position inside a blob: `(buffer index, offset within that buffer)`.
///
/// The total ordering is lexicographic, which matches byte order because
/// buffers are traversed in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlobPosition {
    /// Index of the buffer within the blob.
    pub buffer: usize,
    /// Byte offset within that buffer.
    pub byte: usize,
}

impl BlobPosition {
    /// Create a new position.
    pub const fn new(buffer: usize, byte: usize) -> Self {
        Self { buffer, byte }
    }
}

impl fmt::Display for BlobPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[buffer: {}, byte: {}]", self.buffer, self.byte)
    }
}

#[derive(Debug)]
struct BlobInner {
    buffers: Vec<Bytes>,
    length: usize,
}

/// A reference-counted scatter-gather sequence of byte buffers.
///
/// Cloning is cheap: clones share the same underlying segments.
#[derive(Debug, Clone)]
pub struct Blob {
    inner: Arc<BlobInner>,
}

impl Blob {
    /// Build a blob from buffer segments. Empty segments are dropped so
    /// that every valid position addresses a real byte.
    pub fn new(buffers: Vec<Bytes>) -> Self {
        let buffers: Vec<Bytes> = buffers.into_iter().filter(|b| !b.is_empty()).collect();
        let length = buffers.iter().map(Bytes::len).sum();
        Self {
            inner: Arc::new(BlobInner { buffers, length }),
        }
    }

    /// Build a single-segment blob from a contiguous byte string.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::new(vec![bytes])
    }

    /// Total number of bytes across all segments.
    pub fn length(&self) -> usize {
        self.inner.length
    }

    /// Number of (non-empty) segments.
    pub fn num_buffers(&self) -> usize {
        self.inner.buffers.len()
    }

    /// Access one segment.
    pub fn buffer(&self, index: usize) -> Option<&Bytes> {
        self.inner.buffers.get(index)
    }

    /// True when two handles share the same underlying storage.
    pub fn ptr_eq(&self, other: &Blob) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Absolute byte offset of a position, or `None` when the position
    /// does not address a byte of this blob. The one-past-the-end
    /// position `(num_buffers, 0)` maps to `length()`.
    pub fn offset_of(&self, pos: BlobPosition) -> Option<usize> {
        if pos.buffer == self.num_buffers() && pos.byte == 0 {
            return Some(self.length());
        }
        let buf = self.buffer(pos.buffer)?;
        if pos.byte >= buf.len() {
            return None;
        }
        let preceding: usize = self.inner.buffers[..pos.buffer].iter().map(Bytes::len).sum();
        Some(preceding + pos.byte)
    }

    /// Position of an absolute byte offset. `offset == length()` yields
    /// the one-past-the-end position.
    pub fn position_at(&self, offset: usize) -> Option<BlobPosition> {
        if offset == self.length() {
            return Some(BlobPosition::new(self.num_buffers(), 0));
        }
        let mut remaining = offset;
        for (i, buf) in self.inner.buffers.iter().enumerate() {
            if remaining < buf.len() {
                return Some(BlobPosition::new(i, remaining));
            }
            remaining -= buf.len();
        }
        None
    }

    /// Copy `out.len()` bytes starting at `pos` into `out`, walking
    /// segment boundaries. Returns false when not enough bytes remain.
    pub fn copy_to_slice(&self, pos: BlobPosition, out: &mut [u8]) -> bool {
        let Some(start) = self.offset_of(pos) else {
            return false;
        };
        if start + out.len() > self.length() {
            return false;
        }

        let mut written = 0;
        let mut buffer = pos.buffer;
        let mut byte = pos.byte;
        while written < out.len() {
            let buf = &self.inner.buffers[buffer];
            let n = (buf.len() - byte).min(out.len() - written);
            out[written..written + n].copy_from_slice(&buf[byte..byte + n]);
            written += n;
            buffer += 1;
            byte = 0;
        }
        true
    }

    /// Gather the whole blob into one contiguous byte string.
    ///
    /// This copies; it is meant for control-message decoding and
    /// diagnostics, not the data path.
    pub fn flatten(&self) -> Bytes {
        if self.num_buffers() == 1 {
            return self.inner.buffers[0].clone();
        }
        let mut out = Vec::with_capacity(self.length());
        for buf in &self.inner.buffers {
            out.extend_from_slice(buf);
        }
        Bytes::from(out)
    }
}

/// A forward-only cursor over a blob.
///
/// The cursor tracks a current [`BlobPosition`] and the number of bytes
/// remaining in its configured span. `advance` is all-or-nothing: it
/// refuses to move when fewer than the requested bytes remain.
#[derive(Debug, Clone, Default)]
pub struct BlobCursor {
    blob: Option<Blob>,
    pos: BlobPosition,
    remaining: usize,
}

impl BlobCursor {
    /// Create an unset cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the cursor over `length` bytes of `blob` starting at
    /// `start`.
    ///
    /// With `strict` set, an out-of-range span leaves the cursor unset;
    /// otherwise the span is clamped to the bytes actually available.
    pub fn reset(&mut self, blob: &Blob, start: BlobPosition, length: usize, strict: bool) {
        let Some(start_offset) = blob.offset_of(start) else {
            self.unset();
            return;
        };
        let available = blob.length() - start_offset;
        if length > available {
            if strict {
                self.unset();
                return;
            }
            self.blob = Some(blob.clone());
            self.pos = start;
            self.remaining = available;
            return;
        }
        self.blob = Some(blob.clone());
        self.pos = start;
        self.remaining = length;
    }

    /// Clear the cursor.
    pub fn unset(&mut self) {
        self.blob = None;
        self.pos = BlobPosition::default();
        self.remaining = 0;
    }

    /// True while the cursor addresses a blob.
    pub fn is_set(&self) -> bool {
        self.blob.is_some()
    }

    /// Move forward `n` bytes. The cursor must land on a byte it can
    /// read: advancing to or past the end of the span returns false and
    /// leaves the cursor unchanged.
    pub fn advance(&mut self, n: usize) -> bool {
        let Some(blob) = &self.blob else {
            return false;
        };
        if n >= self.remaining && !(n == 0 && self.remaining > 0) {
            return false;
        }
        // offset_of cannot fail here: pos was produced by position_at.
        let offset = blob.offset_of(self.pos).unwrap_or(blob.length());
        self.pos = blob
            .position_at(offset + n)
            .unwrap_or(BlobPosition::new(blob.num_buffers(), 0));
        self.remaining -= n;
        true
    }

    /// Current position.
    pub fn position(&self) -> BlobPosition {
        self.pos
    }

    /// Bytes left in the configured span.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// The underlying blob, when set.
    pub fn blob(&self) -> Option<&Blob> {
        self.blob.as_ref()
    }
}

/// A bounded window over a blob: handle + `(start, length)` range.
///
/// Windows are how typed records are read from the wire without copying:
/// the reader opens a window of the record's *declared* length and pulls
/// fields out of it by offset, so fields added by newer protocol versions
/// fall outside the fields it knows and are ignored, while shorter
/// windows make the newer fields read as absent.
#[derive(Debug, Clone, Default)]
pub struct BlobWindow {
    blob: Option<Blob>,
    start: BlobPosition,
    length: usize,
}

impl BlobWindow {
    /// Create an unset window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the window.
    pub fn unset(&mut self) {
        self.blob = None;
        self.start = BlobPosition::default();
        self.length = 0;
    }

    /// Open a window of exactly `length` bytes at `start`. The window is
    /// left unset when the span overruns the blob.
    pub fn reset(&mut self, blob: &Blob, start: BlobPosition, length: usize) {
        match blob.offset_of(start) {
            Some(offset) if offset + length <= blob.length() => {
                self.blob = Some(blob.clone());
                self.start = start;
                self.length = length;
            }
            _ => self.unset(),
        }
    }

    /// Open a window of *up to* `max_length` bytes at `start`, taking
    /// whatever is available. The window is left unset when zero bytes
    /// are available. A later [`resize`](Self::resize) finalizes the
    /// span once the record's declared length is known.
    pub fn reset_bounded(&mut self, blob: &Blob, start: BlobPosition, max_length: usize) {
        match blob.offset_of(start) {
            Some(offset) if offset < blob.length() => {
                self.blob = Some(blob.clone());
                self.start = start;
                self.length = max_length.min(blob.length() - offset);
            }
            _ => self.unset(),
        }
    }

    /// Resize the window to `new_length` bytes. Resizing beyond the
    /// blob's remaining bytes unsets the window.
    pub fn resize(&mut self, new_length: usize) {
        let Some(blob) = &self.blob else {
            return;
        };
        match blob.offset_of(self.start) {
            Some(offset) if offset + new_length <= blob.length() => {
                self.length = new_length;
            }
            _ => self.unset(),
        }
    }

    /// True while the window addresses bytes.
    pub fn is_set(&self) -> bool {
        self.blob.is_some()
    }

    /// The underlying blob, when set.
    pub fn blob(&self) -> Option<&Blob> {
        self.blob.as_ref()
    }

    /// Start position of the window.
    pub fn position(&self) -> BlobPosition {
        self.start
    }

    /// Length of the window in bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Read one byte at `offset` within the window.
    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        let mut byte = [0u8; 1];
        self.read_slice(offset, &mut byte).then_some(byte[0])
    }

    /// Read a big-endian u32 at `offset` within the window.
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let mut bytes = [0u8; 4];
        self.read_slice(offset, &mut bytes)
            .then(|| u32::from_be_bytes(bytes))
    }

    /// Copy `out.len()` bytes at `offset` within the window into `out`.
    /// Returns false when the read would cross the window's end.
    pub fn read_slice(&self, offset: usize, out: &mut [u8]) -> bool {
        let Some(blob) = &self.blob else {
            return false;
        };
        if offset + out.len() > self.length {
            return false;
        }
        let Some(start_offset) = blob.offset_of(self.start) else {
            return false;
        };
        let Some(pos) = blob.position_at(start_offset + offset) else {
            return false;
        };
        blob.copy_to_slice(pos, out)
    }
}

/// Hex-dump the first `max_bytes` of a blob for diagnostics.
///
/// Output is 16 bytes per line: offset, hex columns, ASCII gutter.
pub fn hex_dump(blob: &Blob, max_bytes: usize) -> String {
    let len = blob.length().min(max_bytes).min(MAX_BLOB_DUMP_BYTES);
    let mut bytes = vec![0u8; len];
    if !blob.copy_to_slice(BlobPosition::default(), &mut bytes) {
        return String::from("/no blob/");
    }

    let mut out = String::new();
    for (line_no, chunk) in bytes.chunks(16).enumerate() {
        out.push_str(&format!("{:06X}:  ", line_no * 16));
        for (i, byte) in chunk.iter().enumerate() {
            out.push_str(&format!("{:02X}", byte));
            if i % 2 == 1 {
                out.push(' ');
            }
        }
        // Align the ASCII gutter for short final lines.
        let hex_width = 16 * 2 + 8;
        let written = chunk.len() * 2 + chunk.len() / 2;
        for _ in written..hex_width {
            out.push(' ');
        }
        out.push('|');
        for byte in chunk {
            out.push(if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            });
        }
        out.push('|');
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_blob(data: &[u8], at: &[usize]) -> Blob {
        let mut buffers = Vec::new();
        let mut prev = 0;
        for &idx in at {
            buffers.push(Bytes::copy_from_slice(&data[prev..idx]));
            prev = idx;
        }
        buffers.push(Bytes::copy_from_slice(&data[prev..]));
        Blob::new(buffers)
    }

    #[test]
    fn test_blob_length_and_segments() {
        let blob = split_blob(&[1, 2, 3, 4, 5, 6], &[2, 4]);
        assert_eq!(blob.length(), 6);
        assert_eq!(blob.num_buffers(), 3);
    }

    #[test]
    fn test_blob_drops_empty_segments() {
        let blob = Blob::new(vec![
            Bytes::new(),
            Bytes::from_static(&[1, 2]),
            Bytes::new(),
        ]);
        assert_eq!(blob.num_buffers(), 1);
        assert_eq!(blob.length(), 2);
    }

    #[test]
    fn test_offset_position_round_trip() {
        let blob = split_blob(&[0, 1, 2, 3, 4, 5, 6, 7], &[3, 5]);
        for offset in 0..=blob.length() {
            let pos = blob.position_at(offset).unwrap();
            assert_eq!(blob.offset_of(pos), Some(offset));
        }
        assert!(blob.position_at(9).is_none());
    }

    #[test]
    fn test_copy_to_slice_across_segments() {
        let data: Vec<u8> = (0..10).collect();
        let blob = split_blob(&data, &[1, 4, 9]);
        let mut out = [0u8; 6];
        assert!(blob.copy_to_slice(BlobPosition::new(1, 1), &mut out));
        assert_eq!(out, [2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_copy_to_slice_overrun() {
        let blob = Blob::from_bytes(Bytes::from_static(&[1, 2, 3]));
        let mut out = [0u8; 4];
        assert!(!blob.copy_to_slice(BlobPosition::default(), &mut out));
    }

    #[test]
    fn test_position_ordering() {
        let a = BlobPosition::new(0, 5);
        let b = BlobPosition::new(1, 0);
        let c = BlobPosition::new(1, 3);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_cursor_advance_within_segment() {
        let blob = Blob::from_bytes(Bytes::from_static(&[0, 1, 2, 3, 4, 5, 6, 7]));
        let mut cursor = BlobCursor::new();
        cursor.reset(&blob, BlobPosition::default(), blob.length(), true);

        assert!(cursor.advance(4));
        assert_eq!(cursor.position(), BlobPosition::new(0, 4));
        assert_eq!(cursor.remaining(), 4);
    }

    #[test]
    fn test_cursor_advance_across_segments() {
        let data: Vec<u8> = (0..12).collect();
        let blob = split_blob(&data, &[4, 8]);
        let mut cursor = BlobCursor::new();
        cursor.reset(&blob, BlobPosition::default(), blob.length(), true);

        assert!(cursor.advance(6));
        assert_eq!(cursor.position(), BlobPosition::new(1, 2));
        assert!(cursor.advance(5));
        assert_eq!(cursor.position(), BlobPosition::new(2, 3));
        assert_eq!(cursor.remaining(), 1);
        // The last byte is the last valid landing spot.
        assert!(!cursor.advance(1));
    }

    #[test]
    fn test_cursor_advance_refuses_overrun() {
        let blob = Blob::from_bytes(Bytes::from_static(&[0, 1, 2]));
        let mut cursor = BlobCursor::new();
        cursor.reset(&blob, BlobPosition::default(), blob.length(), true);

        assert!(!cursor.advance(4));
        // A failed advance does not move the cursor.
        assert_eq!(cursor.position(), BlobPosition::default());
        assert_eq!(cursor.remaining(), 3);

        // Landing exactly at the end is also a failed advance.
        assert!(!cursor.advance(3));
        assert!(cursor.advance(2));
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn test_cursor_strict_reset_out_of_range() {
        let blob = Blob::from_bytes(Bytes::from_static(&[0, 1, 2]));
        let mut cursor = BlobCursor::new();
        cursor.reset(&blob, BlobPosition::default(), 10, true);
        assert!(!cursor.is_set());

        cursor.reset(&blob, BlobPosition::default(), 10, false);
        assert!(cursor.is_set());
        assert_eq!(cursor.remaining(), 3);
    }

    #[test]
    fn test_window_exact_reset() {
        let blob = Blob::from_bytes(Bytes::from_static(&[1, 2, 3, 4]));
        let mut window = BlobWindow::new();
        window.reset(&blob, BlobPosition::default(), 4);
        assert!(window.is_set());
        assert_eq!(window.length(), 4);

        window.reset(&blob, BlobPosition::default(), 5);
        assert!(!window.is_set());
    }

    #[test]
    fn test_window_bounded_reset_clamps() {
        let blob = Blob::from_bytes(Bytes::from_static(&[1, 2]));
        let mut window = BlobWindow::new();
        window.reset_bounded(&blob, BlobPosition::default(), 4);
        assert!(window.is_set());
        assert_eq!(window.length(), 2);
    }

    #[test]
    fn test_window_bounded_reset_empty() {
        let blob = Blob::from_bytes(Bytes::from_static(&[1, 2]));
        let mut window = BlobWindow::new();
        // One-past-the-end: zero bytes available.
        window.reset_bounded(&blob, BlobPosition::new(1, 0), 4);
        assert!(!window.is_set());
    }

    #[test]
    fn test_window_resize() {
        let blob = Blob::from_bytes(Bytes::from_static(&[1, 2, 3, 4, 5, 6]));
        let mut window = BlobWindow::new();
        window.reset_bounded(&blob, BlobPosition::new(0, 2), 2);
        assert_eq!(window.length(), 2);

        window.resize(4);
        assert!(window.is_set());
        assert_eq!(window.length(), 4);

        window.resize(5);
        assert!(!window.is_set());
    }

    #[test]
    fn test_window_reads_across_segments() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x01];
        let blob = split_blob(&data, &[2]);
        let mut window = BlobWindow::new();
        window.reset(&blob, BlobPosition::default(), 5);

        assert_eq!(window.read_u32(0), Some(0xDEADBEEF));
        assert_eq!(window.read_u8(4), Some(0x01));
        // Reads past the window's end are refused.
        assert_eq!(window.read_u32(2), None);
    }

    #[test]
    fn test_window_outlives_cursor() {
        let blob = Blob::from_bytes(Bytes::from_static(&[9, 8, 7, 6]));
        let window = {
            let mut cursor = BlobCursor::new();
            cursor.reset(&blob, BlobPosition::default(), blob.length(), true);
            let mut w = BlobWindow::new();
            w.reset(cursor.blob().unwrap(), cursor.position(), 4);
            w
        };
        assert!(window.is_set());
        assert_eq!(window.read_u8(0), Some(9));
    }

    #[test]
    fn test_hex_dump_shape() {
        let blob = Blob::from_bytes(Bytes::from(vec![0x41u8; 20]));
        let dump = hex_dump(&blob, 128);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("000000:"));
        assert!(lines[0].contains("4141"));
        assert!(lines[0].ends_with("|AAAAAAAAAAAAAAAA|"));
        assert!(lines[1].starts_with("000010:"));
    }

    #[test]
    fn test_hex_dump_caps_at_max() {
        let blob = Blob::from_bytes(Bytes::from(vec![0u8; 1024]));
        let dump = hex_dump(&blob, 4096);
        assert_eq!(dump.lines().count(), MAX_BLOB_DUMP_BYTES / 16);
    }
}
