//! Serialize data into the big-endian wire protocol.
use bytes::{BufMut, Bytes};

use crate::error::Result;

pub trait ToByte {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()>;
}

impl<'a, T: ToByte + 'a + ?Sized> ToByte for &'a T {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        (*self).encode(buffer)
    }
}

impl ToByte for u8 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_u8(*self);
        Ok(())
    }
}

impl ToByte for i32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i32(*self);
        Ok(())
    }
}

impl ToByte for u32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_u32(*self);
        Ok(())
    }
}

impl ToByte for u64 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_u64(*self);
        Ok(())
    }
}

impl ToByte for Bytes {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put(self.clone());
        Ok(())
    }
}

impl ToByte for [u8] {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put(self);
        Ok(())
    }
}

/// Render each element of `xs` to `buffer` in order, with no length
/// prefix. Wire arrays in this protocol are always counted by an outer
/// header field expressed in words.
pub fn encode_all<T: ToByte, W: BufMut>(buffer: &mut W, xs: &[T]) -> Result<()> {
    for x in xs {
        x.encode(buffer)?;
    }
    Ok(())
}

/// Pad `buffer` with zero bytes up to the next word boundary, given the
/// number of bytes written since the last boundary.
pub fn pad_to_word<W: BufMut>(buffer: &mut W, written: usize) -> usize {
    let rem = written % crate::constants::WORD_SIZE;
    if rem == 0 {
        return 0;
    }
    let pad = crate::constants::WORD_SIZE - rem;
    for _ in 0..pad {
        buffer.put_u8(0);
    }
    pad
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_encode_u32_big_endian() {
        let mut buf = BytesMut::new();
        0xDEADBEEFu32.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_encode_u64_big_endian() {
        let mut buf = BytesMut::new();
        1u64.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_encode_all() {
        let mut buf = BytesMut::new();
        encode_all(&mut buf, &[1u32, 2u32]).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn test_pad_to_word() {
        let mut buf = BytesMut::new();
        buf.put_u8(0xAA);
        let pad = pad_to_word(&mut buf, 1);
        assert_eq!(pad, 3);
        assert_eq!(buf.len(), 4);

        let mut buf = BytesMut::new();
        let pad = pad_to_word(&mut buf, 8);
        assert_eq!(pad, 0);
        assert!(buf.is_empty());
    }
}
