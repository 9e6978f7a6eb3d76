//! Nibble-granular reading over SPU packet data.

use std::io;
use std::io::SeekFrom;

use bitstream_io::{BigEndian, BitRead, BitReader};

/// Reader over the pixel-data region of an SPU packet.
///
/// RLE codes are nibble-aligned, so the reader tracks its position in
/// nibbles and can be repositioned to either interlaced field. One
/// reader serves both fields; the decoder saves and restores the
/// per-field cursor around each scanline.
#[derive(Debug)]
pub struct NibbleReader<'a> {
    bs: BitReader<io::Cursor<&'a [u8]>, BigEndian>,
    limit: u64,
}

impl<'a> NibbleReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self {
            bs: BitReader::new(io::Cursor::new(buf)),
            limit: (buf.len() as u64) << 1,
        }
    }

    /// Total number of nibbles in the underlying buffer.
    #[inline(always)]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| pos >> 2)
    }

    #[inline(always)]
    pub fn seek(&mut self, nibble: u64) -> io::Result<()> {
        if nibble > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("seek({nibble}): out of bounds, limit {}", self.limit),
            ));
        }

        self.bs.seek_bits(SeekFrom::Start(nibble << 2))?;

        Ok(())
    }

    #[inline(always)]
    pub fn next_nibble(&mut self) -> io::Result<u8> {
        match self.bs.read_unsigned_var::<u8>(4) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "next_nibble: out of bounds at {}",
                    self.bs.position_in_bits().unwrap_or(0) >> 2
                ),
            )),
            Err(e) => Err(e),
        }
    }

    /// Advances past the odd half of the current byte, if any.
    #[inline(always)]
    pub fn align_to_byte(&mut self) -> io::Result<()> {
        if self.position()? & 1 == 1 {
            self.bs.skip(4)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibbles_in_order() -> io::Result<()> {
        let mut reader = NibbleReader::from_slice(&[0xAB, 0xCD]);

        assert_eq!(reader.limit(), 4);
        assert_eq!(reader.next_nibble()?, 0xA);
        assert_eq!(reader.next_nibble()?, 0xB);
        assert_eq!(reader.position()?, 2);
        assert_eq!(reader.next_nibble()?, 0xC);
        assert_eq!(reader.next_nibble()?, 0xD);
        assert!(reader.next_nibble().is_err());

        Ok(())
    }

    #[test]
    fn seek_and_align() -> io::Result<()> {
        let mut reader = NibbleReader::from_slice(&[0x12, 0x34]);

        reader.seek(1)?;
        assert_eq!(reader.next_nibble()?, 0x2);

        reader.seek(1)?;
        reader.align_to_byte()?;
        assert_eq!(reader.next_nibble()?, 0x3);

        // Aligning on a byte boundary does not move.
        reader.seek(2)?;
        reader.align_to_byte()?;
        assert_eq!(reader.position()?, 2);

        assert!(reader.seek(5).is_err());

        Ok(())
    }
}
