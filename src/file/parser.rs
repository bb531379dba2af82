//! Low-level byte stream parser for container decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser used by the container decoder. It offers bounds-checked access to binary data,
//! little-endian primitives, LEB128 integers and length-prefixed UTF-8 strings.
//!
//! # Usage Examples
//!
//! ```rust
//! use dexsplit::Parser;
//!
//! let data = [0x01, 0x02, 0x80, 0x01, 0x03, b'a', b'b', b'c'];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u16>()?, 0x0201);
//! assert_eq!(parser.read_uleb128()?, 128);
//! assert_eq!(parser.read_prefixed_string()?, "abc");
//! assert!(!parser.has_more_data());
//! # Ok::<(), dexsplit::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, read_sleb128_at, read_uleb128_at, DexIO},
    Result,
};

/// A cursor over a byte slice used to decode container sections.
///
/// The parser maintains an internal position and provides bounds checking to prevent
/// buffer overruns when reading malformed or truncated data.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if there are bytes left to read.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to `pos`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Returns the current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns the number of bytes left after the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Read a type `T` in little-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_le<T: DexIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read an unsigned LEB128 integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input or
    /// [`crate::Error::Malformed`] on an over-long encoding.
    pub fn read_uleb128(&mut self) -> Result<u32> {
        read_uleb128_at(self.data, &mut self.position)
    }

    /// Read a signed LEB128 integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input or
    /// [`crate::Error::Malformed`] on an over-long encoding.
    pub fn read_sleb128(&mut self) -> Result<i32> {
        read_sleb128_at(self.data, &mut self.position)
    }

    /// Read an unsigned LEB128 integer used as a count or index.
    ///
    /// # Errors
    /// Same as [`Parser::read_uleb128`].
    pub fn read_index(&mut self) -> Result<usize> {
        Ok(self.read_uleb128()? as usize)
    }

    /// Read a count of items that each occupy at least one byte.
    ///
    /// Counts larger than the remaining data are rejected up front, so decoders never
    /// pre-allocate based on a corrupt header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the count cannot possibly fit.
    pub fn read_count(&mut self) -> Result<usize> {
        let start = self.position;
        let count = self.read_index()?;
        if count > self.remaining() {
            return Err(malformed_error!(
                "Count {} at offset {} exceeds remaining data ({} bytes)",
                count,
                start,
                self.remaining()
            ));
        }

        Ok(count)
    }

    /// Read `length` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let Some(end) = self.position.checked_add(length) else {
            return Err(out_of_bounds_error!());
        };
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read a LEB128 length-prefixed UTF-8 string.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length or
    /// [`crate::Error::Malformed`] for invalid UTF-8.
    pub fn read_prefixed_string(&mut self) -> Result<String> {
        let length = self.read_index()?;
        let start = self.position;
        let bytes = self.read_bytes(length)?;

        String::from_utf8(bytes.to_vec()).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                start + length,
                e.utf8_error()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_reads() {
        let data = [0x2A, 0x34, 0x12, 0x7F, 0x02, b'h', b'i'];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u8>().unwrap(), 0x2A);
        assert_eq!(parser.read_le::<u16>().unwrap(), 0x1234);
        assert_eq!(parser.read_sleb128().unwrap(), -1);
        assert_eq!(parser.read_prefixed_string().unwrap(), "hi");
        assert_eq!(parser.pos(), data.len());
        assert!(!parser.has_more_data());
    }

    #[test]
    fn seek_bounds() {
        let data = [0_u8; 4];
        let mut parser = Parser::new(&data);
        assert!(parser.seek(4).is_ok());
        assert_eq!(parser.remaining(), 0);
        assert!(parser.seek(5).is_err());
    }

    #[test]
    fn truncated_string() {
        let data = [0x05, b'a', b'b'];
        let mut parser = Parser::new(&data);
        assert!(matches!(
            parser.read_prefixed_string(),
            Err(crate::Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn invalid_utf8() {
        let data = [0x02, 0xC3, 0x28];
        let mut parser = Parser::new(&data);
        assert!(matches!(
            parser.read_prefixed_string(),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn count_larger_than_data() {
        let data = [0x80, 0x01, 0x00];
        let mut parser = Parser::new(&data);
        assert!(matches!(
            parser.read_count(),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn read_bytes_overflow() {
        let data = [0_u8; 2];
        let mut parser = Parser::new(&data);
        parser.seek(1).unwrap();
        assert!(parser.read_bytes(usize::MAX).is_err());
        assert_eq!(parser.read_bytes(1).unwrap(), &[0]);
    }
}
