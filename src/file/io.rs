//! Low-level byte order and safe reading/writing utilities for container parsing.
//!
//! Containers are stored little-endian throughout. This module provides the
//! [`crate::file::io::DexIO`] trait for the fixed-size primitives, bounds-checked
//! readers, appending writers, and the unsigned LEB128 encoding the container uses for
//! all counts and section indices.
//!
//! # Key Components
//!
//! - [`crate::file::io::DexIO`] - Conversion between primitives and their byte arrays
//! - [`crate::file::io::read_le_at`] - Bounds-checked reads
//! - [`crate::file::io::write_le`] - Append a primitive to a growing buffer
//! - [`crate::file::io::read_uleb128_at`] / [`crate::file::io::write_uleb128`] - Variable-length integers
//!
//! # Error Handling
//!
//! All reading functions return [`crate::Result<T>`] and fail with
//! [`crate::Error::OutOfBounds`] if there are insufficient bytes in the buffer.
//! Writers append to a `Vec<u8>` and cannot fail.
//!
//! # Thread Safety
//!
//! All functions in this module are pure and operate only on the buffers passed in.

use crate::Result;

/// Trait for implementing type-specific safe binary data reading and writing.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait DexIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_dex_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl DexIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_dex_io!(u8 => 1, i8 => 1, u16 => 2, i16 => 2, u32 => 4, i32 => 4, u64 => 8, i64 => 8);

/// Safely reads T in little-endian format at `offset`, advancing the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes in the buffer.
pub fn read_le_at<T: DexIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Appends `value` in little-endian format to `data`.
pub fn write_le<T: DexIO>(data: &mut Vec<u8>, value: T) {
    data.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Reads an unsigned LEB128 value of at most 5 bytes at `offset`, advancing the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the encoding runs past the buffer, or
/// [`crate::Error::Malformed`] if it does not terminate within 5 bytes or overflows `u32`.
pub fn read_uleb128_at(data: &[u8], offset: &mut usize) -> Result<u32> {
    let start = *offset;
    let mut result: u32 = 0;

    for index in 0..5_u32 {
        let byte = read_le_at::<u8>(data, offset)?;
        let payload = u32::from(byte & 0x7F);

        if index == 4 && payload > 0x0F {
            return Err(malformed_error!("uleb128 at offset {} overflows u32", start));
        }

        result |= payload << (index * 7);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }

    Err(malformed_error!("Unterminated uleb128 at offset {}", start))
}

/// Appends `value` as unsigned LEB128 to `data`.
pub fn write_uleb128(data: &mut Vec<u8>, mut value: u32) {
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            data.push(byte);
            return;
        }
        data.push(byte | 0x80);
    }
}

/// Appends `value` as a signed LEB128 to `data`.
pub fn write_sleb128(data: &mut Vec<u8>, mut value: i32) {
    loop {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            data.push(byte);
            return;
        }
        data.push(byte | 0x80);
    }
}

/// Reads a signed LEB128 value of at most 5 bytes at `offset`, advancing the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the encoding runs past the buffer, or
/// [`crate::Error::Malformed`] if it does not terminate within 5 bytes.
pub fn read_sleb128_at(data: &[u8], offset: &mut usize) -> Result<i32> {
    let start = *offset;
    let mut result: i64 = 0;
    let mut shift = 0_u32;

    loop {
        if shift >= 35 {
            return Err(malformed_error!("Unterminated sleb128 at offset {}", start));
        }

        let byte = read_le_at::<u8>(data, offset)?;
        result |= i64::from(byte & 0x7F) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1_i64 << shift;
            }
            return i32::try_from(result)
                .map_err(|_| malformed_error!("sleb128 at offset {} overflows i32", start));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_le_primitives() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF];
        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 0x0201);
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 0x0403);
        assert_eq!(offset, 4);
        assert_eq!(read_le_at::<i8>(&data, &mut offset).unwrap(), -1);
        assert_eq!(offset, 5);
    }

    #[test]
    fn read_le_out_of_bounds() {
        let data = [0x01, 0x02];
        assert!(matches!(
            read_le_at::<u32>(&data, &mut 0),
            Err(crate::Error::OutOfBounds { .. })
        ));

        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&data, &mut offset).is_err());
        assert_eq!(offset, usize::MAX);
    }

    #[test]
    fn write_le_appends() {
        let mut data = vec![0xAA];
        write_le(&mut data, 0x0201_u16);
        write_le(&mut data, -2_i32);
        assert_eq!(data, [0xAA, 0x01, 0x02, 0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn uleb128_known_encodings() {
        let cases: [(u32, &[u8]); 5] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (u32::MAX, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];

        for (value, encoded) in cases {
            let mut buffer = Vec::new();
            write_uleb128(&mut buffer, value);
            assert_eq!(buffer, encoded, "encoding {value}");

            let mut offset = 0;
            assert_eq!(read_uleb128_at(encoded, &mut offset).unwrap(), value);
            assert_eq!(offset, encoded.len());
        }
    }

    #[test]
    fn uleb128_rejects_overlong() {
        let mut offset = 0;
        let result = read_uleb128_at(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01], &mut offset);
        assert!(matches!(result, Err(crate::Error::Malformed { .. })));

        let mut offset = 0;
        let result = read_uleb128_at(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F], &mut offset);
        assert!(matches!(result, Err(crate::Error::Malformed { .. })));
    }

    #[test]
    fn sleb128_known_encodings() {
        let cases: [(i32, &[u8]); 5] = [
            (0, &[0x00]),
            (-1, &[0x7F]),
            (63, &[0x3F]),
            (-64, &[0x40]),
            (64, &[0xC0, 0x00]),
        ];

        for (value, encoded) in cases {
            let mut buffer = Vec::new();
            write_sleb128(&mut buffer, value);
            assert_eq!(buffer, encoded, "encoding {value}");

            let mut offset = 0;
            assert_eq!(read_sleb128_at(encoded, &mut offset).unwrap(), value);
        }

        for value in [i32::MIN, i32::MAX, -129, 4096] {
            let mut buffer = Vec::new();
            write_sleb128(&mut buffer, value);
            let mut offset = 0;
            assert_eq!(read_sleb128_at(&buffer, &mut offset).unwrap(), value);
        }
    }
}
