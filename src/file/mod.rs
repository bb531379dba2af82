//! Input file abstraction for container data.
//!
//! This module abstracts over where the bytes of an input container come from. Containers on
//! disk are memory-mapped, containers already in memory (for example extracted from an
//! archive by the caller) are wrapped as-is. Both are exposed through the same [`File`] type
//! so the decoder in [`crate::dex`] never needs to know the difference.
//!
//! # Key Components
//!
//! - [`crate::file::File`] - Loaded input data
//! - [`crate::file::Backend`] - Trait for different data sources
//! - [`crate::file::parser::Parser`] - Cursor used by the decoder
//! - [`crate::file::io`] - Little-endian and LEB128 primitives
//!
//! # Examples
//!
//! ```rust,no_run
//! use dexsplit::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("classes.dex"))?;
//! println!("Loaded {} bytes", file.len());
//! # Ok::<(), dexsplit::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! Backends are `Send + Sync`; a loaded [`File`] can be shared between threads.

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{Error::Empty, Result};
use memory::Memory;
use physical::Physical;

/// Source of the bytes of one input container.
///
/// Implementors only expose their buffer; bounds checking is shared. Backends must be
/// `Send + Sync` so a loaded [`File`] can be handed to the worker pool.
pub trait Backend: Send + Sync {
    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range does not lie within the buffer,
    /// including when `offset + len` overflows.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data().get(offset..end))
            .ok_or_else(|| out_of_bounds_error!())
    }

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize {
        self.data().len()
    }
}

/// A loaded input container.
pub struct File {
    backend: Box<dyn Backend>,
}

impl File {
    /// Memory-maps the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped, and
    /// [`crate::Error::Empty`] for a zero-length file.
    pub fn from_file(path: &Path) -> Result<File> {
        let backend = Physical::new(path)?;
        Self::load(Box::new(backend))
    }

    /// Wraps an in-memory buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty buffer.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Box::new(Memory::new(data)))
    }

    fn load(backend: Box<dyn Backend>) -> Result<File> {
        if backend.len() == 0 {
            return Err(Empty);
        }

        Ok(File { backend })
    }

    /// Returns the complete file data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.backend.data()
    }

    /// Returns a bounds-checked slice of the file data.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the file.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.backend.data_slice(offset, len)
    }

    /// Returns the size of the file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    /// Returns true if the file holds no data. Never true for a successfully loaded file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backend.len() == 0
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File").field("len", &self.len()).finish()
    }
}
