//! Physical file backend for memory-mapped I/O.
//!
//! Input containers on disk are mapped read-only into the process's address space. The map
//! is released when the [`crate::file::physical::Physical`] value is dropped, on success and
//! failure paths alike.

use super::Backend;
use crate::{Error::FileError, Result};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A file backend that uses memory-mapped I/O for access to files on disk.
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data; `None` for zero-length files, which cannot be mapped
    data: Option<Mmap>,
}

impl Physical {
    /// Create a new physical file backend by memory-mapping the specified file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;
        if file.metadata().map_err(FileError)?.len() == 0 {
            return Ok(Physical { data: None });
        }

        // SAFETY: read-only map; the input must not be truncated while mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(FileError)?;

        Ok(Physical { data: Some(mmap) })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }
}
