use std::path::Path;

use crate::{
    dex::{class::ClassDef, reader::read_container},
    file::File,
    Result,
};

/// A parsed, immutable container.
///
/// Classes are kept in container order; every stage of the pipeline iterates them in that
/// order, which makes split and repack output deterministic.
///
/// # Examples
///
/// ```rust,no_run
/// use dexsplit::DexContainer;
/// use std::path::Path;
///
/// let container = DexContainer::from_file(Path::new("classes.dex"))?;
/// for class in container.classes() {
///     println!("{}", class.descriptor);
/// }
/// # Ok::<(), dexsplit::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DexContainer {
    classes: Vec<ClassDef>,
}

impl DexContainer {
    /// Creates a container from already decoded classes.
    #[must_use]
    pub fn new(classes: Vec<ClassDef>) -> Self {
        DexContainer { classes }
    }

    /// Parses the container file at `path`.
    ///
    /// The file is memory-mapped for the duration of the parse and released afterwards.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, and any decode error
    /// from [`DexContainer::parse`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::from_file(path)?;
        Self::parse(file.data())
    }

    /// Parses an in-memory container.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty buffer and any decode error from
    /// [`DexContainer::parse`].
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        let file = File::from_mem(data)?;
        Self::parse(file.data())
    }

    /// Parses a container from a byte slice.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for an unknown magic or version, and
    /// [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for corrupt data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(DexContainer {
            classes: read_container(data)?,
        })
    }

    /// Classes in container order.
    #[must_use]
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    /// Finds a class by descriptor.
    #[must_use]
    pub fn class(&self, descriptor: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|c| c.descriptor == descriptor)
    }

    /// Consumes the container, returning its classes.
    #[must_use]
    pub fn into_classes(self) -> Vec<ClassDef> {
        self.classes
    }
}
