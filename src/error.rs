use thiserror::Error;

use crate::pool::EntityKind;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! contract_error {
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::ContractViolation(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into the categories the split and repack pipeline distinguishes:
///
/// ## Decode errors
/// - [`Error::Malformed`] - Corrupted or invalid container structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the container boundaries
/// - [`Error::NotSupported`] - Unknown container magic or version
/// - [`Error::Empty`] - Empty input provided
///
/// ## Encode errors
/// - [`Error::TooManyEntities`] - A pool exceeds the hard per-container index limit
/// - [`Error::PoolSealed`] - Interning into a pool that was already sealed
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Collaborator errors
/// - [`Error::ContractViolation`] - A converter, filter or caller broke an invariant the
///   pipeline relies on. These are programming errors and never recovered from.
///
/// ## Batch errors
/// - [`Error::AlreadyGenerated`] - Global init glue was requested twice
/// - [`Error::LockError`] - The batch coordinator's lock was poisoned
/// - [`Error::Dex`] - Any of the above, tagged with the input container it happened in
///
/// Entity-count overflow is *not* an error: it is reported through
/// [`crate::Pool::has_overflowed`] and drives normal control flow.
///
/// # Examples
///
/// ```rust,no_run
/// use dexsplit::{DexContainer, Error};
/// use std::path::Path;
///
/// match DexContainer::from_file(Path::new("classes.dex")) {
///     Ok(container) => println!("{} classes", container.classes().len()),
///     Err(Error::NotSupported) => eprintln!("not a container this crate understands"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed container: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The container is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the container.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This container type or version is not supported.
    #[error("This container type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while reading input containers or writing
    /// any of the produced artifacts.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A pool references more entities of one kind than a single container can index.
    ///
    /// Raised at serialization time. The repacker avoids this by spilling into a new pool
    /// once [`crate::Pool::has_overflowed`] reports the configured ceiling.
    #[error("Too many {kind} references for a single container: {count}")]
    TooManyEntities {
        /// The section which exceeded the limit
        kind: EntityKind,
        /// The number of entries the section held
        count: usize,
    },

    /// A class was interned into a pool after it had been sealed.
    #[error("Pool has been sealed and does not accept further classes")]
    PoolSealed,

    /// A collaborator or caller broke an invariant of the pipeline.
    ///
    /// Examples are a converter returning no replacement methods, or a class that is both
    /// excluded as a main class and recorded as handled.
    #[error("Contract violation - {0}")]
    ContractViolation(String),

    /// The process-wide JNI init glue was already generated for this batch.
    #[error("JNI init code has already been generated for this batch")]
    AlreadyGenerated,

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// An error that happened while processing one specific input container.
    #[error("{name}: {source}")]
    Dex {
        /// File name of the input container
        name: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Tags this error with the input container it occurred in.
    ///
    /// Errors which are already tagged are returned unchanged.
    #[must_use]
    pub fn in_dex(self, name: &str) -> Error {
        match self {
            Error::Dex { .. } => self,
            other => Error::Dex {
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }
}
