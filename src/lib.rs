// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dexsplit
//!
//! Splits bytecode containers for native protection. Selected methods of an input
//! container are replaced by native stubs in a **shell container** that stays loadable by
//! the runtime, while their original bodies move into an **implementation container** that
//! a native code generator translates. A second pass injects native registration calls
//! into the class initializers of the shell and repacks its classes over as many
//! containers as the per-container entity ceiling requires.
//!
//! ## Features
//!
//! - **Memory-mapped input** - Containers are parsed straight from mapped files
//! - **Deterministic output** - Identical input yields byte-identical containers, whether
//!   classes are converted in parallel or not
//! - **Pluggable collaborators** - Filters, converters and code generators are traits
//! - **Overflow-aware packing** - Entity ceilings drive repacking, never errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dexsplit::prelude::*;
//! use std::{collections::HashSet, path::Path};
//!
//! let options = ProtectConfig::default();
//! let out = Path::new("out");
//!
//! // split classes.dex and write its native sources
//! let config = handle_dex(
//!     Path::new("classes.dex"),
//!     &BasicFilter,
//!     &NativeStubConverter,
//!     &JniSkeletonGenerator,
//!     out,
//!     &options,
//! )?;
//!
//! // inject registration calls and pack the shell into runtime containers
//! let pools = inject_call_register_natives(
//!     &config,
//!     Pool::new(),
//!     &HashSet::new(),
//!     options.max_pool_size,
//! )?;
//! write_pools(&pools, out)?;
//! # Ok::<(), dexsplit::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`dex`] - Container model and decoder
//! - [`pool`] - Interning container builder and encoder
//! - [`dex2c`] - The split, code generation and repack pipeline
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Errors raised while processing one
//! input container are wrapped in [`Error::Dex`] naming that container.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dexsplit::prelude::*;
///
/// let mut pool = Pool::new();
/// pool.intern(&ClassDef::new("Lapp/Main;"))?;
/// assert_eq!(pool.len(), 1);
/// # Ok::<(), dexsplit::Error>(())
/// ```
pub mod prelude;

pub mod dex;
pub mod dex2c;
pub mod pool;

/// `dexsplit` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Example
///
/// ```rust,no_run
/// use dexsplit::{DexContainer, Result};
///
/// fn class_count(path: &str) -> Result<usize> {
///     Ok(DexContainer::from_file(std::path::Path::new(path))?.classes().len())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dexsplit` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Parsed input container
pub use dex::DexContainer;

/// Class, method and instruction model
pub use dex::{
    AccessFlags, ClassDef, ClassDefinition, FieldDef, FieldRef, Instruction, MethodDef,
    MethodImplementation, MethodRef, Prototype,
};

/// Output container builder
pub use pool::{EntityKind, Pool};

/// Low-level file access and parsing utilities
pub use file::{parser::Parser, File};
