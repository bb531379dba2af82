//! # dexsplit Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the crate. Import it to get the container model, the pool and the whole split and
//! repack pipeline in one line.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dexsplit operations
pub use crate::Error;

/// The result type used throughout dexsplit
pub use crate::Result;

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Container Model
// ================================================================================================

/// Containers, classes and members
pub use crate::dex::{
    AccessFlags, ClassDef, ClassDefinition, DexContainer, FieldDef, FieldRef, MethodDef,
    MethodImplementation, MethodKind, MethodRef, Prototype,
};

/// Instructions
pub use crate::dex::{FieldOp, Instruction, InvokeKind, TypeOp};

/// Output container builder
pub use crate::pool::{EntityKind, Pool, MAX_ENTITIES};

// ================================================================================================
// Split and Repack Pipeline
// ================================================================================================

/// Collaborator traits and their shipped implementations
pub use crate::dex2c::{
    BasicFilter, ClassAndMethodFilter, ConversionResult, GeneratedCode, JniSkeletonGenerator,
    MethodConverter, NativeCodeGenerator, NativeStubConverter, RuleFilter,
};

/// Pipeline stages
pub use crate::dex2c::{
    handle_all_dex, handle_dex, handle_dex_bytes, inject_call_register_natives, split,
    split_dex, write_pools, MethodBuckets, RegisterNativesCallerClassDef, Repacker,
    SplitOutput, Splitter,
};

/// Configuration
pub use crate::dex2c::{DexConfig, GlobalDexConfig, ProtectConfig};
