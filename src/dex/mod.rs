//! Container model: classes, fields, methods and instructions.
//!
//! This module defines the in-memory representation of a container and its decoder. The
//! encoder lives with the interning pool in [`crate::pool`], since a container is only ever
//! written from a pool.
//!
//! # Key Components
//!
//! - [`DexContainer`] - A parsed container, classes in container order
//! - [`ClassDefinition`] / [`ClassDef`] - Read-only class view and its owned form
//! - [`MethodDef`], [`FieldDef`] - Member definitions
//! - [`Instruction`] - Method body instructions
//! - [`AccessFlags`] - Class and member flags
//!
//! # Encoding
//!
//! All integers are little-endian; counts and indices are unsigned LEB128. The layout is:
//!
//! ```text
//! magic "dexsplt\0" | version u32
//! strings     : count, (len, utf8)*                 sorted
//! types       : count, string_idx*                  sorted by descriptor
//! prototypes  : count, (return_type, n, type*)*     sorted
//! fields      : count, (class, type, name)*         sorted
//! methods     : count, (class, proto, name)*        sorted
//! classes     : count, class_def*                   container order
//! ```
//!
//! Optional indices are stored as `index + 1` with `0` meaning absent.

mod class;
mod container;
mod field;
mod flags;
mod instruction;
mod method;
mod reader;
mod types;

pub use class::{ClassDef, ClassDefinition};
pub use container::DexContainer;
pub use field::FieldDef;
pub use flags::AccessFlags;
pub use instruction::{FieldOp, Instruction, InvokeKind, TypeOp};
pub use method::{MethodDef, MethodImplementation, MethodKind, CLASS_INITIALIZER, CONSTRUCTOR};
pub use types::{
    class_descriptor, internal_name, is_class_descriptor, validate_type_descriptor, FieldRef,
    MethodRef, Prototype,
};

/// Magic bytes at the start of every container.
pub const CONTAINER_MAGIC: &[u8; 8] = b"dexsplt\0";

/// Encoding version written and accepted by this crate.
pub const CONTAINER_VERSION: u32 = 1;

/// Instruction opcodes of the container encoding.
pub(crate) mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const CONST: u8 = 0x01;
    pub const CONST_STRING: u8 = 0x02;
    pub const TYPE: u8 = 0x03;
    pub const FIELD: u8 = 0x04;
    pub const INVOKE: u8 = 0x05;
    pub const MOVE_RESULT: u8 = 0x06;
    pub const RETURN: u8 = 0x07;
    pub const PAYLOAD: u8 = 0x08;
}
