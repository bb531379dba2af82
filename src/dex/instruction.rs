//! Method body instructions.
//!
//! The instruction set modelled here is the subset the split and repack pipeline needs to
//! reason about: every instruction that references a string, type, field or method is
//! explicit, so pools can account for the entities a class pulls in. Instructions that carry
//! no references are kept as an opaque [`Instruction::Payload`].

use strum::{Display, EnumIter, FromRepr};

use crate::dex::types::{FieldRef, MethodRef};

/// Dispatch kind of an invoke instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, FromRepr)]
#[repr(u8)]
pub enum InvokeKind {
    /// `invoke-virtual`
    #[strum(serialize = "invoke-virtual")]
    Virtual = 0,
    /// `invoke-super`
    #[strum(serialize = "invoke-super")]
    Super = 1,
    /// `invoke-direct`
    #[strum(serialize = "invoke-direct")]
    Direct = 2,
    /// `invoke-static`
    #[strum(serialize = "invoke-static")]
    Static = 3,
    /// `invoke-interface`
    #[strum(serialize = "invoke-interface")]
    Interface = 4,
}

/// Instructions that take a single type operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, FromRepr)]
#[repr(u8)]
pub enum TypeOp {
    /// `new-instance`
    #[strum(serialize = "new-instance")]
    NewInstance = 0,
    /// `check-cast`
    #[strum(serialize = "check-cast")]
    CheckCast = 1,
    /// `const-class`
    #[strum(serialize = "const-class")]
    ConstClass = 2,
}

/// Direction of a field access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, FromRepr)]
#[repr(u8)]
pub enum FieldOp {
    /// Read the field into a register
    #[strum(serialize = "get")]
    Get = 0,
    /// Store a register into the field
    #[strum(serialize = "put")]
    Put = 1,
}

/// A single instruction of a method body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// No operation
    Nop,
    /// Load a 32-bit constant
    Const {
        /// Destination register
        register: u16,
        /// Constant value
        value: i32,
    },
    /// Load a string constant
    ConstString {
        /// Destination register
        register: u16,
        /// String value
        value: String,
    },
    /// An instruction with one type operand
    Type {
        /// The operation
        op: TypeOp,
        /// Source or destination register
        register: u16,
        /// Type descriptor
        type_descriptor: String,
    },
    /// Read or write a field; `object` is `None` for static fields
    Field {
        /// Get or put
        op: FieldOp,
        /// Value register
        register: u16,
        /// Object register for instance fields
        object: Option<u16>,
        /// The accessed field
        field: FieldRef,
    },
    /// Invoke a method
    Invoke {
        /// Dispatch kind
        kind: InvokeKind,
        /// Argument registers
        registers: Vec<u16>,
        /// The invoked method
        method: MethodRef,
    },
    /// Move the result of the previous invoke into a register
    MoveResult {
        /// Destination register
        register: u16,
    },
    /// Return from the method, optionally with a value
    Return {
        /// Register holding the return value
        register: Option<u16>,
    },
    /// Encoded instructions that reference no strings, types, fields or methods
    Payload(Vec<u8>),
}

impl Instruction {
    /// `const v{register}, {value}`
    #[must_use]
    pub fn load_const(register: u16, value: i32) -> Self {
        Instruction::Const { register, value }
    }

    /// `invoke-static {registers}, {method}`
    #[must_use]
    pub fn invoke_static(registers: Vec<u16>, method: MethodRef) -> Self {
        Instruction::Invoke {
            kind: InvokeKind::Static,
            registers,
            method,
        }
    }

    /// `return-void`
    #[must_use]
    pub fn return_void() -> Self {
        Instruction::Return { register: None }
    }

    /// Returns the highest register this instruction touches, if any.
    #[must_use]
    pub fn max_register(&self) -> Option<u16> {
        match self {
            Instruction::Const { register, .. }
            | Instruction::ConstString { register, .. }
            | Instruction::Type { register, .. }
            | Instruction::MoveResult { register } => Some(*register),
            Instruction::Field {
                register, object, ..
            } => Some(object.map_or(*register, |object| object.max(*register))),
            Instruction::Invoke { registers, .. } => registers.iter().copied().max(),
            Instruction::Return { register } => *register,
            Instruction::Nop | Instruction::Payload(_) => None,
        }
    }
}
