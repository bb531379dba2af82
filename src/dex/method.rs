//! Method definitions.
//!
//! A [`MethodDef`] is identified by its declaring class, name and prototype. Methods are
//! either *direct* (static, private, or constructors, dispatched without a vtable) or
//! *virtual*; the container stores the two groups separately per class, so every stage that
//! rebuilds a class needs the partition exposed by [`MethodDef::kind`].

use crate::dex::{
    flags::AccessFlags,
    instruction::Instruction,
    types::{MethodRef, Prototype},
};

/// Name of the static class initializer.
pub const CLASS_INITIALIZER: &str = "<clinit>";
/// Name of instance constructors.
pub const CONSTRUCTOR: &str = "<init>";

/// Dispatch group of a method within its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Static, private or constructor
    Direct,
    /// Subject to dynamic dispatch
    Virtual,
}

/// The body of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodImplementation {
    /// Number of registers the frame uses, parameters included
    pub registers: u16,
    /// Instructions in execution order
    pub instructions: Vec<Instruction>,
}

impl MethodImplementation {
    /// Creates a method body.
    #[must_use]
    pub fn new(registers: u16, instructions: Vec<Instruction>) -> Self {
        MethodImplementation {
            registers,
            instructions,
        }
    }
}

/// A method declared by a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDef {
    /// Descriptor of the declaring class
    pub class: String,
    /// Method name
    pub name: String,
    /// Method prototype
    pub prototype: Prototype,
    /// Access flags
    pub access_flags: AccessFlags,
    /// Method body, `None` for native and abstract methods
    pub implementation: Option<MethodImplementation>,
}

impl MethodDef {
    /// Creates a bodyless method.
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        prototype: Prototype,
        access_flags: AccessFlags,
    ) -> Self {
        MethodDef {
            class: class.into(),
            name: name.into(),
            prototype,
            access_flags,
            implementation: None,
        }
    }

    /// Attaches a body to this method.
    #[must_use]
    pub fn with_implementation(mut self, implementation: MethodImplementation) -> Self {
        self.implementation = Some(implementation);
        self
    }

    /// Returns the dispatch group of this method.
    #[must_use]
    pub fn kind(&self) -> MethodKind {
        if self.is_direct() {
            MethodKind::Direct
        } else {
            MethodKind::Virtual
        }
    }

    /// Returns true for static, private and constructor methods.
    ///
    /// Methods named `<init>` or `<clinit>` are direct even if the constructor flag is
    /// missing.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.access_flags.is_direct() || self.name.starts_with('<')
    }

    /// Returns true for `<init>` and `<clinit>`.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR || self.name == CLASS_INITIALIZER
    }

    /// Returns true for the static class initializer.
    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        self.name == CLASS_INITIALIZER
    }

    /// Returns true if this method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    /// Returns true if this method is native.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.access_flags.contains(AccessFlags::NATIVE)
    }

    /// Returns true if this method is abstract.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(AccessFlags::ABSTRACT)
    }

    /// Returns true if this method has a body.
    #[must_use]
    pub fn has_implementation(&self) -> bool {
        self.implementation.is_some()
    }

    /// Returns the reference identifying this method.
    #[must_use]
    pub fn reference(&self) -> MethodRef {
        MethodRef::new(self.class.clone(), self.name.clone(), self.prototype.clone())
    }

    /// Returns true if `other` has the same (class, name, prototype) identity.
    #[must_use]
    pub fn same_identity(&self, other: &MethodDef) -> bool {
        self.class == other.class && self.name == other.name && self.prototype == other.prototype
    }

    /// Number of registers holding the incoming arguments, `this` included.
    #[must_use]
    pub fn incoming_registers(&self) -> usize {
        self.prototype.parameter_registers() + usize::from(!self.is_static())
    }
}
