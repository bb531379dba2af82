//! Access flags for classes, fields and methods.
//!
//! The container stores one flag word per class, field and method. The same bit can carry a
//! different meaning depending on the member it is attached to (`0x40` is `VOLATILE` on a
//! field and `BRIDGE` on a method), so both names are defined.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    /// Access and property flags of a class, field or method
    pub struct AccessFlags: u32 {
        /// Visible everywhere
        const PUBLIC = 0x0001;
        /// Only visible to the defining class
        const PRIVATE = 0x0002;
        /// Visible to package and subclasses
        const PROTECTED = 0x0004;
        /// Not bound to an instance
        const STATIC = 0x0008;
        /// Not overridable / not subclassable / immutable
        const FINAL = 0x0010;
        /// Method acquires the monitor around the call
        const SYNCHRONIZED = 0x0020;
        /// Field with special access rules for thread safety
        const VOLATILE = 0x0040;
        /// Compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Field not saved by default serialization
        const TRANSIENT = 0x0080;
        /// Method takes a variable number of arguments
        const VARARGS = 0x0080;
        /// Method implemented in native code
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// Class or method is abstract
        const ABSTRACT = 0x0400;
        /// Strict floating-point rules
        const STRICT = 0x0800;
        /// Not directly defined in source
        const SYNTHETIC = 0x1000;
        /// Class is an annotation
        const ANNOTATION = 0x2000;
        /// Class or field is an enum
        const ENUM = 0x4000;
        /// Method is a constructor or class initializer
        const CONSTRUCTOR = 0x1_0000;
        /// Method was declared `synchronized`
        const DECLARED_SYNCHRONIZED = 0x2_0000;
    }
}

impl AccessFlags {
    /// Flags which make a method dispatch directly (no vtable entry)
    pub const DIRECT_MASK: AccessFlags = AccessFlags::STATIC
        .union(AccessFlags::PRIVATE)
        .union(AccessFlags::CONSTRUCTOR);

    /// Returns true if a method with these flags is a direct method.
    #[must_use]
    pub fn is_direct(self) -> bool {
        self.intersects(Self::DIRECT_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_classification() {
        assert!(AccessFlags::STATIC.is_direct());
        assert!((AccessFlags::PRIVATE | AccessFlags::FINAL).is_direct());
        assert!((AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR).is_direct());
        assert!(!(AccessFlags::PUBLIC | AccessFlags::FINAL).is_direct());
        assert!(!AccessFlags::empty().is_direct());
    }

    #[test]
    fn shared_bits() {
        assert_eq!(AccessFlags::VOLATILE.bits(), AccessFlags::BRIDGE.bits());
        assert_eq!(AccessFlags::TRANSIENT.bits(), AccessFlags::VARARGS.bits());
        assert_eq!(
            AccessFlags::from_bits_truncate(0x1_0009),
            AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::CONSTRUCTOR
        );
    }
}
