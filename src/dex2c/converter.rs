//! Method conversion.
//!
//! A [`MethodConverter`] turns one accepted method into the methods that replace it in the
//! shell class and the single method carrying its original body into the implementation
//! container. The splitter relies on the shape of the result, so [`ConversionResult`] can
//! only be built through a validating constructor.

use crate::{
    dex::{AccessFlags, MethodDef},
    Result,
};

/// Replacement methods plus the one implementation method produced for a converted method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    replacements: Vec<MethodDef>,
    implementation: MethodDef,
}

impl ConversionResult {
    /// Validates and pairs the outputs of converting `original`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] if `replacements` is empty, or if a
    /// replacement or the implementation is declared in a class other than the class of
    /// `original`.
    pub fn new(
        original: &MethodDef,
        replacements: Vec<MethodDef>,
        implementation: MethodDef,
    ) -> Result<Self> {
        if replacements.is_empty() {
            return Err(contract_error!(
                "conversion of {} produced no replacement",
                original.reference()
            ));
        }

        if let Some(stray) = replacements
            .iter()
            .chain(std::iter::once(&implementation))
            .find(|m| m.class != original.class)
        {
            return Err(contract_error!(
                "conversion of {} produced {} in another class",
                original.reference(),
                stray.reference()
            ));
        }

        Ok(ConversionResult {
            replacements,
            implementation,
        })
    }

    /// Methods that take the place of the original in the shell class, in order
    #[must_use]
    pub fn replacements(&self) -> &[MethodDef] {
        &self.replacements
    }

    /// Method holding the original body
    #[must_use]
    pub fn implementation(&self) -> &MethodDef {
        &self.implementation
    }

    /// Splits the result into replacements and implementation.
    #[must_use]
    pub fn into_parts(self) -> (Vec<MethodDef>, MethodDef) {
        (self.replacements, self.implementation)
    }
}

/// Converts one method into its shell replacements and its implementation.
///
/// Converters are called concurrently for different classes and must not keep mutable state
/// between calls.
pub trait MethodConverter: Send + Sync {
    /// Converts `method`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] if the method cannot be converted or the
    /// produced result is malformed.
    fn convert(&self, method: &MethodDef) -> Result<ConversionResult>;
}

/// Replaces a method with a bodyless native method of the same identity.
///
/// The native stub keeps the name, prototype and dispatch kind of the original, so callers
/// and overriding methods are unaffected. A `synchronized` method keeps acquiring its
/// monitor through the native `SYNCHRONIZED` flag. The implementation is the original method
/// unchanged; `(class, name, prototype)` is unique within a class, which makes it unique
/// within the implementation container as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeStubConverter;

impl NativeStubConverter {
    /// Builds the native stub standing in for `method` in the shell class.
    #[must_use]
    pub fn native_stub(method: &MethodDef) -> MethodDef {
        let mut flags = method.access_flags;
        if flags.contains(AccessFlags::DECLARED_SYNCHRONIZED) {
            flags.insert(AccessFlags::SYNCHRONIZED);
        }
        flags.remove(AccessFlags::ABSTRACT | AccessFlags::DECLARED_SYNCHRONIZED);
        flags.insert(AccessFlags::NATIVE);

        MethodDef::new(
            method.class.clone(),
            method.name.clone(),
            method.prototype.clone(),
            flags,
        )
    }
}

impl MethodConverter for NativeStubConverter {
    fn convert(&self, method: &MethodDef) -> Result<ConversionResult> {
        if method.is_constructor() {
            return Err(contract_error!(
                "{} initializes its class or instance and cannot become native",
                method.reference()
            ));
        }
        if !method.has_implementation() {
            return Err(contract_error!(
                "{} has no body to convert",
                method.reference()
            ));
        }

        ConversionResult::new(method, vec![Self::native_stub(method)], method.clone())
    }
}
