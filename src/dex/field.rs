//! Field definitions.

use crate::dex::{flags::AccessFlags, types::FieldRef};

/// A field declared by a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDef {
    /// Descriptor of the declaring class
    pub class: String,
    /// Field name
    pub name: String,
    /// Field type descriptor
    pub field_type: String,
    /// Access flags
    pub access_flags: AccessFlags,
}

impl FieldDef {
    /// Creates a field definition.
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        field_type: impl Into<String>,
        access_flags: AccessFlags,
    ) -> Self {
        FieldDef {
            class: class.into(),
            name: name.into(),
            field_type: field_type.into(),
            access_flags,
        }
    }

    /// Returns true if this field is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    /// Returns the reference identifying this field.
    #[must_use]
    pub fn reference(&self) -> FieldRef {
        FieldRef::new(
            self.class.clone(),
            self.name.clone(),
            self.field_type.clone(),
        )
    }
}
