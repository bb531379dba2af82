//! Class definitions.
//!
//! [`ClassDefinition`] is the read-only view every stage of the pipeline works against: the
//! decoder produces owned [`ClassDef`] values, the splitter rebuilds new owned values with
//! replaced method lists, and the repacker wraps classes in adapters that present a modified
//! class initializer without touching the wrapped class. Pools intern anything implementing
//! the trait.

use std::borrow::Cow;

use crate::dex::{
    field::FieldDef,
    flags::AccessFlags,
    method::{MethodDef, MethodKind},
    types::internal_name,
};

/// Read-only view of a class definition.
///
/// Method lists are returned as [`Cow`] so adapters can present derived lists without the
/// underlying class having to store them.
pub trait ClassDefinition {
    /// Type descriptor of the class, e.g. `Lcom/example/Foo;`
    fn descriptor(&self) -> &str;

    /// Access flags of the class
    fn access_flags(&self) -> AccessFlags;

    /// Descriptor of the superclass, `None` only for the root of the hierarchy
    fn superclass(&self) -> Option<&str>;

    /// Descriptors of directly implemented interfaces
    fn interfaces(&self) -> &[String];

    /// Name of the source file, if recorded
    fn source_file(&self) -> Option<&str>;

    /// Declared fields
    fn fields(&self) -> &[FieldDef];

    /// Direct methods in declaration order
    fn direct_methods(&self) -> Cow<'_, [MethodDef]>;

    /// Virtual methods in declaration order
    fn virtual_methods(&self) -> Cow<'_, [MethodDef]>;

    /// The class name without `L` and `;`, e.g. `com/example/Foo`
    fn internal_name(&self) -> &str {
        let descriptor = self.descriptor();
        internal_name(descriptor).unwrap_or(descriptor)
    }

    /// Total number of declared methods
    fn method_count(&self) -> usize {
        self.direct_methods().len() + self.virtual_methods().len()
    }

    /// Copies this view into an owned [`ClassDef`]
    fn to_class_def(&self) -> ClassDef {
        ClassDef {
            descriptor: self.descriptor().to_string(),
            access_flags: self.access_flags(),
            superclass: self.superclass().map(str::to_string),
            interfaces: self.interfaces().to_vec(),
            source_file: self.source_file().map(str::to_string),
            fields: self.fields().to_vec(),
            direct_methods: self.direct_methods().into_owned(),
            virtual_methods: self.virtual_methods().into_owned(),
        }
    }
}

/// An owned class definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    /// Type descriptor
    pub descriptor: String,
    /// Access flags
    pub access_flags: AccessFlags,
    /// Superclass descriptor
    pub superclass: Option<String>,
    /// Implemented interface descriptors
    pub interfaces: Vec<String>,
    /// Source file name
    pub source_file: Option<String>,
    /// Declared fields
    pub fields: Vec<FieldDef>,
    /// Direct methods
    pub direct_methods: Vec<MethodDef>,
    /// Virtual methods
    pub virtual_methods: Vec<MethodDef>,
}

impl ClassDef {
    /// Creates an empty public class extending `java.lang.Object`.
    pub fn new(descriptor: impl Into<String>) -> Self {
        ClassDef {
            descriptor: descriptor.into(),
            access_flags: AccessFlags::PUBLIC,
            superclass: Some("Ljava/lang/Object;".to_string()),
            interfaces: Vec::new(),
            source_file: None,
            fields: Vec::new(),
            direct_methods: Vec::new(),
            virtual_methods: Vec::new(),
        }
    }

    /// Sets the access flags.
    #[must_use]
    pub fn with_access_flags(mut self, access_flags: AccessFlags) -> Self {
        self.access_flags = access_flags;
        self
    }

    /// Sets or clears the superclass.
    #[must_use]
    pub fn with_superclass(mut self, superclass: Option<&str>) -> Self {
        self.superclass = superclass.map(str::to_string);
        self
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Sets the source file name.
    #[must_use]
    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a method to the direct or virtual list according to its kind.
    #[must_use]
    pub fn with_method(mut self, method: MethodDef) -> Self {
        match method.kind() {
            MethodKind::Direct => self.direct_methods.push(method),
            MethodKind::Virtual => self.virtual_methods.push(method),
        }
        self
    }

    /// Creates an independent copy of `class` with the given method lists.
    ///
    /// Everything but the methods (flags, hierarchy, fields, source file) is carried over.
    pub fn rebuild(
        class: &dyn ClassDefinition,
        direct_methods: Vec<MethodDef>,
        virtual_methods: Vec<MethodDef>,
    ) -> Self {
        ClassDef {
            descriptor: class.descriptor().to_string(),
            access_flags: class.access_flags(),
            superclass: class.superclass().map(str::to_string),
            interfaces: class.interfaces().to_vec(),
            source_file: class.source_file().map(str::to_string),
            fields: class.fields().to_vec(),
            direct_methods,
            virtual_methods,
        }
    }

    /// Iterates direct methods, then virtual methods.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }

    /// Finds a method by name and prototype descriptor.
    #[must_use]
    pub fn find_method(&self, name: &str, prototype: &str) -> Option<&MethodDef> {
        self.methods()
            .find(|m| m.name == name && m.prototype.to_string() == prototype)
    }
}

impl ClassDefinition for ClassDef {
    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    fn direct_methods(&self) -> Cow<'_, [MethodDef]> {
        Cow::Borrowed(&self.direct_methods)
    }

    fn virtual_methods(&self) -> Cow<'_, [MethodDef]> {
        Cow::Borrowed(&self.virtual_methods)
    }

    fn to_class_def(&self) -> ClassDef {
        self.clone()
    }
}
