//! Mutable output container builder.
//!
//! A [`Pool`] accumulates class definitions destined for one output container and keeps
//! track of every entity those classes reference: strings, types, prototypes, fields and
//! methods. The runtime format indexes types, fields and methods with 16-bit indices, so a
//! single container can reference at most [`MAX_ENTITIES`] of each. Callers that pack many
//! classes ask [`Pool::has_overflowed`] after every intern and move on to a fresh pool once
//! their ceiling is reached; reaching the ceiling is ordinary control flow, not an error.
//!
//! # Lifecycle
//!
//! 1. [`Pool::new`] - empty, accepting classes
//! 2. [`Pool::intern`] - any number of times, one class per call
//! 3. [`Pool::seal`] - optional; further interns fail with [`crate::Error::PoolSealed`]
//! 4. [`Pool::write_to`] / [`Pool::write_to_file`] - serialize to a concrete container
//!
//! Pools are mutated through `&mut self` only and are not meant to be shared between
//! threads while being filled.
//!
//! # Examples
//!
//! ```rust
//! use dexsplit::{ClassDef, DexContainer, Pool};
//!
//! let mut pool = Pool::new();
//! pool.intern(&ClassDef::new("Lcom/example/Foo;"))?;
//!
//! let bytes = pool.to_bytes()?;
//! let container = DexContainer::parse(&bytes)?;
//! assert_eq!(container.classes().len(), 1);
//! # Ok::<(), dexsplit::Error>(())
//! ```

mod writer;

use std::{
    collections::{BTreeSet, HashSet},
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use strum::{Display, EnumIter};

use crate::{
    dex::{
        ClassDef, ClassDefinition, FieldRef, Instruction, MethodDef, MethodRef, Prototype,
    },
    Error::PoolSealed,
    Result,
};

/// Number of entries a 16-bit indexed section can address.
pub const MAX_ENTITIES: usize = 1 << 16;

/// The kinds of entities a container indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    /// String constants and names
    String,
    /// Type descriptors
    Type,
    /// Method prototypes
    Prototype,
    /// Field references
    Field,
    /// Method references
    Method,
}

impl EntityKind {
    /// Kinds addressed with 16-bit indices, subject to [`MAX_ENTITIES`] and to the
    /// caller-supplied ceiling of [`Pool::has_overflowed`]
    pub const CAPPED: [EntityKind; 3] = [EntityKind::Type, EntityKind::Field, EntityKind::Method];
}

/// Mutable builder for one output container.
#[derive(Debug, Default)]
pub struct Pool {
    classes: Vec<ClassDef>,
    descriptors: HashSet<String>,
    strings: BTreeSet<String>,
    types: BTreeSet<String>,
    prototypes: BTreeSet<Prototype>,
    fields: BTreeSet<FieldRef>,
    methods: BTreeSet<MethodRef>,
    sealed: bool,
}

impl Pool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class and every entity it references.
    ///
    /// The class is copied; later changes to the source are not observed by the pool.
    ///
    /// # Errors
    /// - [`crate::Error::PoolSealed`] if the pool was sealed
    /// - [`crate::Error::ContractViolation`] if a class with the same descriptor was already
    ///   interned, or a member of the class names a different declaring class
    pub fn intern<C: ClassDefinition + ?Sized>(&mut self, class: &C) -> Result<()> {
        if self.sealed {
            return Err(PoolSealed);
        }

        let class = class.to_class_def();
        if self.descriptors.contains(&class.descriptor) {
            return Err(contract_error!(
                "class {} has already been interned",
                class.descriptor
            ));
        }

        if let Some(field) = class.fields.iter().find(|f| f.class != class.descriptor) {
            return Err(contract_error!(
                "field {} is declared in {}",
                field.reference(),
                class.descriptor
            ));
        }
        if let Some(method) = class.methods().find(|m| m.class != class.descriptor) {
            return Err(contract_error!(
                "method {} is declared in {}",
                method.reference(),
                class.descriptor
            ));
        }

        self.account_class(&class);
        self.descriptors.insert(class.descriptor.clone());
        self.classes.push(class);
        Ok(())
    }

    /// Returns true once any 16-bit indexed section holds `limit` or more entries.
    ///
    /// Checked after each intern, this keeps every pool at the ceiling plus at most the
    /// entities of the class that reached it.
    #[must_use]
    pub fn has_overflowed(&self, limit: usize) -> bool {
        EntityKind::CAPPED
            .iter()
            .any(|kind| self.entity_count(*kind) >= limit)
    }

    /// Number of distinct entities of `kind` referenced so far.
    #[must_use]
    pub fn entity_count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::String => self.strings.len(),
            EntityKind::Type => self.types.len(),
            EntityKind::Prototype => self.prototypes.len(),
            EntityKind::Field => self.fields.len(),
            EntityKind::Method => self.methods.len(),
        }
    }

    /// Stops the pool from accepting further classes.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Returns true if the pool was sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Interned classes, in intern order.
    #[must_use]
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    /// Returns true if a class with `descriptor` was interned.
    #[must_use]
    pub fn contains(&self, descriptor: &str) -> bool {
        self.descriptors.contains(descriptor)
    }

    /// Number of interned classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if no class was interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Serializes the pool into a container image.
    ///
    /// # Errors
    /// Returns [`crate::Error::TooManyEntities`] if a 16-bit indexed section exceeds
    /// [`MAX_ENTITIES`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        writer::encode(self)
    }

    /// Serializes the pool into `sink`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TooManyEntities`] as [`Pool::to_bytes`] does, and
    /// [`crate::Error::FileError`] if writing fails.
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<()> {
        let bytes = self.to_bytes()?;
        sink.write_all(&bytes)?;
        Ok(())
    }

    /// Serializes the pool into a new file at `path`, replacing any existing file.
    ///
    /// # Errors
    /// Same as [`Pool::write_to`].
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut writer = BufWriter::new(fs::File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn account_class(&mut self, class: &ClassDef) {
        self.add_type(&class.descriptor);
        if let Some(superclass) = &class.superclass {
            self.add_type(superclass);
        }
        for interface in &class.interfaces {
            self.add_type(interface);
        }
        if let Some(source_file) = &class.source_file {
            self.add_string(source_file);
        }
        for field in &class.fields {
            self.add_field(&field.reference());
        }
        for method in class.methods() {
            self.account_method(method);
        }
    }

    fn account_method(&mut self, method: &MethodDef) {
        self.add_method(&method.reference());

        let Some(implementation) = &method.implementation else {
            return;
        };
        for instruction in &implementation.instructions {
            match instruction {
                Instruction::ConstString { value, .. } => self.add_string(value),
                Instruction::Type {
                    type_descriptor, ..
                } => self.add_type(type_descriptor),
                Instruction::Field { field, .. } => self.add_field(field),
                Instruction::Invoke { method, .. } => self.add_method(method),
                Instruction::Nop
                | Instruction::Const { .. }
                | Instruction::MoveResult { .. }
                | Instruction::Return { .. }
                | Instruction::Payload(_) => {}
            }
        }
    }

    fn add_string(&mut self, value: &str) {
        if !self.strings.contains(value) {
            self.strings.insert(value.to_string());
        }
    }

    fn add_type(&mut self, descriptor: &str) {
        self.add_string(descriptor);
        if !self.types.contains(descriptor) {
            self.types.insert(descriptor.to_string());
        }
    }

    fn add_prototype(&mut self, prototype: &Prototype) {
        self.add_type(&prototype.return_type);
        for parameter in &prototype.parameters {
            self.add_type(parameter);
        }
        if !self.prototypes.contains(prototype) {
            self.prototypes.insert(prototype.clone());
        }
    }

    fn add_field(&mut self, field: &FieldRef) {
        self.add_type(&field.class);
        self.add_type(&field.field_type);
        self.add_string(&field.name);
        if !self.fields.contains(field) {
            self.fields.insert(field.clone());
        }
    }

    fn add_method(&mut self, method: &MethodRef) {
        self.add_type(&method.class);
        self.add_prototype(&method.prototype);
        self.add_string(&method.name);
        if !self.methods.contains(method) {
            self.methods.insert(method.clone());
        }
    }
}
