//! Container encoder.
//!
//! Lays out a [`Pool`] in the section order documented in [`crate::dex`]. Identifier
//! sections come straight from the pool's sorted sets, so two pools holding the same
//! classes in the same order encode to the same bytes.

use std::collections::HashMap;

use crate::{
    dex::{
        opcodes, AccessFlags, ClassDef, FieldRef, Instruction, MethodDef, MethodImplementation,
        MethodRef, Prototype, CONTAINER_MAGIC, CONTAINER_VERSION,
    },
    file::io::{write_le, write_sleb128, write_uleb128},
    pool::{EntityKind, Pool, MAX_ENTITIES},
    Error::TooManyEntities,
    Result,
};

/// Index lookup tables for one encode run.
struct Indices<'p> {
    strings: HashMap<&'p str, u32>,
    types: HashMap<&'p str, u32>,
    prototypes: HashMap<&'p Prototype, u32>,
    fields: HashMap<&'p FieldRef, u32>,
    methods: HashMap<&'p MethodRef, u32>,
}

fn index_of<I>(items: I) -> HashMap<I::Item, u32>
where
    I: Iterator,
    I::Item: std::hash::Hash + Eq,
{
    // Section sizes are bounded by MAX_ENTITIES or by the string count, both below u32::MAX
    items.zip(0u32..).collect()
}

fn missing(kind: EntityKind, what: &dyn std::fmt::Display) -> crate::Error {
    malformed_error!("{} {} was not interned", kind, what)
}

impl<'p> Indices<'p> {
    fn new(pool: &'p Pool) -> Self {
        Indices {
            strings: index_of(pool.strings.iter().map(String::as_str)),
            types: index_of(pool.types.iter().map(String::as_str)),
            prototypes: index_of(pool.prototypes.iter()),
            fields: index_of(pool.fields.iter()),
            methods: index_of(pool.methods.iter()),
        }
    }

    fn string(&self, value: &str) -> Result<u32> {
        self.strings
            .get(value)
            .copied()
            .ok_or_else(|| missing(EntityKind::String, &value))
    }

    fn type_index(&self, descriptor: &str) -> Result<u32> {
        self.types
            .get(descriptor)
            .copied()
            .ok_or_else(|| missing(EntityKind::Type, &descriptor))
    }

    fn prototype(&self, prototype: &Prototype) -> Result<u32> {
        self.prototypes
            .get(prototype)
            .copied()
            .ok_or_else(|| missing(EntityKind::Prototype, prototype))
    }

    fn field(&self, field: &FieldRef) -> Result<u32> {
        self.fields
            .get(field)
            .copied()
            .ok_or_else(|| missing(EntityKind::Field, field))
    }

    fn method(&self, method: &MethodRef) -> Result<u32> {
        self.methods
            .get(method)
            .copied()
            .ok_or_else(|| missing(EntityKind::Method, method))
    }
}

fn write_count(out: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u32::try_from(count).map_err(|_| malformed_error!("Count {} too large", count))?;
    write_uleb128(out, count);
    Ok(())
}

fn write_opt(out: &mut Vec<u8>, index: Option<u32>) {
    write_uleb128(out, index.map_or(0, |i| i + 1));
}

fn write_register_opt(out: &mut Vec<u8>, register: Option<u16>) {
    write_uleb128(out, register.map_or(0, |r| u32::from(r) + 1));
}

fn write_flags(out: &mut Vec<u8>, flags: AccessFlags) {
    write_uleb128(out, flags.bits());
}

/// Encodes a complete container.
pub(super) fn encode(pool: &Pool) -> Result<Vec<u8>> {
    for kind in EntityKind::CAPPED {
        let count = pool.entity_count(kind);
        if count > MAX_ENTITIES {
            return Err(TooManyEntities { kind, count });
        }
    }

    let indices = Indices::new(pool);
    let mut out = Vec::with_capacity(4096);

    out.extend_from_slice(CONTAINER_MAGIC);
    write_le(&mut out, CONTAINER_VERSION);

    write_count(&mut out, pool.strings.len())?;
    for value in &pool.strings {
        write_count(&mut out, value.len())?;
        out.extend_from_slice(value.as_bytes());
    }

    write_count(&mut out, pool.types.len())?;
    for descriptor in &pool.types {
        write_uleb128(&mut out, indices.string(descriptor)?);
    }

    write_count(&mut out, pool.prototypes.len())?;
    for prototype in &pool.prototypes {
        write_uleb128(&mut out, indices.type_index(&prototype.return_type)?);
        write_count(&mut out, prototype.parameters.len())?;
        for parameter in &prototype.parameters {
            write_uleb128(&mut out, indices.type_index(parameter)?);
        }
    }

    write_count(&mut out, pool.fields.len())?;
    for field in &pool.fields {
        write_uleb128(&mut out, indices.type_index(&field.class)?);
        write_uleb128(&mut out, indices.type_index(&field.field_type)?);
        write_uleb128(&mut out, indices.string(&field.name)?);
    }

    write_count(&mut out, pool.methods.len())?;
    for method in &pool.methods {
        write_uleb128(&mut out, indices.type_index(&method.class)?);
        write_uleb128(&mut out, indices.prototype(&method.prototype)?);
        write_uleb128(&mut out, indices.string(&method.name)?);
    }

    write_count(&mut out, pool.classes.len())?;
    for class in &pool.classes {
        write_class(&mut out, &indices, class)?;
    }

    Ok(out)
}

fn write_class(out: &mut Vec<u8>, indices: &Indices, class: &ClassDef) -> Result<()> {
    write_uleb128(out, indices.type_index(&class.descriptor)?);
    write_flags(out, class.access_flags);
    write_opt(
        out,
        class
            .superclass
            .as_deref()
            .map(|s| indices.type_index(s))
            .transpose()?,
    );

    write_count(out, class.interfaces.len())?;
    for interface in &class.interfaces {
        write_uleb128(out, indices.type_index(interface)?);
    }

    write_opt(
        out,
        class
            .source_file
            .as_deref()
            .map(|s| indices.string(s))
            .transpose()?,
    );

    write_count(out, class.fields.len())?;
    for field in &class.fields {
        write_uleb128(out, indices.field(&field.reference())?);
        write_flags(out, field.access_flags);
    }

    write_methods(out, indices, &class.direct_methods)?;
    write_methods(out, indices, &class.virtual_methods)
}

fn write_methods(out: &mut Vec<u8>, indices: &Indices, methods: &[MethodDef]) -> Result<()> {
    write_count(out, methods.len())?;
    for method in methods {
        write_uleb128(out, indices.method(&method.reference())?);
        write_flags(out, method.access_flags);
        match &method.implementation {
            None => out.push(0),
            Some(implementation) => {
                out.push(1);
                write_code(out, indices, implementation)?;
            }
        }
    }
    Ok(())
}

fn write_code(
    out: &mut Vec<u8>,
    indices: &Indices,
    implementation: &MethodImplementation,
) -> Result<()> {
    write_uleb128(out, u32::from(implementation.registers));
    write_count(out, implementation.instructions.len())?;

    for instruction in &implementation.instructions {
        match instruction {
            Instruction::Nop => out.push(opcodes::NOP),
            Instruction::Const { register, value } => {
                out.push(opcodes::CONST);
                write_uleb128(out, u32::from(*register));
                write_sleb128(out, *value);
            }
            Instruction::ConstString { register, value } => {
                out.push(opcodes::CONST_STRING);
                write_uleb128(out, u32::from(*register));
                write_uleb128(out, indices.string(value)?);
            }
            Instruction::Type {
                op,
                register,
                type_descriptor,
            } => {
                out.push(opcodes::TYPE);
                out.push(*op as u8);
                write_uleb128(out, u32::from(*register));
                write_uleb128(out, indices.type_index(type_descriptor)?);
            }
            Instruction::Field {
                op,
                register,
                object,
                field,
            } => {
                out.push(opcodes::FIELD);
                out.push(*op as u8);
                write_uleb128(out, u32::from(*register));
                write_register_opt(out, *object);
                write_uleb128(out, indices.field(field)?);
            }
            Instruction::Invoke {
                kind,
                registers,
                method,
            } => {
                out.push(opcodes::INVOKE);
                out.push(*kind as u8);
                write_count(out, registers.len())?;
                for register in registers {
                    write_uleb128(out, u32::from(*register));
                }
                write_uleb128(out, indices.method(method)?);
            }
            Instruction::MoveResult { register } => {
                out.push(opcodes::MOVE_RESULT);
                write_uleb128(out, u32::from(*register));
            }
            Instruction::Return { register } => {
                out.push(opcodes::RETURN);
                write_register_opt(out, *register);
            }
            Instruction::Payload(bytes) => {
                out.push(opcodes::PAYLOAD);
                write_count(out, bytes.len())?;
                out.extend_from_slice(bytes);
            }
        }
    }

    Ok(())
}
