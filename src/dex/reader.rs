//! Container decoder.
//!
//! Reads the section-based encoding written by [`crate::pool::Pool::write_to`]. Identifier
//! sections are decoded first and every later index is resolved against them, so a corrupt
//! index surfaces as [`crate::Error::Malformed`] naming the section and the offending value.

use std::collections::HashSet;

use crate::{
    dex::{
        class::ClassDef,
        field::FieldDef,
        flags::AccessFlags,
        instruction::{FieldOp, Instruction, InvokeKind, TypeOp},
        method::{MethodDef, MethodImplementation},
        opcodes, CONTAINER_MAGIC, CONTAINER_VERSION,
    },
    dex::types::{validate_type_descriptor, FieldRef, MethodRef, Prototype},
    file::parser::Parser,
    Error::NotSupported,
    Result,
};

/// Identifier sections, resolved on demand while reading class definitions.
struct Sections {
    strings: Vec<String>,
    types: Vec<String>,
    fields: Vec<FieldRef>,
    methods: Vec<MethodRef>,
}

fn lookup<'s, T>(section: &'s [T], index: usize, name: &str) -> Result<&'s T> {
    section.get(index).ok_or_else(|| {
        malformed_error!(
            "{} index {} out of range ({} entries)",
            name,
            index,
            section.len()
        )
    })
}

impl Sections {
    fn string(&self, parser: &mut Parser) -> Result<String> {
        let index = parser.read_index()?;
        lookup(&self.strings, index, "string").cloned()
    }

    fn string_opt(&self, parser: &mut Parser) -> Result<Option<String>> {
        match parser.read_index()? {
            0 => Ok(None),
            index => lookup(&self.strings, index - 1, "string").cloned().map(Some),
        }
    }

    fn type_descriptor(&self, parser: &mut Parser) -> Result<String> {
        let index = parser.read_index()?;
        lookup(&self.types, index, "type").cloned()
    }

    fn type_opt(&self, parser: &mut Parser) -> Result<Option<String>> {
        match parser.read_index()? {
            0 => Ok(None),
            index => lookup(&self.types, index - 1, "type").cloned().map(Some),
        }
    }

    fn field(&self, parser: &mut Parser) -> Result<FieldRef> {
        let index = parser.read_index()?;
        lookup(&self.fields, index, "field").cloned()
    }

    fn method(&self, parser: &mut Parser) -> Result<MethodRef> {
        let index = parser.read_index()?;
        lookup(&self.methods, index, "method").cloned()
    }
}

fn read_register(parser: &mut Parser) -> Result<u16> {
    let value = parser.read_uleb128()?;
    u16::try_from(value).map_err(|_| malformed_error!("Register v{} out of range", value))
}

fn read_register_opt(parser: &mut Parser) -> Result<Option<u16>> {
    match parser.read_uleb128()? {
        0 => Ok(None),
        value => u16::try_from(value - 1)
            .map(Some)
            .map_err(|_| malformed_error!("Register v{} out of range", value - 1)),
    }
}

fn read_flags(parser: &mut Parser) -> Result<AccessFlags> {
    let bits = parser.read_uleb128()?;
    AccessFlags::from_bits(bits).ok_or_else(|| malformed_error!("Unknown access flags 0x{:x}", bits))
}

/// Decodes a complete container.
pub(crate) fn read_container(data: &[u8]) -> Result<Vec<ClassDef>> {
    let mut parser = Parser::new(data);

    let magic = parser.read_bytes(CONTAINER_MAGIC.len()).map_err(|_| NotSupported)?;
    if magic != CONTAINER_MAGIC {
        return Err(NotSupported);
    }
    if parser.read_le::<u32>()? != CONTAINER_VERSION {
        return Err(NotSupported);
    }

    let sections = read_sections(&mut parser)?;

    let class_count = parser.read_count()?;
    let mut classes = Vec::with_capacity(class_count);
    let mut seen = HashSet::with_capacity(class_count);
    for _ in 0..class_count {
        let class = read_class(&mut parser, &sections)?;
        if !seen.insert(class.descriptor.clone()) {
            return Err(malformed_error!("Duplicate class {}", class.descriptor));
        }
        classes.push(class);
    }

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after class definitions",
            parser.remaining()
        ));
    }

    Ok(classes)
}

fn read_sections(parser: &mut Parser) -> Result<Sections> {
    let count = parser.read_count()?;
    let mut strings = Vec::with_capacity(count);
    for _ in 0..count {
        strings.push(parser.read_prefixed_string()?);
    }

    let count = parser.read_count()?;
    let mut types = Vec::with_capacity(count);
    for _ in 0..count {
        let index = parser.read_index()?;
        let descriptor = lookup(&strings, index, "string")?.clone();
        validate_type_descriptor(&descriptor)?;
        types.push(descriptor);
    }

    let count = parser.read_count()?;
    let mut prototypes = Vec::with_capacity(count);
    for _ in 0..count {
        let return_type = lookup(&types, parser.read_index()?, "type")?.clone();
        let parameter_count = parser.read_count()?;
        let mut parameters = Vec::with_capacity(parameter_count);
        for _ in 0..parameter_count {
            parameters.push(lookup(&types, parser.read_index()?, "type")?.clone());
        }
        prototypes.push(Prototype {
            return_type,
            parameters,
        });
    }

    let count = parser.read_count()?;
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let class = lookup(&types, parser.read_index()?, "type")?.clone();
        let field_type = lookup(&types, parser.read_index()?, "type")?.clone();
        let name = lookup(&strings, parser.read_index()?, "string")?.clone();
        fields.push(FieldRef {
            class,
            name,
            field_type,
        });
    }

    let count = parser.read_count()?;
    let mut methods = Vec::with_capacity(count);
    for _ in 0..count {
        let class = lookup(&types, parser.read_index()?, "type")?.clone();
        let prototype = lookup(&prototypes, parser.read_index()?, "prototype")?.clone();
        let name = lookup(&strings, parser.read_index()?, "string")?.clone();
        methods.push(MethodRef {
            class,
            name,
            prototype,
        });
    }

    Ok(Sections {
        strings,
        types,
        fields,
        methods,
    })
}

fn read_class(parser: &mut Parser, sections: &Sections) -> Result<ClassDef> {
    let descriptor = sections.type_descriptor(parser)?;
    let access_flags = read_flags(parser)?;
    let superclass = sections.type_opt(parser)?;

    let interface_count = parser.read_count()?;
    let mut interfaces = Vec::with_capacity(interface_count);
    for _ in 0..interface_count {
        interfaces.push(sections.type_descriptor(parser)?);
    }

    let source_file = sections.string_opt(parser)?;

    let field_count = parser.read_count()?;
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let reference = sections.field(parser)?;
        let access_flags = read_flags(parser)?;
        if reference.class != descriptor {
            return Err(malformed_error!(
                "Field {} declared in foreign class {}",
                reference,
                descriptor
            ));
        }
        fields.push(FieldDef::new(
            reference.class,
            reference.name,
            reference.field_type,
            access_flags,
        ));
    }

    let direct_methods = read_methods(parser, sections, &descriptor)?;
    let virtual_methods = read_methods(parser, sections, &descriptor)?;

    Ok(ClassDef {
        descriptor,
        access_flags,
        superclass,
        interfaces,
        source_file,
        fields,
        direct_methods,
        virtual_methods,
    })
}

fn read_methods(parser: &mut Parser, sections: &Sections, class: &str) -> Result<Vec<MethodDef>> {
    let count = parser.read_count()?;
    let mut methods = Vec::with_capacity(count);

    for _ in 0..count {
        let reference = sections.method(parser)?;
        if reference.class != class {
            return Err(malformed_error!(
                "Method {} declared in foreign class {}",
                reference,
                class
            ));
        }

        let access_flags = read_flags(parser)?;
        let implementation = match parser.read_le::<u8>()? {
            0 => None,
            1 => Some(read_code(parser, sections)?),
            other => return Err(malformed_error!("Invalid code marker {}", other)),
        };

        methods.push(MethodDef {
            class: reference.class,
            name: reference.name,
            prototype: reference.prototype,
            access_flags,
            implementation,
        });
    }

    Ok(methods)
}

fn read_code(parser: &mut Parser, sections: &Sections) -> Result<MethodImplementation> {
    let registers = read_register(parser)?;
    let count = parser.read_count()?;
    let mut instructions = Vec::with_capacity(count);

    for _ in 0..count {
        let opcode = parser.read_le::<u8>()?;
        let instruction = match opcode {
            opcodes::NOP => Instruction::Nop,
            opcodes::CONST => Instruction::Const {
                register: read_register(parser)?,
                value: parser.read_sleb128()?,
            },
            opcodes::CONST_STRING => Instruction::ConstString {
                register: read_register(parser)?,
                value: sections.string(parser)?,
            },
            opcodes::TYPE => {
                let raw = parser.read_le::<u8>()?;
                let op = TypeOp::from_repr(raw)
                    .ok_or_else(|| malformed_error!("Unknown type op {}", raw))?;
                Instruction::Type {
                    op,
                    register: read_register(parser)?,
                    type_descriptor: sections.type_descriptor(parser)?,
                }
            }
            opcodes::FIELD => {
                let raw = parser.read_le::<u8>()?;
                let op = FieldOp::from_repr(raw)
                    .ok_or_else(|| malformed_error!("Unknown field op {}", raw))?;
                Instruction::Field {
                    op,
                    register: read_register(parser)?,
                    object: read_register_opt(parser)?,
                    field: sections.field(parser)?,
                }
            }
            opcodes::INVOKE => {
                let raw = parser.read_le::<u8>()?;
                let kind = InvokeKind::from_repr(raw)
                    .ok_or_else(|| malformed_error!("Unknown invoke kind {}", raw))?;
                let register_count = parser.read_count()?;
                let mut registers = Vec::with_capacity(register_count);
                for _ in 0..register_count {
                    registers.push(read_register(parser)?);
                }
                Instruction::Invoke {
                    kind,
                    registers,
                    method: sections.method(parser)?,
                }
            }
            opcodes::MOVE_RESULT => Instruction::MoveResult {
                register: read_register(parser)?,
            },
            opcodes::RETURN => Instruction::Return {
                register: read_register_opt(parser)?,
            },
            opcodes::PAYLOAD => {
                let length = parser.read_index()?;
                Instruction::Payload(parser.read_bytes(length)?.to_vec())
            }
            other => return Err(malformed_error!("Unknown opcode 0x{:02x}", other)),
        };
        instructions.push(instruction);
    }

    Ok(MethodImplementation {
        registers,
        instructions,
    })
}
