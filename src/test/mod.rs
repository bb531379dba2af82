use crate::{
    dex::{
        AccessFlags, ClassDef, Instruction, MethodDef, MethodImplementation, MethodRef, Prototype,
        CLASS_INITIALIZER,
    },
    pool::Pool,
};

// Helper function to create a class without superclass or members, referencing exactly one type
pub fn rooted_class(descriptor: &str) -> ClassDef {
    ClassDef::new(descriptor).with_superclass(None)
}

// Helper function to create a method with a trivial body
pub fn method(class: &str, name: &str, prototype: &str, flags: AccessFlags) -> MethodDef {
    let prototype = Prototype::parse(prototype).unwrap();
    let registers = (prototype.parameter_registers() + 1) as u16;
    let returns = if prototype.return_type == "V" {
        vec![Instruction::return_void()]
    } else {
        vec![
            Instruction::load_const(0, 0),
            Instruction::Return { register: Some(0) },
        ]
    };

    MethodDef::new(class, name, prototype, flags)
        .with_implementation(MethodImplementation::new(registers, returns))
}

// Helper function to create a class with public `void name()` methods
pub fn simple_class(descriptor: &str, methods: &[&str]) -> ClassDef {
    methods.iter().fold(ClassDef::new(descriptor), |class, name| {
        class.with_method(method(descriptor, name, "()V", AccessFlags::PUBLIC))
    })
}

// Helper function to create a static initializer with the given leading instructions
pub fn class_initializer(class: &str, mut instructions: Vec<Instruction>) -> MethodDef {
    instructions.push(Instruction::return_void());
    MethodDef::new(
        class,
        CLASS_INITIALIZER,
        Prototype::void(),
        AccessFlags::STATIC | AccessFlags::CONSTRUCTOR,
    )
    .with_implementation(MethodImplementation::new(2, instructions))
}

// Helper function to create a call to a static logging method
pub fn log_call(register: u16) -> Instruction {
    Instruction::invoke_static(
        vec![register],
        MethodRef::new("Lapp/Log;", "trace", Prototype::new("V", ["I"])),
    )
}

// Helper function to encode classes into a container image
pub fn container_bytes(classes: &[ClassDef]) -> Vec<u8> {
    let mut pool = Pool::new();
    for class in classes {
        pool.intern(class).unwrap();
    }
    pool.to_bytes().unwrap()
}
