//! Integration tests for registration injection and overflow-aware repacking.
//!
//! Each test splits an encoded container into an output directory first, then repacks the
//! written shell container the way the packaging stage does.

use dexsplit::{dex2c::repack::container_file_name, prelude::*};
use std::{collections::HashSet, path::Path};

fn method(class: &str, name: &str, flags: AccessFlags) -> MethodDef {
    MethodDef::new(class, name, Prototype::void(), flags).with_implementation(
        MethodImplementation::new(1, vec![Instruction::load_const(0, 7), Instruction::return_void()]),
    )
}

fn class_initializer(class: &str) -> MethodDef {
    method(
        class,
        "<clinit>",
        AccessFlags::STATIC | AccessFlags::CONSTRUCTOR,
    )
}

/// Encodes `classes` and splits them into `dir` with the default filter and converter.
fn split_into(dir: &Path, classes: &[ClassDef]) -> Result<DexConfig> {
    let mut pool = Pool::new();
    for class in classes {
        pool.intern(class)?;
    }

    split_dex(
        &pool.to_bytes()?,
        "classes.dex",
        &BasicFilter,
        &NativeStubConverter,
        dir,
        &ProtectConfig::default(),
    )
}

fn registration(config: &DexConfig, offset: i32) -> [Instruction; 2] {
    [
        Instruction::load_const(0, offset),
        Instruction::invoke_static(
            vec![0],
            MethodRef::new(
                config.register_natives_class_descriptor(),
                config.register_natives_method_name(),
                Prototype::new("V", ["I"]),
            ),
        ),
    ]
}

#[test]
fn test_handled_classes_register_their_natives() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = split_into(
        dir.path(),
        &[
            ClassDef::new("Lapp/A;")
                .with_method(class_initializer("Lapp/A;"))
                .with_method(method("Lapp/A;", "run", AccessFlags::PUBLIC))
                .with_method(method("Lapp/A;", "stop", AccessFlags::PUBLIC)),
            ClassDef::new("Lapp/Plain;"),
            ClassDef::new("Lapp/C;").with_method(method("Lapp/C;", "go", AccessFlags::PUBLIC)),
        ],
    )?;

    let pools = inject_call_register_natives(
        &config,
        Pool::new(),
        &HashSet::new(),
        ProtectConfig::default().max_pool_size,
    )?;
    assert_eq!(pools.len(), 1);

    let written = write_pools(&pools, dir.path())?;
    assert_eq!(written, [dir.path().join("classes.dex")]);
    let packed = DexContainer::from_file(&written[0])?;

    let a = packed.class("Lapp/A;").unwrap();
    let initializer = a.find_method("<clinit>", "()V").unwrap();
    let body = initializer.implementation.as_ref().unwrap();
    assert_eq!(body.instructions[..2], registration(&config, 0));
    assert_eq!(body.instructions.len(), 4);
    assert!(a.find_method("run", "()V").unwrap().is_native());

    // C has two earlier implementations before it and gains a synthesized initializer
    let c = packed.class("Lapp/C;").unwrap();
    let initializer = c.find_method("<clinit>", "()V").unwrap();
    assert!(initializer.is_class_initializer());
    let body = initializer.implementation.as_ref().unwrap();
    assert_eq!(body.instructions[..2], registration(&config, 2));
    assert_eq!(body.instructions[2], Instruction::return_void());

    let plain = packed.class("Lapp/Plain;").unwrap();
    assert_eq!(plain.method_count(), 0);
    Ok(())
}

#[test]
fn test_spill_at_the_ceiling() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let classes: Vec<ClassDef> = ["Lapp/A;", "Lapp/B;", "Lapp/C;"]
        .into_iter()
        .map(|descriptor| ClassDef::new(descriptor).with_superclass(None))
        .collect();
    let config = split_into(dir.path(), &classes)?;

    let pools = inject_call_register_natives(&config, Pool::new(), &HashSet::new(), 2)?;

    let contents: Vec<Vec<&str>> = pools
        .iter()
        .map(|pool| pool.classes().iter().map(|c| c.descriptor.as_str()).collect())
        .collect();
    assert_eq!(contents, [vec!["Lapp/A;", "Lapp/B;"], vec!["Lapp/C;"]]);
    assert!(pools[0].is_sealed());
    assert!(!pools[1].is_sealed());

    let written = write_pools(&pools, dir.path())?;
    assert_eq!(
        written,
        [
            dir.path().join(container_file_name(0)),
            dir.path().join(container_file_name(1))
        ]
    );
    assert_eq!(DexContainer::from_file(&written[1])?.classes().len(), 1);
    Ok(())
}

#[test]
fn test_every_class_is_packed_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let classes: Vec<ClassDef> = (0..40)
        .map(|index| {
            let descriptor = format!("Lapp/K{index};");
            let mut class = ClassDef::new(descriptor.as_str());
            for method_index in 0..(index % 4) {
                class = class.with_method(method(
                    &descriptor,
                    &format!("m{method_index}"),
                    AccessFlags::PUBLIC,
                ));
            }
            class
        })
        .collect();
    let config = split_into(dir.path(), &classes)?;

    let main: HashSet<String> = HashSet::from(["Lapp/K0;".to_string()]);
    let limit = 12;
    let pools = inject_call_register_natives(&config, Pool::new(), &main, limit)?;
    assert!(pools.len() > 1);

    let (sealed, last) = pools.split_at(pools.len() - 1);
    for pool in sealed {
        assert!(pool.is_sealed());
        assert!(!pool.is_empty());
        assert!(pool.has_overflowed(limit));
    }
    assert!(!last[0].has_overflowed(limit));

    let mut packed: Vec<&str> = pools
        .iter()
        .flat_map(|pool| pool.classes().iter().map(|c| c.descriptor.as_str()))
        .collect();
    let expected: Vec<&str> = classes
        .iter()
        .map(|c| c.descriptor.as_str())
        .filter(|descriptor| !main.contains(*descriptor))
        .collect();
    assert_eq!(packed, expected);
    packed.dedup();
    assert_eq!(packed.len(), expected.len());
    Ok(())
}

#[test]
fn test_main_pool_is_the_seed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = split_into(
        dir.path(),
        &[
            ClassDef::new("Lapp/Main;"),
            ClassDef::new("Lapp/A;").with_method(method("Lapp/A;", "run", AccessFlags::PUBLIC)),
        ],
    )?;

    let mut seed = Pool::new();
    seed.intern(&ClassDef::new("Lapp/Main;"))?;
    let main = HashSet::from(["Lapp/Main;".to_string()]);

    let pools = inject_call_register_natives(&config, seed, &main, MAX_ENTITIES)?;
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].len(), 2);
    assert!(pools[0].contains("Lapp/Main;") && pools[0].contains("Lapp/A;"));
    Ok(())
}

#[test]
fn test_handled_main_class_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = split_into(
        dir.path(),
        &[ClassDef::new("Lapp/A;").with_method(method("Lapp/A;", "run", AccessFlags::PUBLIC))],
    )?;
    let main = HashSet::from(["Lapp/A;".to_string()]);

    match inject_call_register_natives(&config, Pool::new(), &main, MAX_ENTITIES) {
        Err(Error::Dex { name, source }) => {
            assert_eq!(name, "classes");
            assert!(matches!(*source, Error::ContractViolation(_)));
        }
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

/// Accepts every method that has a body, initializers included.
struct BodyFilter;

impl ClassAndMethodFilter for BodyFilter {
    fn accept_class(&self, _class: &dyn ClassDefinition) -> bool {
        true
    }

    fn accept_method(&self, method: &MethodDef) -> bool {
        method.has_implementation()
    }
}

/// Stubs every method without looking at what it is.
struct UncheckedStubConverter;

impl MethodConverter for UncheckedStubConverter {
    fn convert(&self, method: &MethodDef) -> Result<ConversionResult> {
        ConversionResult::new(
            method,
            vec![NativeStubConverter::native_stub(method)],
            method.clone(),
        )
    }
}

#[test]
fn test_class_initializer_is_never_lost() -> Result<()> {
    let container = DexContainer::new(vec![
        ClassDef::new("Lapp/A;").with_method(class_initializer("Lapp/A;"))
    ]);

    // the shipped converter refuses to stub an initializer
    match split(&container, &BodyFilter, &NativeStubConverter) {
        Err(Error::ContractViolation(message)) => assert!(message.contains("<clinit>")),
        other => panic!("unexpected result {other:?}"),
    }

    // a stubbed initializer cannot be overwritten by the registration call
    let dir = tempfile::tempdir()?;
    let mut pool = Pool::new();
    pool.intern(&container.classes()[0])?;
    let config = split_dex(
        &pool.to_bytes()?,
        "classes.dex",
        &BodyFilter,
        &UncheckedStubConverter,
        dir.path(),
        &ProtectConfig::default(),
    )?;

    let shell = DexContainer::from_file(config.shell_dex_file())?;
    let initializer = shell.classes()[0].find_method("<clinit>", "()V").unwrap();
    assert!(initializer.is_native() && !initializer.has_implementation());

    match inject_call_register_natives(&config, Pool::new(), &HashSet::new(), MAX_ENTITIES) {
        Err(Error::Dex { source, .. }) => {
            assert!(matches!(*source, Error::ContractViolation(_)));
        }
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}
