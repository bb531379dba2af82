//! Registration injection and overflow-aware repacking.
//!
//! After splitting, native methods of a handled class must be registered before the class
//! is used. The repacker rewrites every handled class of the shell container so its static
//! initializer starts by calling the container's registration method with the class's
//! offset into the native method table:
//!
//! ```text
//! const v0, <offset>
//! invoke-static {v0}, L<holder>;-><method>(I)V
//! ```
//!
//! Classes are packed into output pools in container order. Whenever the active pool reaches
//! the configured entity ceiling it is sealed and a new pool is started, so a large shell
//! container fans out into several sibling containers (`classes.dex`, `classes2.dex`, ...).
//!
//! # Key Components
//!
//! - [`RegisterNativesCallerClassDef`] - Adapter presenting a class with the injected call
//! - [`Repacker`] - The packing state machine
//! - [`inject_call_register_natives`] - Reads a shell container from disk and repacks it
//! - [`write_pools`] - Serializes repacked pools with runtime container names
//!
//! # Thread Safety
//!
//! Packing decisions depend on the exact class order, so a single repack runs on the calling
//! thread. Repacks of different inputs are independent.

use std::{
    borrow::Cow,
    collections::HashSet,
    path::{Path, PathBuf},
};

use crate::{
    dex::{
        AccessFlags, ClassDef, ClassDefinition, DexContainer, FieldDef, Instruction, MethodDef,
        MethodImplementation, MethodRef, Prototype, CLASS_INITIALIZER,
    },
    dex2c::config::DexConfig,
    pool::Pool,
    Result,
};

/// A class whose static initializer first calls a native registration method.
///
/// The wrapped class is borrowed and never modified; every accessor but
/// [`ClassDefinition::direct_methods`] passes through. If the class has no `<clinit>`, a
/// static initializer consisting of the call and `return-void` is appended.
#[derive(Debug, Clone)]
pub struct RegisterNativesCallerClassDef<'a> {
    class: &'a ClassDef,
    offset: i32,
    register_natives: MethodRef,
}

impl<'a> RegisterNativesCallerClassDef<'a> {
    /// Wraps `class`, passing `offset` to `holder_descriptor->method_name(I)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] if `offset` does not fit a constant load,
    /// or if the class declares a `<clinit>` without a body, whose static initialization
    /// the injected call would otherwise replace.
    pub fn new(
        class: &'a ClassDef,
        offset: u32,
        holder_descriptor: &str,
        method_name: &str,
    ) -> Result<Self> {
        let offset = i32::try_from(offset).map_err(|_| {
            contract_error!("offset {} of {} is out of range", offset, class.descriptor)
        })?;

        if let Some(initializer) = class
            .direct_methods
            .iter()
            .find(|m| m.is_class_initializer() && !m.has_implementation())
        {
            return Err(contract_error!(
                "{} has no body to inject into",
                initializer.reference()
            ));
        }

        Ok(RegisterNativesCallerClassDef {
            class,
            offset,
            register_natives: MethodRef::new(
                holder_descriptor,
                method_name,
                Prototype::new("V", ["I"]),
            ),
        })
    }

    /// Offset passed to the registration method
    #[must_use]
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// The registration method called from the static initializer
    #[must_use]
    pub fn register_natives(&self) -> &MethodRef {
        &self.register_natives
    }

    fn call_instructions(&self) -> [Instruction; 2] {
        [
            Instruction::load_const(0, self.offset),
            Instruction::invoke_static(vec![0], self.register_natives.clone()),
        ]
    }

    fn injected_initializer(
        &self,
        initializer: &MethodDef,
        body: &MethodImplementation,
    ) -> MethodDef {
        let mut instructions = self.call_instructions().to_vec();
        instructions.extend(body.instructions.iter().cloned());

        let mut injected = initializer.clone();
        injected.implementation = Some(MethodImplementation::new(
            body.registers.max(1),
            instructions,
        ));
        injected
    }

    fn synthesized_body(&self) -> MethodImplementation {
        let mut instructions = self.call_instructions().to_vec();
        instructions.push(Instruction::return_void());
        MethodImplementation::new(1, instructions)
    }
}

impl ClassDefinition for RegisterNativesCallerClassDef<'_> {
    fn descriptor(&self) -> &str {
        &self.class.descriptor
    }

    fn access_flags(&self) -> AccessFlags {
        self.class.access_flags
    }

    fn superclass(&self) -> Option<&str> {
        self.class.superclass.as_deref()
    }

    fn interfaces(&self) -> &[String] {
        &self.class.interfaces
    }

    fn source_file(&self) -> Option<&str> {
        self.class.source_file.as_deref()
    }

    fn fields(&self) -> &[FieldDef] {
        &self.class.fields
    }

    fn direct_methods(&self) -> Cow<'_, [MethodDef]> {
        let mut methods = Vec::with_capacity(self.class.direct_methods.len() + 1);
        let mut injected = false;

        for method in &self.class.direct_methods {
            match &method.implementation {
                Some(body) if !injected && method.is_class_initializer() => {
                    methods.push(self.injected_initializer(method, body));
                    injected = true;
                }
                _ => methods.push(method.clone()),
            }
        }

        if !injected {
            methods.push(
                MethodDef::new(
                    self.class.descriptor.clone(),
                    CLASS_INITIALIZER,
                    Prototype::void(),
                    AccessFlags::STATIC | AccessFlags::CONSTRUCTOR,
                )
                .with_implementation(self.synthesized_body()),
            );
        }

        Cow::Owned(methods)
    }

    fn virtual_methods(&self) -> Cow<'_, [MethodDef]> {
        Cow::Borrowed(&self.class.virtual_methods)
    }
}

/// Packs a shell container into pools, injecting registration calls into handled classes.
#[derive(Debug)]
pub struct Repacker<'c> {
    config: &'c DexConfig,
    main_classes: &'c HashSet<String>,
    max_pool_size: usize,
}

impl<'c> Repacker<'c> {
    /// Creates a repacker for the shell container of `config`.
    ///
    /// `main_classes` holds descriptors of classes already placed by an earlier stage; they
    /// are skipped. `max_pool_size` is the entity ceiling at which a new pool is started.
    #[must_use]
    pub fn new(
        config: &'c DexConfig,
        main_classes: &'c HashSet<String>,
        max_pool_size: usize,
    ) -> Self {
        Repacker {
            config,
            main_classes,
            max_pool_size,
        }
    }

    /// Packs `shell` starting with `seed`, returning all pools in creation order.
    ///
    /// The seed is always the first pool. Every class of `shell` outside the main classes
    /// ends up in exactly one pool. A pool is only sealed after a class was interned into
    /// it, so no sealed pool is empty; the last pool may be empty when the final class
    /// reached the ceiling.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] if a handled class is also a main class or
    /// has no offset, and any error raised while interning, such as
    /// [`crate::Error::PoolSealed`] for a sealed seed.
    pub fn repack(&self, shell: &DexContainer, seed: Pool) -> Result<Vec<Pool>> {
        if let Some(collision) = self
            .config
            .handled_classes()
            .iter()
            .map(|name| crate::dex::class_descriptor(name))
            .find(|descriptor| self.main_classes.contains(descriptor))
        {
            return Err(contract_error!(
                "{} is both a main class and a handled class of {}",
                collision,
                self.config.name()
            ));
        }

        let holder = self.config.register_natives_class_descriptor();
        let method_name = self.config.register_natives_method_name();

        let mut pools = Vec::new();
        let mut active = seed;
        for class in shell.classes() {
            if self.main_classes.contains(&class.descriptor) {
                log::debug!("{}: main class, skipped", class.descriptor);
                continue;
            }

            let name = class.internal_name();
            if self.config.is_handled(name) {
                let offset = self.config.offset_from_class_name(name).ok_or_else(|| {
                    contract_error!("handled class {} has no offset", class.descriptor)
                })?;
                let wrapped =
                    RegisterNativesCallerClassDef::new(class, offset, &holder, method_name)?;
                active.intern(&wrapped)?;
            } else {
                active.intern(class)?;
            }

            if active.has_overflowed(self.max_pool_size) {
                active.seal();
                log::info!(
                    "{}: pool {} reached the ceiling of {} after {} class(es)",
                    self.config.name(),
                    pools.len() + 1,
                    self.max_pool_size,
                    active.len()
                );
                pools.push(std::mem::take(&mut active));
            }
        }
        pools.push(active);

        Ok(pools)
    }
}

/// Reads the shell container of `config` and repacks it into `seed` and further pools.
///
/// # Errors
/// Same as [`Repacker::repack`], plus decode errors of the shell container, tagged with the
/// input name.
pub fn inject_call_register_natives(
    config: &DexConfig,
    seed: Pool,
    main_classes: &HashSet<String>,
    max_pool_size: usize,
) -> Result<Vec<Pool>> {
    let shell = DexContainer::from_file(config.shell_dex_file())
        .map_err(|error| error.in_dex(config.name()))?;
    Repacker::new(config, main_classes, max_pool_size)
        .repack(&shell, seed)
        .map_err(|error| error.in_dex(config.name()))
}

/// Runtime file name of the `index`-th container, counting from zero.
#[must_use]
pub fn container_file_name(index: usize) -> String {
    match index {
        0 => "classes.dex".to_string(),
        n => format!("classes{}.dex", n + 1),
    }
}

/// Writes non-empty `pools` into `dir` as `classes.dex`, `classes2.dex`, ...
///
/// Empty pools are skipped without consuming a file name. Returns the written paths.
///
/// # Errors
/// Returns [`crate::Error::TooManyEntities`] if a pool exceeds the hard container limit and
/// [`crate::Error::FileError`] if writing fails.
pub fn write_pools(pools: &[Pool], dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(pools.len());

    for pool in pools.iter().filter(|pool| !pool.is_empty()) {
        let path = dir.join(container_file_name(written.len()));
        pool.write_to_file(&path)?;
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dex2c::options::ProtectConfig,
        test::{class_initializer, log_call, rooted_class, simple_class},
        Error,
    };
    use std::collections::{BTreeSet, HashMap};

    fn config_handling(handled: &[(&str, u32)]) -> DexConfig {
        let mut config = DexConfig::new(Path::new("out"), "classes.dex", &ProtectConfig::default());
        config
            .set_split_result(
                handled.iter().map(|(c, _)| c.to_string()).collect::<BTreeSet<_>>(),
                handled
                    .iter()
                    .map(|(c, o)| (c.to_string(), *o))
                    .collect::<HashMap<_, _>>(),
            )
            .unwrap();
        config
    }

    fn registration_call(offset: i32) -> [Instruction; 2] {
        [
            Instruction::load_const(0, offset),
            Instruction::invoke_static(
                vec![0],
                MethodRef::new(
                    "Ldexsplit/NativeRegistry;",
                    "registerNatives_classes",
                    Prototype::new("V", ["I"]),
                ),
            ),
        ]
    }

    #[test]
    fn prepends_to_existing_initializer() {
        let class = simple_class("La/A;", &["run"])
            .with_method(class_initializer("La/A;", vec![Instruction::load_const(1, 7), log_call(1)]));
        let wrapped =
            RegisterNativesCallerClassDef::new(&class, 3, "Ldexsplit/NativeRegistry;", "registerNatives_classes")
                .unwrap();

        let direct = wrapped.direct_methods();
        assert_eq!(direct.len(), 1);
        let body = direct[0].implementation.as_ref().unwrap();
        assert_eq!(body.instructions[..2], registration_call(3));
        assert_eq!(body.instructions.len(), 5);
        assert_eq!(body.registers, 2);

        // the wrapped class is untouched
        let original = class.direct_methods[0].implementation.as_ref().unwrap();
        assert_eq!(original.instructions.len(), 3);
        assert_eq!(wrapped.virtual_methods().as_ref(), class.virtual_methods.as_slice());
    }

    #[test]
    fn synthesizes_missing_initializer() {
        let class = simple_class("La/A;", &["run"]);
        let wrapped =
            RegisterNativesCallerClassDef::new(&class, 0, "Ldexsplit/NativeRegistry;", "registerNatives_classes")
                .unwrap();

        let direct = wrapped.direct_methods();
        let [initializer] = direct.as_ref() else {
            panic!("expected a single direct method");
        };
        assert!(initializer.is_class_initializer());
        assert!(initializer.is_static());
        assert!(initializer.access_flags.contains(AccessFlags::CONSTRUCTOR));

        let body = initializer.implementation.as_ref().unwrap();
        assert_eq!(body.registers, 1);
        assert_eq!(body.instructions[..2], registration_call(0));
        assert_eq!(body.instructions[2], Instruction::return_void());
        assert!(class.direct_methods.is_empty());
    }

    #[test]
    fn bodyless_initializer_is_rejected() {
        let class = simple_class("La/A;", &["run"]).with_method(MethodDef::new(
            "La/A;",
            CLASS_INITIALIZER,
            Prototype::void(),
            AccessFlags::STATIC | AccessFlags::CONSTRUCTOR | AccessFlags::NATIVE,
        ));

        let result = RegisterNativesCallerClassDef::new(
            &class,
            0,
            "Ldexsplit/NativeRegistry;",
            "registerNatives_classes",
        );
        match result {
            Err(Error::ContractViolation(message)) => assert!(message.contains("<clinit>")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn spills_after_reaching_the_ceiling() {
        let shell = DexContainer::new(vec![
            rooted_class("La/A;"),
            rooted_class("La/B;"),
            rooted_class("La/C;"),
        ]);
        let config = config_handling(&[]);
        let main = HashSet::new();

        let pools = Repacker::new(&config, &main, 2)
            .repack(&shell, Pool::new())
            .unwrap();

        assert_eq!(pools.len(), 2);
        assert!(pools[0].is_sealed());
        assert!(pools[0].contains("La/A;") && pools[0].contains("La/B;"));
        assert!(!pools[1].is_sealed());
        assert_eq!(pools[1].len(), 1);
        assert!(pools[1].contains("La/C;"));
    }

    #[test]
    fn main_classes_are_skipped() {
        let shell = DexContainer::new(vec![rooted_class("La/Main;"), rooted_class("La/B;")]);
        let config = config_handling(&[]);
        let main = HashSet::from(["La/Main;".to_string()]);

        let pools = Repacker::new(&config, &main, 100)
            .repack(&shell, Pool::new())
            .unwrap();

        assert_eq!(pools.len(), 1);
        assert!(!pools[0].contains("La/Main;"));
        assert!(pools[0].contains("La/B;"));
    }

    #[test]
    fn handled_main_class_is_a_violation() {
        let shell = DexContainer::new(vec![simple_class("La/A;", &["run"])]);
        let config = config_handling(&[("a/A", 0)]);
        let main = HashSet::from(["La/A;".to_string()]);

        assert!(matches!(
            Repacker::new(&config, &main, 100).repack(&shell, Pool::new()),
            Err(Error::ContractViolation(_))
        ));
    }

    #[test]
    fn seed_pool_is_shared() {
        let mut seed = Pool::new();
        seed.intern(&rooted_class("La/Earlier;")).unwrap();

        let shell = DexContainer::new(vec![simple_class("La/A;", &["run"])]);
        let config = config_handling(&[("a/A", 4)]);
        let main = HashSet::new();

        let pools = Repacker::new(&config, &main, 1000)
            .repack(&shell, seed)
            .unwrap();

        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].len(), 2);
        let repacked = &pools[0].classes()[1];
        let initializer = repacked.find_method("<clinit>", "()V").unwrap();
        assert_eq!(
            initializer.implementation.as_ref().unwrap().instructions[..2],
            registration_call(4)
        );
    }

    #[test]
    fn sealed_seed_is_rejected() {
        let mut seed = Pool::new();
        seed.seal();
        let shell = DexContainer::new(vec![rooted_class("La/A;")]);
        let config = config_handling(&[]);
        let main = HashSet::new();

        assert!(matches!(
            Repacker::new(&config, &main, 10).repack(&shell, seed),
            Err(Error::PoolSealed)
        ));
    }

    #[test]
    fn container_names() {
        assert_eq!(container_file_name(0), "classes.dex");
        assert_eq!(container_file_name(1), "classes2.dex");
        assert_eq!(container_file_name(9), "classes10.dex");
    }

    #[test]
    fn write_pools_skips_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = Pool::new();
        first.intern(&rooted_class("La/A;")).unwrap();
        let mut second = Pool::new();
        second.intern(&rooted_class("La/B;")).unwrap();

        let written = write_pools(&[first, Pool::new(), second], dir.path()).unwrap();
        assert_eq!(
            written,
            [dir.path().join("classes.dex"), dir.path().join("classes2.dex")]
        );
        let second = DexContainer::from_file(&written[1]).unwrap();
        assert_eq!(second.classes()[0].descriptor, "La/B;");
    }
}
