//! Per-input and batch-wide output bookkeeping.
//!
//! A [`DexConfig`] is created for every input container. It knows the four files produced for
//! that input and carries what later stages need to find converted code again: the set of
//! handled classes and the offset of each one in the native method table.
//!
//! A [`GlobalDexConfig`] collects the per-input configs of one batch. Inputs may be processed
//! concurrently, so appending goes through a mutex; the init glue summarizing all inputs is
//! generated exactly once, after the last input was added.
//!
//! # Output Layout
//!
//! For an input named `classes2.dex` in output directory `out`:
//!
//! ```text
//! out/classes2_shell.dex      shell container
//! out/classes2_impl.dex       implementation container
//! out/classes2_native.c       native function prototypes
//! out/classes2_resolver.c     registration tables
//! out/jni_init.c              batch-wide init glue
//! ```

use std::{
    collections::{BTreeSet, HashMap},
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use crate::{
    dex::class_descriptor,
    dex2c::{codegen::GeneratedCode, codegen::NativeCodeGenerator, options::ProtectConfig},
    Error::AlreadyGenerated,
    Result,
};

/// File name of the batch-wide init glue.
pub const JNI_INIT_FILE: &str = "jni_init.c";

/// Output bookkeeping for one input container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexConfig {
    name: String,
    shell_dex_file: PathBuf,
    impl_dex_file: PathBuf,
    native_functions_file: PathBuf,
    resolver_file: PathBuf,
    register_natives_class_name: String,
    register_natives_method_name: String,
    handled_classes: BTreeSet<String>,
    offsets: HashMap<String, u32>,
    result: Option<GeneratedCode>,
}

impl DexConfig {
    /// Creates the config for the input file `dex_file_name` writing into `out_dir`.
    ///
    /// The extension of `dex_file_name` is dropped to derive the output names.
    #[must_use]
    pub fn new(out_dir: &Path, dex_file_name: &str, options: &ProtectConfig) -> Self {
        let name = Path::new(dex_file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(dex_file_name)
            .to_string();

        DexConfig {
            shell_dex_file: out_dir.join(format!("{name}_shell.dex")),
            impl_dex_file: out_dir.join(format!("{name}_impl.dex")),
            native_functions_file: out_dir.join(format!("{name}_native.c")),
            resolver_file: out_dir.join(format!("{name}_resolver.c")),
            register_natives_class_name: options.register_natives_class.clone(),
            register_natives_method_name: registration_method_name(
                &options.method_name_prefix,
                &name,
            ),
            name,
            handled_classes: BTreeSet::new(),
            offsets: HashMap::new(),
            result: None,
        }
    }

    /// Returns true if both configs would write the same files or register the same
    /// native entry point.
    #[must_use]
    pub fn collides_with(&self, other: &DexConfig) -> bool {
        self.shell_dex_file == other.shell_dex_file
            || self.register_natives_method_name == other.register_natives_method_name
    }

    /// Input file stem this config was derived from
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the shell container
    #[must_use]
    pub fn shell_dex_file(&self) -> &Path {
        &self.shell_dex_file
    }

    /// Path of the implementation container
    #[must_use]
    pub fn impl_dex_file(&self) -> &Path {
        &self.impl_dex_file
    }

    /// Path of the generated native function source
    #[must_use]
    pub fn native_functions_file(&self) -> &Path {
        &self.native_functions_file
    }

    /// Path of the generated resolver source
    #[must_use]
    pub fn resolver_file(&self) -> &Path {
        &self.resolver_file
    }

    /// Internal name of the class declaring the registration method
    #[must_use]
    pub fn register_natives_class_name(&self) -> &str {
        &self.register_natives_class_name
    }

    /// Descriptor of the class declaring the registration method
    #[must_use]
    pub fn register_natives_class_descriptor(&self) -> String {
        class_descriptor(&self.register_natives_class_name)
    }

    /// Name of the static `(I)V` registration method for this input
    #[must_use]
    pub fn register_natives_method_name(&self) -> &str {
        &self.register_natives_method_name
    }

    /// Internal names of classes with at least one converted method
    #[must_use]
    pub fn handled_classes(&self) -> &BTreeSet<String> {
        &self.handled_classes
    }

    /// Returns true if the class with internal name `class_name` was handled
    #[must_use]
    pub fn is_handled(&self, class_name: &str) -> bool {
        self.handled_classes.contains(class_name)
    }

    /// Native table offset of the handled class with internal name `class_name`
    #[must_use]
    pub fn offset_from_class_name(&self, class_name: &str) -> Option<u32> {
        self.offsets.get(class_name).copied()
    }

    /// Records the outcome of splitting this input.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] if a handled class has no offset.
    pub fn set_split_result(
        &mut self,
        handled_classes: BTreeSet<String>,
        offsets: HashMap<String, u32>,
    ) -> Result<()> {
        if let Some(missing) = handled_classes.iter().find(|c| !offsets.contains_key(*c)) {
            return Err(contract_error!("handled class {} has no offset", missing));
        }

        self.handled_classes = handled_classes;
        self.offsets = offsets;
        Ok(())
    }

    /// Stores the code generator summary for this input.
    pub fn set_result(&mut self, result: GeneratedCode) {
        self.result = Some(result);
    }

    /// Code generator summary, once code was generated
    #[must_use]
    pub fn result(&self) -> Option<&GeneratedCode> {
        self.result.as_ref()
    }
}

/// Builds a registration method name that is a valid identifier.
fn registration_method_name(prefix: &str, stem: &str) -> String {
    let suffix: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{prefix}_{suffix}")
}

/// Batch-wide output bookkeeping.
///
/// Owned by the batch coordinator and passed explicitly to every stage that needs it.
/// [`GlobalDexConfig::add_dex_config`] may be called from several threads.
#[derive(Debug)]
pub struct GlobalDexConfig {
    out_dir: PathBuf,
    configs: Mutex<Vec<DexConfig>>,
    generated: AtomicBool,
}

impl GlobalDexConfig {
    /// Creates an empty batch writing into `out_dir`.
    #[must_use]
    pub fn new(out_dir: &Path) -> Self {
        GlobalDexConfig {
            out_dir: out_dir.to_path_buf(),
            configs: Mutex::new(Vec::new()),
            generated: AtomicBool::new(false),
        }
    }

    /// Output directory of the batch
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Path of the batch-wide init glue
    #[must_use]
    pub fn jni_init_file(&self) -> PathBuf {
        self.out_dir.join(JNI_INIT_FILE)
    }

    /// Appends the config of one processed input.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] if `config` shares its name or its
    /// registration method with an added config, and [`crate::Error::LockError`] if the
    /// config list lock was poisoned.
    pub fn add_dex_config(&self, config: DexConfig) -> Result<()> {
        let mut configs = lock!(self.configs)?;
        if let Some(existing) = configs.iter().find(|c| c.collides_with(&config)) {
            return Err(contract_error!(
                "{} and {} share output names ({} / {})",
                existing.name(),
                config.name(),
                config.name(),
                config.register_natives_method_name()
            ));
        }

        configs.push(config);
        Ok(())
    }

    /// Snapshot of the per-input configs, in the order they were added.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the config list lock was poisoned.
    pub fn configs(&self) -> Result<Vec<DexConfig>> {
        with_lock!(self.configs, |configs: &mut Vec<DexConfig>| configs.clone())
    }

    /// Number of per-input configs.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the config list lock was poisoned.
    pub fn dex_count(&self) -> Result<usize> {
        with_lock!(self.configs, |configs: &mut Vec<DexConfig>| configs.len())
    }

    /// Returns true once the init glue was generated
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.generated.load(Ordering::Acquire)
    }

    /// Writes the init glue covering every added input and returns its path.
    ///
    /// Must run after every input of the batch was added; it runs at most once.
    ///
    /// # Errors
    /// Returns [`crate::Error::AlreadyGenerated`] on a second call, and any error raised by
    /// `generator` or while writing the file.
    pub fn generate_jni_init_code(&self, generator: &dyn NativeCodeGenerator) -> Result<PathBuf> {
        if self.generated.swap(true, Ordering::AcqRel) {
            return Err(AlreadyGenerated);
        }

        let path = self.jni_init_file();
        let configs = lock!(self.configs)?;

        let mut writer = BufWriter::new(fs::File::create(&path)?);
        generator.generate_init(&configs, &mut writer)?;
        writer.flush()?;

        log::info!(
            "Wrote init glue for {} container(s) to {}",
            configs.len(),
            path.display()
        );
        Ok(path)
    }
}
