//! Split and repack pipeline.
//!
//! This module turns input containers into the artifacts a native protection build needs.
//! Per input container `X.dex`:
//!
//! 1. [`split_dex`] parses the container, splits it into a shell and an implementation
//!    container ([`splitter`]) and writes both to the output directory.
//! 2. [`handle_dex`] additionally hands the implementation container to a
//!    [`NativeCodeGenerator`] which writes the native and resolver sources.
//! 3. [`handle_all_dex`] runs step 2 for a batch of inputs, collects their [`DexConfig`]s
//!    in a [`GlobalDexConfig`] and writes the batch-wide init glue.
//!
//! The shell containers are later repacked with [`inject_call_register_natives`], which
//! makes the class initializer of every handled class register its native methods, and
//! spreads the classes over as many containers as the entity ceiling requires.
//!
//! # Key Components
//!
//! - [`filter`] - Which classes and methods are converted
//! - [`converter`] - How a method is converted
//! - [`splitter`] - The dual-pool split
//! - [`config`] - Per-input and batch-wide output bookkeeping
//! - [`codegen`] - JNI source generation
//! - [`repack`] - Registration injection and overflow-aware packing
//! - [`options`] - Run configuration
//!
//! # Examples
//!
//! ```rust,no_run
//! use dexsplit::dex2c::{
//!     handle_all_dex, BasicFilter, JniSkeletonGenerator, NativeStubConverter, ProtectConfig,
//! };
//! use std::path::{Path, PathBuf};
//!
//! let inputs = vec![PathBuf::from("classes.dex"), PathBuf::from("classes2.dex")];
//! let global = handle_all_dex(
//!     &inputs,
//!     &BasicFilter,
//!     &NativeStubConverter,
//!     &JniSkeletonGenerator,
//!     Path::new("out"),
//!     &ProtectConfig::default(),
//! )?;
//!
//! for config in global.configs()? {
//!     println!("{}: {} handled classes", config.name(), config.handled_classes().len());
//! }
//! # Ok::<(), dexsplit::Error>(())
//! ```

pub mod codegen;
pub mod config;
pub mod converter;
pub mod filter;
pub mod options;
pub mod repack;
pub mod splitter;

pub use codegen::{GeneratedCode, JniSkeletonGenerator, NativeCodeGenerator};
pub use config::{DexConfig, GlobalDexConfig};
pub use converter::{ConversionResult, MethodConverter, NativeStubConverter};
pub use filter::{BasicFilter, ClassAndMethodFilter, RuleFilter};
pub use options::ProtectConfig;
pub use repack::{
    inject_call_register_natives, write_pools, RegisterNativesCallerClassDef, Repacker,
};
pub use splitter::{split, MethodBuckets, SplitOutput, Splitter};

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use rayon::prelude::*;

use crate::{dex::DexContainer, file::File, Result};

/// Processes every container in `dex_files` and writes the batch-wide init glue.
///
/// Inputs are processed in parallel when `options.parallel` is set; their configs are
/// added to the returned [`GlobalDexConfig`] in input order either way.
///
/// # Errors
/// Returns [`crate::Error::ContractViolation`], before anything is written, if two inputs
/// would share output files or a registration method. Otherwise returns the first error of
/// any input, tagged with that input's name, and any error raised while writing the init
/// glue.
pub fn handle_all_dex(
    dex_files: &[PathBuf],
    filter: &dyn ClassAndMethodFilter,
    converter: &dyn MethodConverter,
    generator: &dyn NativeCodeGenerator,
    out_dir: &Path,
    options: &ProtectConfig,
) -> Result<GlobalDexConfig> {
    check_distinct_outputs(dex_files, out_dir, options)?;
    if options.create_output_dir {
        fs::create_dir_all(out_dir)?;
    }

    let handle = |path: &PathBuf| handle_dex(path, filter, converter, generator, out_dir, options);
    let configs: Vec<DexConfig> = if options.parallel {
        dex_files.par_iter().map(handle).collect::<Result<_>>()?
    } else {
        dex_files.iter().map(handle).collect::<Result<_>>()?
    };

    let global = GlobalDexConfig::new(out_dir);
    for config in configs {
        global.add_dex_config(config)?;
    }
    global.generate_jni_init_code(generator)?;

    Ok(global)
}

/// Splits the container file at `dex_file` and generates its native sources.
///
/// # Errors
/// Same as [`handle_dex_bytes`]; errors are tagged with the file name.
pub fn handle_dex(
    dex_file: &Path,
    filter: &dyn ClassAndMethodFilter,
    converter: &dyn MethodConverter,
    generator: &dyn NativeCodeGenerator,
    out_dir: &Path,
    options: &ProtectConfig,
) -> Result<DexConfig> {
    let name = input_name(dex_file);
    let file = File::from_file(dex_file).map_err(|error| error.in_dex(&name))?;
    handle_dex_bytes(
        file.data(),
        &name,
        filter,
        converter,
        generator,
        out_dir,
        options,
    )
}

/// Splits an in-memory container named `dex_file_name` and generates its native sources.
///
/// # Errors
/// Any error of [`split_dex`], decode errors of the written implementation container and
/// errors of `generator`, all tagged with `dex_file_name`.
pub fn handle_dex_bytes(
    data: &[u8],
    dex_file_name: &str,
    filter: &dyn ClassAndMethodFilter,
    converter: &dyn MethodConverter,
    generator: &dyn NativeCodeGenerator,
    out_dir: &Path,
    options: &ProtectConfig,
) -> Result<DexConfig> {
    let mut config = split_dex(data, dex_file_name, filter, converter, out_dir, options)?;

    let generate = |config: &DexConfig| -> Result<GeneratedCode> {
        let implementation = DexContainer::from_file(config.impl_dex_file())?;

        let mut native = BufWriter::new(fs::File::create(config.native_functions_file())?);
        let mut resolver = BufWriter::new(fs::File::create(config.resolver_file())?);
        let result = generator.generate(config, &implementation, &mut resolver, &mut native)?;
        native.flush()?;
        resolver.flush()?;

        Ok(result)
    };

    let result = generate(&config).map_err(|error| error.in_dex(dex_file_name))?;
    log::info!(
        "{}: generated {} native method(s) for {} class(es)",
        dex_file_name,
        result.native_methods,
        result.classes
    );
    config.set_result(result);

    Ok(config)
}

/// Splits an in-memory container and writes its shell and implementation containers.
///
/// Either both containers are written or, on error, neither is left behind.
///
/// # Errors
/// Decode errors of `data`, contract violations of `converter` and encode or I/O errors,
/// all tagged with `dex_file_name`.
pub fn split_dex(
    data: &[u8],
    dex_file_name: &str,
    filter: &dyn ClassAndMethodFilter,
    converter: &dyn MethodConverter,
    out_dir: &Path,
    options: &ProtectConfig,
) -> Result<DexConfig> {
    let run = || -> Result<DexConfig> {
        let container = DexContainer::parse(data)?;
        let output = Splitter::new(filter, converter)
            .with_parallelism(options.parallel)
            .split(&container)?;

        let mut config = DexConfig::new(out_dir, dex_file_name, options);
        if output.implementation.is_empty() {
            log::warn!("{}: no method was converted", dex_file_name);
        }
        log::info!(
            "{}: {} class(es), {} handled, {} method(s) converted",
            dex_file_name,
            container.classes().len(),
            output.handled_classes.len(),
            output.converted_methods
        );

        let shell = output.shell.to_bytes()?;
        let implementation = output.implementation.to_bytes()?;
        config.set_split_result(output.handled_classes, output.offsets)?;

        write_file(config.shell_dex_file(), &shell)?;
        if let Err(error) = write_file(config.impl_dex_file(), &implementation) {
            let _ = fs::remove_file(config.shell_dex_file());
            let _ = fs::remove_file(config.impl_dex_file());
            return Err(error);
        }

        Ok(config)
    };

    run().map_err(|error| error.in_dex(dex_file_name))
}

fn input_name(dex_file: &Path) -> String {
    dex_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dex_file.display().to_string())
}

/// Rejects batches in which two inputs derive the same output names.
fn check_distinct_outputs(
    dex_files: &[PathBuf],
    out_dir: &Path,
    options: &ProtectConfig,
) -> Result<()> {
    let configs: Vec<(&PathBuf, DexConfig)> = dex_files
        .iter()
        .map(|path| (path, DexConfig::new(out_dir, &input_name(path), options)))
        .collect();

    for (index, (path, config)) in configs.iter().enumerate() {
        if let Some((earlier, _)) = configs[..index]
            .iter()
            .find(|(_, other)| other.collides_with(config))
        {
            return Err(contract_error!(
                "{} collides with {}: both map to {} / {}",
                path.display(),
                earlier.display(),
                config.shell_dex_file().display(),
                config.register_natives_method_name()
            )
            .in_dex(&input_name(path)));
        }
    }

    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{container_bytes, simple_class},
        Error,
    };

    #[test]
    fn split_dex_writes_both_containers() {
        let dir = tempfile::tempdir().unwrap();
        let data = container_bytes(&[simple_class("La/A;", &["run"]), simple_class("La/B;", &[])]);

        let config = split_dex(
            &data,
            "classes.dex",
            &BasicFilter,
            &NativeStubConverter,
            dir.path(),
            &ProtectConfig::sequential(),
        )
        .unwrap();

        let shell = DexContainer::from_file(config.shell_dex_file()).unwrap();
        let implementation = DexContainer::from_file(config.impl_dex_file()).unwrap();
        assert_eq!(shell.classes().len(), 2);
        assert_eq!(implementation.classes().len(), 1);
        assert!(config.is_handled("a/A"));
    }

    #[test]
    fn colliding_inputs_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let data = container_bytes(&[simple_class("La/A;", &["run"])]);

        let mut inputs = Vec::new();
        for sub in ["x", "y"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
            let path = dir.path().join(sub).join("classes.dex");
            std::fs::write(&path, &data).unwrap();
            inputs.push(path);
        }

        let result = handle_all_dex(
            &inputs,
            &BasicFilter,
            &NativeStubConverter,
            &JniSkeletonGenerator,
            &out,
            &ProtectConfig::sequential(),
        );

        match result {
            Err(Error::Dex { name, source }) => {
                assert_eq!(name, "classes.dex");
                assert!(matches!(*source, Error::ContractViolation(_)));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn decode_errors_name_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = split_dex(
            b"not a container",
            "broken.dex",
            &BasicFilter,
            &NativeStubConverter,
            dir.path(),
            &ProtectConfig::default(),
        );

        match result {
            Err(Error::Dex { name, source }) => {
                assert_eq!(name, "broken.dex");
                assert!(matches!(*source, Error::NotSupported));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!dir.path().join("broken_shell.dex").exists());
    }
}
