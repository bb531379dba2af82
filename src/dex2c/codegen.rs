//! Native source generation.
//!
//! The implementation container produced by the splitter is handed to a
//! [`NativeCodeGenerator`], together with the [`DexConfig`] describing where each handled
//! class starts in the container's native method table. Translating method bodies is not
//! part of this crate; the shipped [`JniSkeletonGenerator`] emits everything around them:
//!
//! - the native file declares one JNI function per implementation method, named with the
//!   long (overload-safe) JNI mangling
//! - the resolver file holds the container's `JNINativeMethod` table, the per-class ranges
//!   into it, and the registration entry point the shell's class initializers call
//! - the init glue registers every container's entry point on its holder class from
//!   `JNI_OnLoad`
//!
//! # Examples
//!
//! ```rust
//! use dexsplit::dex2c::codegen::jni_function_name;
//! use dexsplit::{MethodRef, Prototype};
//!
//! let method = MethodRef::new("Lcom/example/Foo_Bar;", "run", Prototype::new("V", ["I"]));
//! assert_eq!(jni_function_name(&method), "Java_com_example_Foo_1Bar_run__I");
//! ```

use std::{fmt::Write as _, io::Write};

use crate::{
    dex::{internal_name, ClassDefinition, DexContainer, MethodDef, MethodRef},
    dex2c::config::DexConfig,
    Result,
};

/// Summary of the code generated for one input container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeneratedCode {
    /// Number of classes with native methods
    pub classes: usize,
    /// Number of entries in the native method table
    pub native_methods: usize,
}

/// Produces native sources for converted methods.
pub trait NativeCodeGenerator: Send + Sync {
    /// Generates the native and resolver sources of one input container.
    ///
    /// `implementation` is the decoded implementation container of `config`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] if the container disagrees with the
    /// offsets recorded in `config`, and [`crate::Error::FileError`] if writing fails.
    fn generate(
        &self,
        config: &DexConfig,
        implementation: &DexContainer,
        resolver: &mut dyn Write,
        native: &mut dyn Write,
    ) -> Result<GeneratedCode>;

    /// Generates the batch-wide init glue for all processed containers.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if writing fails.
    fn generate_init(&self, configs: &[DexConfig], out: &mut dyn Write) -> Result<()>;
}

/// Emits JNI declarations, registration tables and init glue without native bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct JniSkeletonGenerator;

/// A native method table entry.
struct NativeEntry<'c> {
    method: &'c MethodDef,
    function: String,
}

/// A class range in the native method table.
struct ClassRange<'c> {
    class_name: &'c str,
    offset: usize,
    count: usize,
}

impl JniSkeletonGenerator {
    /// Collects the native table of `implementation`, checking it against `config`.
    fn table<'c>(
        config: &DexConfig,
        implementation: &'c DexContainer,
    ) -> Result<(Vec<NativeEntry<'c>>, Vec<ClassRange<'c>>)> {
        let mut entries = Vec::new();
        let mut ranges = Vec::new();

        for class in implementation.classes() {
            let class_name = class.internal_name();
            let expected = config.offset_from_class_name(class_name);
            if expected.and_then(|o| usize::try_from(o).ok()) != Some(entries.len()) {
                return Err(contract_error!(
                    "{} starts at native index {} but its recorded offset is {:?}",
                    class.descriptor,
                    entries.len(),
                    expected
                ));
            }

            ranges.push(ClassRange {
                class_name,
                offset: entries.len(),
                count: class.method_count(),
            });
            entries.extend(class.methods().map(|method| NativeEntry {
                method,
                function: jni_function_name(&method.reference()),
            }));
        }

        if ranges.len() != config.handled_classes().len() {
            return Err(contract_error!(
                "{} handled classes recorded but {} found in {}",
                config.handled_classes().len(),
                ranges.len(),
                config.impl_dex_file().display()
            ));
        }

        Ok((entries, ranges))
    }
}

impl NativeCodeGenerator for JniSkeletonGenerator {
    fn generate(
        &self,
        config: &DexConfig,
        implementation: &DexContainer,
        resolver: &mut dyn Write,
        native: &mut dyn Write,
    ) -> Result<GeneratedCode> {
        let (entries, ranges) = Self::table(config, implementation)?;
        let name = config.name();

        let mut out = String::new();
        let _ = writeln!(out, "/* Native functions of {name} */");
        let _ = writeln!(out, "#include <jni.h>\n");
        for entry in &entries {
            let _ = writeln!(out, "/* {} */", entry.method.reference());
            let _ = writeln!(out, "{};\n", function_prototype(entry.method, &entry.function));
        }
        native.write_all(out.as_bytes())?;

        let table = format!("dexsplit_methods_{}", c_identifier(name));
        let classes = format!("dexsplit_classes_{}", c_identifier(name));
        let entry_point = registration_function(config);

        let mut out = String::new();
        let _ = writeln!(out, "/* Native registration of {name} */");
        let _ = writeln!(out, "#include <jni.h>");
        let _ = writeln!(out, "#include <stddef.h>\n");
        for entry in &entries {
            let _ = writeln!(out, "{};", function_prototype(entry.method, &entry.function));
        }

        if entries.is_empty() {
            let _ = writeln!(out, "\n/* no native methods */");
            let _ = writeln!(
                out,
                "JNIEXPORT void JNICALL {entry_point}(JNIEnv *env, jclass holder, jint offset) {{\n}}"
            );
        } else {
            let _ = writeln!(out, "\nstatic const JNINativeMethod {table}[] = {{");
            for entry in &entries {
                let _ = writeln!(
                    out,
                    "    {{\"{}\", \"{}\", (void *) {}}},",
                    entry.method.name, entry.method.prototype, entry.function
                );
            }
            let _ = writeln!(out, "}};\n");

            let _ = writeln!(
                out,
                "static const struct {{ const char *name; jint offset; jint count; }} {classes}[] = {{"
            );
            for range in &ranges {
                let _ = writeln!(
                    out,
                    "    {{\"{}\", {}, {}}},",
                    range.class_name, range.offset, range.count
                );
            }
            let _ = writeln!(out, "}};\n");

            let _ = writeln!(
                out,
                "JNIEXPORT void JNICALL {entry_point}(JNIEnv *env, jclass holder, jint offset) {{"
            );
            let _ = writeln!(
                out,
                "    for (size_t i = 0; i < sizeof({classes}) / sizeof({classes}[0]); i++) {{"
            );
            let _ = writeln!(out, "        if ({classes}[i].offset != offset) continue;");
            let _ = writeln!(
                out,
                "        jclass clazz = (*env)->FindClass(env, {classes}[i].name);"
            );
            let _ = writeln!(out, "        if (clazz == NULL) return;");
            let _ = writeln!(
                out,
                "        (*env)->RegisterNatives(env, clazz, &{table}[offset], {classes}[i].count);"
            );
            let _ = writeln!(out, "        (*env)->DeleteLocalRef(env, clazz);");
            let _ = writeln!(out, "        return;");
            let _ = writeln!(out, "    }}");
            let _ = writeln!(out, "}}");
        }
        resolver.write_all(out.as_bytes())?;

        Ok(GeneratedCode {
            classes: ranges.len(),
            native_methods: entries.len(),
        })
    }

    fn generate_init(&self, configs: &[DexConfig], out: &mut dyn Write) -> Result<()> {
        let mut text = String::new();
        let _ = writeln!(text, "/* Registration entry points of {} container(s) */", configs.len());
        let _ = writeln!(text, "#include <jni.h>");
        let _ = writeln!(text, "#include <stddef.h>\n");

        for config in configs {
            let _ = writeln!(
                text,
                "JNIEXPORT void JNICALL {}(JNIEnv *env, jclass holder, jint offset);",
                registration_function(config)
            );
        }

        let _ = writeln!(
            text,
            "\nstatic jint register_entry(JNIEnv *env, const char *holder, const char *name, void *fn) {{"
        );
        let _ = writeln!(text, "    JNINativeMethod method = {{(char *) name, \"(I)V\", fn}};");
        let _ = writeln!(text, "    jclass clazz = (*env)->FindClass(env, holder);");
        let _ = writeln!(text, "    if (clazz == NULL) return JNI_ERR;");
        let _ = writeln!(
            text,
            "    jint status = (*env)->RegisterNatives(env, clazz, &method, 1);"
        );
        let _ = writeln!(text, "    (*env)->DeleteLocalRef(env, clazz);");
        let _ = writeln!(text, "    return status;");
        let _ = writeln!(text, "}}\n");

        let _ = writeln!(
            text,
            "JNIEXPORT jint JNICALL JNI_OnLoad(JavaVM *vm, void *reserved) {{"
        );
        let _ = writeln!(text, "    JNIEnv *env = NULL;");
        let _ = writeln!(
            text,
            "    if ((*vm)->GetEnv(vm, (void **) &env, JNI_VERSION_1_6) != JNI_OK) return JNI_ERR;"
        );
        for config in configs {
            let _ = writeln!(
                text,
                "    if (register_entry(env, \"{}\", \"{}\", (void *) {}) != JNI_OK) return JNI_ERR;",
                config.register_natives_class_name(),
                config.register_natives_method_name(),
                registration_function(config)
            );
        }
        let _ = writeln!(text, "    return JNI_VERSION_1_6;");
        let _ = writeln!(text, "}}");

        out.write_all(text.as_bytes())?;
        Ok(())
    }
}

/// Escapes a class name, method name or descriptor fragment the way JNI symbol lookup does.
///
/// `/` separates components, `_` becomes `_1`, `;` becomes `_2`, `[` becomes `_3` and every
/// other character outside `[A-Za-z0-9]` becomes `_0` followed by its UTF-16 code unit in
/// four lowercase hex digits.
#[must_use]
pub fn jni_mangle(name: &str) -> String {
    let mut mangled = String::with_capacity(name.len());
    let mut units = [0u16; 2];

    for c in name.chars() {
        match c {
            '/' => mangled.push('_'),
            '_' => mangled.push_str("_1"),
            ';' => mangled.push_str("_2"),
            '[' => mangled.push_str("_3"),
            c if c.is_ascii_alphanumeric() => mangled.push(c),
            c => {
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(mangled, "_0{unit:04x}");
                }
            }
        }
    }

    mangled
}

/// Long-form JNI symbol of `method`: `Java_<class>_<name>__<parameters>`.
#[must_use]
pub fn jni_function_name(method: &MethodRef) -> String {
    let class = internal_name(&method.class).unwrap_or(&method.class);
    let parameters = method.prototype.parameters.concat();
    format!(
        "Java_{}_{}__{}",
        jni_mangle(class),
        jni_mangle(&method.name),
        jni_mangle(&parameters)
    )
}

/// C type used by JNI for a type descriptor.
#[must_use]
pub fn jni_type(descriptor: &str) -> &'static str {
    match descriptor {
        "V" => "void",
        "Z" => "jboolean",
        "B" => "jbyte",
        "C" => "jchar",
        "S" => "jshort",
        "I" => "jint",
        "J" => "jlong",
        "F" => "jfloat",
        "D" => "jdouble",
        "Ljava/lang/String;" => "jstring",
        "Ljava/lang/Class;" => "jclass",
        "Ljava/lang/Throwable;" => "jthrowable",
        "[Z" => "jbooleanArray",
        "[B" => "jbyteArray",
        "[C" => "jcharArray",
        "[S" => "jshortArray",
        "[I" => "jintArray",
        "[J" => "jlongArray",
        "[F" => "jfloatArray",
        "[D" => "jdoubleArray",
        d if d.starts_with('[') => "jobjectArray",
        _ => "jobject",
    }
}

fn function_prototype(method: &MethodDef, function: &str) -> String {
    let mut prototype = format!(
        "JNIEXPORT {} JNICALL {}(JNIEnv *env, {}",
        jni_type(&method.prototype.return_type),
        function,
        if method.is_static() {
            "jclass clazz"
        } else {
            "jobject thiz"
        }
    );
    for (index, parameter) in method.prototype.parameters.iter().enumerate() {
        let _ = write!(prototype, ", {} p{index}", jni_type(parameter));
    }
    prototype.push(')');
    prototype
}

fn registration_function(config: &DexConfig) -> String {
    format!(
        "Java_{}_{}__I",
        jni_mangle(config.register_natives_class_name()),
        jni_mangle(config.register_natives_method_name())
    )
}

fn c_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dex::{AccessFlags, ClassDef, Prototype},
        dex2c::options::ProtectConfig,
        test::method,
    };
    use std::{
        collections::{BTreeSet, HashMap},
        path::Path,
    };

    #[test]
    fn mangling_escapes() {
        assert_eq!(jni_mangle("com/example/Foo_Bar"), "com_example_Foo_1Bar");
        assert_eq!(jni_mangle("a/B$C"), "a_B_00024C");
        assert_eq!(jni_mangle("[Ljava/lang/String;"), "_3Ljava_lang_String_2");
        assert_eq!(jni_mangle("é"), "_000e9");
        assert_eq!(jni_mangle("😀"), "_0d83d_0de00");
    }

    #[test]
    fn long_form_names() {
        let method = MethodRef::new(
            "Lcom/a/B;",
            "run",
            Prototype::new("V", ["I", "Ljava/lang/String;", "[I"]),
        );
        assert_eq!(
            jni_function_name(&method),
            "Java_com_a_B_run__ILjava_lang_String_2_3I"
        );

        let no_args = MethodRef::new("La/B;", "get", Prototype::new("J", Vec::<String>::new()));
        assert_eq!(jni_function_name(&no_args), "Java_a_B_get__");
    }

    #[test]
    fn jni_types() {
        assert_eq!(jni_type("I"), "jint");
        assert_eq!(jni_type("Ljava/lang/String;"), "jstring");
        assert_eq!(jni_type("[[I"), "jobjectArray");
        assert_eq!(jni_type("Lapp/Foo;"), "jobject");
    }

    fn handled_config(offsets: &[(&str, u32)]) -> DexConfig {
        let mut config = DexConfig::new(Path::new("out"), "classes.dex", &ProtectConfig::default());
        let handled: BTreeSet<String> = offsets.iter().map(|(c, _)| c.to_string()).collect();
        let offsets: HashMap<String, u32> =
            offsets.iter().map(|(c, o)| (c.to_string(), *o)).collect();
        config.set_split_result(handled, offsets).unwrap();
        config
    }

    #[test]
    fn generates_tables_in_offset_order() {
        let implementation = DexContainer::new(vec![
            ClassDef::new("La/A;")
                .with_method(method("La/A;", "one", "()V", AccessFlags::PUBLIC))
                .with_method(method("La/A;", "two", "(I)I", AccessFlags::STATIC)),
            ClassDef::new("La/B;").with_method(method("La/B;", "three", "()V", AccessFlags::PUBLIC)),
        ]);
        let config = handled_config(&[("a/A", 0), ("a/B", 2)]);

        let mut resolver = Vec::new();
        let mut native = Vec::new();
        let summary = JniSkeletonGenerator
            .generate(&config, &implementation, &mut resolver, &mut native)
            .unwrap();

        assert_eq!(
            summary,
            GeneratedCode {
                classes: 2,
                native_methods: 3
            }
        );

        let native = String::from_utf8(native).unwrap();
        assert!(native.contains(
            "JNIEXPORT jint JNICALL Java_a_A_two__I(JNIEnv *env, jclass clazz, jint p0);"
        ));
        assert!(native.contains("Java_a_A_one__(JNIEnv *env, jobject thiz)"));

        let resolver = String::from_utf8(resolver).unwrap();
        assert!(resolver.contains("{\"a/A\", 0, 2},"));
        assert!(resolver.contains("{\"a/B\", 2, 1},"));
        assert!(resolver.contains("{\"two\", \"(I)I\", (void *) Java_a_A_two__I},"));
        assert!(resolver.contains("Java_dexsplit_NativeRegistry_registerNatives_1classes__I"));
    }

    #[test]
    fn mismatched_offsets_are_rejected() {
        let implementation = DexContainer::new(vec![
            ClassDef::new("La/A;").with_method(method("La/A;", "one", "()V", AccessFlags::PUBLIC)),
            ClassDef::new("La/B;").with_method(method("La/B;", "two", "()V", AccessFlags::PUBLIC)),
        ]);
        let config = handled_config(&[("a/A", 0), ("a/B", 5)]);

        let result =
            JniSkeletonGenerator.generate(&config, &implementation, &mut Vec::new(), &mut Vec::new());
        assert!(matches!(result, Err(crate::Error::ContractViolation(_))));
    }

    #[test]
    fn init_glue_registers_every_container() {
        let configs = [
            DexConfig::new(Path::new("out"), "classes.dex", &ProtectConfig::default()),
            DexConfig::new(Path::new("out"), "classes2.dex", &ProtectConfig::default()),
        ];

        let mut out = Vec::new();
        JniSkeletonGenerator.generate_init(&configs, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("JNI_OnLoad"));
        assert!(text.contains(
            "register_entry(env, \"dexsplit/NativeRegistry\", \"registerNatives_classes2\""
        ));
        assert_eq!(text.matches("register_entry(env,").count(), 2);
    }
}
