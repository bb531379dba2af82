//! Dual-pool splitting.
//!
//! The splitter walks the classes of one input container and builds two pools from it:
//!
//! - the **shell** pool receives every class. Classes rejected by the filter are copied
//!   verbatim; accepted classes are rebuilt with each accepted method swapped for the
//!   replacements produced by the [`MethodConverter`], keeping all other methods as they
//!   were.
//! - the **implementation** pool receives, for every class with at least one converted
//!   method, a class holding only the implementation methods of that class.
//!
//! # Ordering
//!
//! Classes are interned in container order into both pools. Within a class, methods are
//! visited direct methods first, then virtual methods, and each result lands in the direct
//! or virtual bucket matching its own kind, so bucket order follows declaration order.
//!
//! # Offsets
//!
//! Implementation methods of one container form a single native method table. The offset of
//! a handled class is the index of its first implementation method in that table, i.e. the
//! number of implementation methods contributed by handled classes before it.
//!
//! # Thread Safety
//!
//! Converting one class does not depend on any other class, so the per-class work runs on
//! the rayon thread pool when enabled. Interning into the pools always happens afterwards on
//! the calling thread, in container order, so the output does not depend on scheduling.

use std::collections::{BTreeSet, HashMap, HashSet};

use rayon::prelude::*;

use crate::{
    dex::{ClassDef, ClassDefinition, DexContainer, MethodDef, MethodKind, MethodRef},
    dex2c::{converter::MethodConverter, filter::ClassAndMethodFilter},
    pool::Pool,
    Result,
};

/// Methods of one class, partitioned by dispatch kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodBuckets {
    direct: Vec<MethodDef>,
    virtual_methods: Vec<MethodDef>,
    identities: HashSet<MethodRef>,
}

impl MethodBuckets {
    /// Creates empty buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `method` to the bucket matching its kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] if a method with the same identity was
    /// already added.
    pub fn push(&mut self, method: MethodDef) -> Result<()> {
        if !self.identities.insert(method.reference()) {
            return Err(contract_error!(
                "method {} would be declared twice",
                method.reference()
            ));
        }

        match method.kind() {
            MethodKind::Direct => self.direct.push(method),
            MethodKind::Virtual => self.virtual_methods.push(method),
        }
        Ok(())
    }

    /// Appends every method of `methods` in order.
    ///
    /// # Errors
    /// Same as [`MethodBuckets::push`].
    pub fn extend(&mut self, methods: impl IntoIterator<Item = MethodDef>) -> Result<()> {
        methods.into_iter().try_for_each(|m| self.push(m))
    }

    /// Direct methods in insertion order
    #[must_use]
    pub fn direct(&self) -> &[MethodDef] {
        &self.direct
    }

    /// Virtual methods in insertion order
    #[must_use]
    pub fn virtual_methods(&self) -> &[MethodDef] {
        &self.virtual_methods
    }

    /// Total number of methods
    #[must_use]
    pub fn len(&self) -> usize {
        self.direct.len() + self.virtual_methods.len()
    }

    /// Returns true if no method was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a copy of `class` declaring exactly the methods in these buckets.
    #[must_use]
    pub fn into_class(self, class: &dyn ClassDefinition) -> ClassDef {
        ClassDef::rebuild(class, self.direct, self.virtual_methods)
    }
}

/// What the splitter does with one input class.
#[derive(Debug)]
enum ClassPlan {
    /// Rejected by the filter, copied into the shell pool as is
    Verbatim,
    /// Accepted by the filter
    Split {
        shell: ClassDef,
        implementation: Option<ClassDef>,
    },
}

/// Result of splitting one container.
#[derive(Debug)]
pub struct SplitOutput {
    /// Every input class, with converted methods replaced
    pub shell: Pool,
    /// One class per handled class, holding only implementation methods
    pub implementation: Pool,
    /// Internal names (`com/example/Foo`) of classes with at least one converted method
    pub handled_classes: BTreeSet<String>,
    /// First native table index of each handled class, keyed by internal name
    pub offsets: HashMap<String, u32>,
    /// Number of converted methods
    pub converted_methods: usize,
}

/// Splits containers into shell and implementation pools.
pub struct Splitter<'a> {
    filter: &'a dyn ClassAndMethodFilter,
    converter: &'a dyn MethodConverter,
    parallel: bool,
}

impl<'a> Splitter<'a> {
    /// Creates a splitter using `filter` to select and `converter` to convert methods.
    #[must_use]
    pub fn new(filter: &'a dyn ClassAndMethodFilter, converter: &'a dyn MethodConverter) -> Self {
        Splitter {
            filter,
            converter,
            parallel: true,
        }
    }

    /// Enables or disables converting classes on the rayon thread pool.
    #[must_use]
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Splits `container`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] if the converter misbehaves, naming the
    /// class and method, and any error raised while interning.
    pub fn split(&self, container: &DexContainer) -> Result<SplitOutput> {
        let classes = container.classes();
        let plans: Vec<ClassPlan> = if self.parallel {
            classes
                .par_iter()
                .map(|class| self.plan_class(class))
                .collect::<Result<_>>()?
        } else {
            classes
                .iter()
                .map(|class| self.plan_class(class))
                .collect::<Result<_>>()?
        };

        let mut output = SplitOutput {
            shell: Pool::new(),
            implementation: Pool::new(),
            handled_classes: BTreeSet::new(),
            offsets: HashMap::new(),
            converted_methods: 0,
        };
        let mut next_offset: u32 = 0;

        for (class, plan) in classes.iter().zip(plans) {
            match plan {
                ClassPlan::Verbatim => {
                    log::debug!("{}: not accepted, copied", class.descriptor);
                    output.shell.intern(class)?;
                }
                ClassPlan::Split {
                    shell,
                    implementation,
                } => {
                    output.shell.intern(&shell)?;

                    let Some(implementation) = implementation else {
                        log::debug!("{}: accepted, no method converted", class.descriptor);
                        continue;
                    };

                    let converted = implementation.method_count();
                    let name = class.internal_name().to_string();
                    log::debug!(
                        "{}: {} method(s) converted at offset {}",
                        class.descriptor,
                        converted,
                        next_offset
                    );

                    output.offsets.insert(name.clone(), next_offset);
                    output.handled_classes.insert(name);
                    output.implementation.intern(&implementation)?;

                    output.converted_methods += converted;
                    next_offset = u32::try_from(output.converted_methods).map_err(|_| {
                        malformed_error!(
                            "{} native methods overflow the table",
                            output.converted_methods
                        )
                    })?;
                }
            }
        }

        Ok(output)
    }

    fn plan_class(&self, class: &ClassDef) -> Result<ClassPlan> {
        if !self.filter.accept_class(class) {
            return Ok(ClassPlan::Verbatim);
        }

        let mut shell = MethodBuckets::new();
        let mut implementation = MethodBuckets::new();

        for method in class.methods() {
            if !self.filter.accept_method(method) {
                shell.push(method.clone())?;
                continue;
            }

            let (replacements, implementation_method) = self
                .converter
                .convert(method)
                .map_err(|error| match error {
                    crate::Error::ContractViolation(message) => contract_error!(
                        "{} in {}: {}",
                        method.reference(),
                        class.descriptor,
                        message
                    ),
                    other => other,
                })?
                .into_parts();

            shell.extend(replacements)?;
            implementation.push(implementation_method)?;
        }

        let implementation = if implementation.is_empty() {
            None
        } else {
            Some(implementation.into_class(class))
        };

        Ok(ClassPlan::Split {
            shell: shell.into_class(class),
            implementation,
        })
    }
}

/// Splits `container` with `filter` and `converter`, converting classes in parallel.
///
/// # Errors
/// Same as [`Splitter::split`].
pub fn split(
    container: &DexContainer,
    filter: &dyn ClassAndMethodFilter,
    converter: &dyn MethodConverter,
) -> Result<SplitOutput> {
    Splitter::new(filter, converter).split(container)
}
