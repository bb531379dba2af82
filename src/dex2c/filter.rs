//! Conversion candidate selection.
//!
//! A [`ClassAndMethodFilter`] decides which classes are opened up for conversion and, within
//! those, which methods are turned into native bridges. Filters are consulted from rayon
//! worker threads and must be pure: the same class or method always yields the same answer.
//!
//! # Key Components
//!
//! - [`ClassAndMethodFilter`] - The selection capability consumed by the splitter
//! - [`BasicFilter`] - Accepts every method that can be converted at all
//! - [`RuleFilter`] - [`BasicFilter`] narrowed by include and exclude class patterns
//!
//! # Examples
//!
//! ```rust
//! use dexsplit::dex2c::{ClassAndMethodFilter, RuleFilter};
//! use dexsplit::ClassDef;
//!
//! let filter = RuleFilter::new()
//!     .include("com/example/**")
//!     .exclude("com/example/generated/*");
//!
//! assert!(filter.accept_class(&ClassDef::new("Lcom/example/core/Engine;")));
//! assert!(!filter.accept_class(&ClassDef::new("Lcom/example/generated/R;")));
//! assert!(!filter.accept_class(&ClassDef::new("Lorg/other/Main;")));
//! ```

use crate::dex::{AccessFlags, ClassDefinition, MethodDef};

/// Selects classes and methods for conversion.
pub trait ClassAndMethodFilter: Send + Sync {
    /// Returns true if methods of `class` may be converted
    fn accept_class(&self, class: &dyn ClassDefinition) -> bool;

    /// Returns true if `method`, declared in an accepted class, should be converted
    fn accept_method(&self, method: &MethodDef) -> bool;
}

/// Accepts every concrete method that has a body.
///
/// Interfaces and annotations are rejected as a whole. Constructors, class initializers,
/// abstract and native methods are rejected individually: constructors must stay in
/// bytecode for the verifier, and the others have no body to move.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFilter;

impl ClassAndMethodFilter for BasicFilter {
    fn accept_class(&self, class: &dyn ClassDefinition) -> bool {
        !class
            .access_flags()
            .intersects(AccessFlags::INTERFACE | AccessFlags::ANNOTATION)
    }

    fn accept_method(&self, method: &MethodDef) -> bool {
        method.has_implementation()
            && !method.is_constructor()
            && !method.is_abstract()
            && !method.is_native()
    }
}

/// [`BasicFilter`] restricted by class name patterns.
///
/// Patterns are matched against internal names (`com/example/Foo`). `*` matches within one
/// package segment and `**` matches across segments. With no include pattern every class
/// passes the include step; excludes always win over includes.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    includes: Vec<String>,
    excludes: Vec<String>,
    excluded_methods: Vec<String>,
}

impl RuleFilter {
    /// Creates a filter without rules, behaving like [`BasicFilter`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class pattern to convert.
    #[must_use]
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.includes.push(pattern.into());
        self
    }

    /// Adds a class pattern to keep in bytecode.
    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    /// Keeps every method with this name in bytecode.
    #[must_use]
    pub fn exclude_method(mut self, name: impl Into<String>) -> Self {
        self.excluded_methods.push(name.into());
        self
    }
}

impl ClassAndMethodFilter for RuleFilter {
    fn accept_class(&self, class: &dyn ClassDefinition) -> bool {
        if !BasicFilter.accept_class(class) {
            return false;
        }

        let name = class.internal_name();
        let included = self.includes.is_empty()
            || self.includes.iter().any(|p| glob_matches(p, name));
        included && !self.excludes.iter().any(|p| glob_matches(p, name))
    }

    fn accept_method(&self, method: &MethodDef) -> bool {
        BasicFilter.accept_method(method) && !self.excluded_methods.iter().any(|n| *n == method.name)
    }
}

/// Matches an internal class name against a `*` / `**` pattern.
///
/// Runs in `O(pattern * name^2)` time regardless of how many wildcards the pattern holds.
#[must_use]
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.as_bytes();
    let name = name.as_bytes();
    GlobMatcher {
        pattern,
        name,
        memo: vec![None; (pattern.len() + 1) * (name.len() + 1)],
    }
    .matches(0, 0)
}

/// Wildcard matcher memoized on (pattern position, name position).
struct GlobMatcher<'a> {
    pattern: &'a [u8],
    name: &'a [u8],
    memo: Vec<Option<bool>>,
}

impl GlobMatcher<'_> {
    fn matches(&mut self, p: usize, n: usize) -> bool {
        let key = p * (self.name.len() + 1) + n;
        if let Some(known) = self.memo[key] {
            return known;
        }

        let pattern = self.pattern;
        let name = self.name;
        let matched = match &pattern[p..] {
            [] => n == name.len(),
            [b'*', b'*', ..] => (n..=name.len()).any(|skip| self.matches(p + 2, skip)),
            [b'*', ..] => {
                let segment_end = name[n..]
                    .iter()
                    .position(|&b| b == b'/')
                    .map_or(name.len(), |i| n + i);
                (n..=segment_end).any(|skip| self.matches(p + 1, skip))
            }
            [expected, ..] => name.get(n) == Some(expected) && self.matches(p + 1, n + 1),
        };

        self.memo[key] = Some(matched);
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dex::{ClassDef, Prototype},
        test::method,
    };

    #[test]
    fn basic_filter_rejects_unconvertible_methods() {
        let filter = BasicFilter;

        assert!(filter.accept_method(&method("La/A;", "run", "()V", AccessFlags::PUBLIC)));
        assert!(filter.accept_method(&method(
            "La/A;",
            "helper",
            "(J)I",
            AccessFlags::PRIVATE | AccessFlags::STATIC
        )));
        assert!(!filter.accept_method(&method(
            "La/A;",
            "<init>",
            "()V",
            AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR
        )));
        assert!(!filter.accept_method(&method(
            "La/A;",
            "<clinit>",
            "()V",
            AccessFlags::STATIC | AccessFlags::CONSTRUCTOR
        )));
        assert!(!filter.accept_method(&MethodDef::new(
            "La/A;",
            "run",
            Prototype::void(),
            AccessFlags::PUBLIC | AccessFlags::ABSTRACT
        )));
        assert!(!filter.accept_method(&MethodDef::new(
            "La/A;",
            "run",
            Prototype::void(),
            AccessFlags::PUBLIC | AccessFlags::NATIVE
        )));
    }

    #[test]
    fn basic_filter_rejects_interfaces() {
        let filter = BasicFilter;
        let interface = ClassDef::new("La/I;")
            .with_access_flags(AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT);

        assert!(filter.accept_class(&ClassDef::new("La/A;")));
        assert!(!filter.accept_class(&interface));
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_matches("com/example/*", "com/example/Foo"));
        assert!(!glob_matches("com/example/*", "com/example/sub/Foo"));
        assert!(glob_matches("com/example/**", "com/example/sub/Foo"));
        assert!(glob_matches("**/R", "com/example/R"));
        assert!(glob_matches("**/R$*", "com/example/R$layout"));
        assert!(glob_matches("com/example/Foo", "com/example/Foo"));
        assert!(!glob_matches("com/example/Foo", "com/example/Foo2"));
        assert!(glob_matches("*", "Main"));
        assert!(!glob_matches("*", "a/Main"));
    }

    #[test]
    fn repeated_wildcards_stay_fast() {
        let name = "a".repeat(400);
        assert!(!glob_matches("**a**a**a**a**a**a**a**b", &name));
        assert!(glob_matches("**a**a**a**a**a**a**a**", &name));
        assert!(!glob_matches("*a*a*a*a*a*a*a*b", &name));
    }

    #[test]
    fn rule_filter_excludes_win() {
        let filter = RuleFilter::new()
            .include("app/**")
            .exclude("app/keep/*")
            .exclude_method("onCreate");

        assert!(filter.accept_class(&ClassDef::new("Lapp/core/Engine;")));
        assert!(!filter.accept_class(&ClassDef::new("Lapp/keep/Entry;")));
        assert!(!filter.accept_class(&ClassDef::new("Lother/Engine;")));

        assert!(filter.accept_method(&method("Lapp/A;", "run", "()V", AccessFlags::PUBLIC)));
        assert!(!filter.accept_method(&method(
            "Lapp/A;",
            "onCreate",
            "()V",
            AccessFlags::PUBLIC
        )));
    }

    #[test]
    fn empty_rule_filter_accepts_everything_basic_does() {
        let filter = RuleFilter::new();
        assert!(filter.accept_class(&ClassDef::new("Lanything/Goes;")));
    }
}
