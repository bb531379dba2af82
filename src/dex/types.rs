//! Type descriptors, prototypes and member references.
//!
//! Types are identified by their descriptor string, exactly as the runtime spells them:
//! `I` for `int`, `[J` for `long[]`, `Lcom/example/Foo;` for a class. Classes are also
//! commonly referred to by their *internal name*, the descriptor without the leading `L`
//! and trailing `;` (`com/example/Foo`); the handled-class bookkeeping uses internal names.
//!
//! # Key Types
//! - [`Prototype`] - Return type and parameter types of a method
//! - [`MethodRef`] - (class, name, prototype) triple identifying a method
//! - [`FieldRef`] - (class, name, type) triple identifying a field

use std::fmt;

use crate::Result;

/// Returns true if `descriptor` names a class type (`Lcom/example/Foo;`).
#[must_use]
pub fn is_class_descriptor(descriptor: &str) -> bool {
    descriptor.len() > 2 && descriptor.starts_with('L') && descriptor.ends_with(';')
}

/// Strips `L` and `;` from a class descriptor.
///
/// Returns `None` if `descriptor` is not a class descriptor.
///
/// ```rust
/// use dexsplit::dex::internal_name;
///
/// assert_eq!(internal_name("Lcom/example/Foo;"), Some("com/example/Foo"));
/// assert_eq!(internal_name("I"), None);
/// ```
#[must_use]
pub fn internal_name(descriptor: &str) -> Option<&str> {
    if is_class_descriptor(descriptor) {
        Some(&descriptor[1..descriptor.len() - 1])
    } else {
        None
    }
}

/// Builds a class descriptor from an internal name.
#[must_use]
pub fn class_descriptor(internal_name: &str) -> String {
    format!("L{internal_name};")
}

/// Validates a single field or parameter type descriptor.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `descriptor` is not a well-formed type.
pub fn validate_type_descriptor(descriptor: &str) -> Result<()> {
    let element = descriptor.trim_start_matches('[');
    let valid = match element.as_bytes().first() {
        Some(b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D') => element.len() == 1,
        Some(b'V') => element.len() == 1 && element.len() == descriptor.len(),
        Some(b'L') => is_class_descriptor(element) && !element[1..element.len() - 1].contains(';'),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(malformed_error!("Invalid type descriptor '{}'", descriptor))
    }
}

/// The return and parameter types of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prototype {
    /// Return type descriptor, `V` for void
    pub return_type: String,
    /// Parameter type descriptors, in declaration order
    pub parameters: Vec<String>,
}

impl Prototype {
    /// Creates a prototype from return and parameter type descriptors.
    pub fn new<I, S>(return_type: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Prototype {
            return_type: return_type.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
        }
    }

    /// The `()V` prototype used by class initializers.
    #[must_use]
    pub fn void() -> Self {
        Prototype {
            return_type: "V".to_string(),
            parameters: Vec::new(),
        }
    }

    /// Parses a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is not well-formed.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let Some(rest) = descriptor.strip_prefix('(') else {
            return Err(malformed_error!("Method descriptor '{}' lacks '('", descriptor));
        };
        let Some((params, return_type)) = rest.split_once(')') else {
            return Err(malformed_error!("Method descriptor '{}' lacks ')'", descriptor));
        };

        let mut parameters = Vec::new();
        let bytes = params.as_bytes();
        let mut start = 0;
        while start < bytes.len() {
            let mut end = start;
            while end < bytes.len() && bytes[end] == b'[' {
                end += 1;
            }
            if end >= bytes.len() {
                return Err(malformed_error!("Truncated parameter in '{}'", descriptor));
            }
            if bytes[end] == b'L' {
                match params[end..].find(';') {
                    Some(semicolon) => end += semicolon,
                    None => return Err(malformed_error!("Unterminated class in '{}'", descriptor)),
                }
            }
            end += 1;

            let parameter = &params[start..end];
            validate_type_descriptor(parameter)?;
            if parameter == "V" {
                return Err(malformed_error!("Void parameter in '{}'", descriptor));
            }
            parameters.push(parameter.to_string());
            start = end;
        }

        validate_type_descriptor(return_type)?;

        Ok(Prototype {
            return_type: return_type.to_string(),
            parameters,
        })
    }

    /// Number of registers the parameters occupy, `long` and `double` taking two.
    #[must_use]
    pub fn parameter_registers(&self) -> usize {
        self.parameters
            .iter()
            .map(|p| if p == "J" || p == "D" { 2 } else { 1 })
            .sum()
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for parameter in &self.parameters {
            write!(f, "{parameter}")?;
        }
        write!(f, "){}", self.return_type)
    }
}

/// A reference to a method, as used by invoke instructions and the method section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    /// Descriptor of the declaring class
    pub class: String,
    /// Method name
    pub name: String,
    /// Method prototype
    pub prototype: Prototype,
}

impl MethodRef {
    /// Creates a method reference.
    pub fn new(class: impl Into<String>, name: impl Into<String>, prototype: Prototype) -> Self {
        MethodRef {
            class: class.into(),
            name: name.into(),
            prototype,
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.prototype)
    }
}

/// A reference to a field, as used by field access instructions and the field section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    /// Descriptor of the declaring class
    pub class: String,
    /// Field name
    pub name: String,
    /// Field type descriptor
    pub field_type: String,
}

impl FieldRef {
    /// Creates a field reference.
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        FieldRef {
            class: class.into(),
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.class, self.name, self.field_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_names() {
        assert_eq!(internal_name("Lcom/example/Foo;"), Some("com/example/Foo"));
        assert_eq!(internal_name("[Lcom/example/Foo;"), None);
        assert_eq!(internal_name("L;"), None);
        assert_eq!(class_descriptor("a/B"), "La/B;");
    }

    #[test]
    fn type_descriptors() {
        for valid in ["I", "[J", "[[Ljava/lang/String;", "Lfoo;", "V"] {
            assert!(validate_type_descriptor(valid).is_ok(), "{valid}");
        }
        for invalid in ["", "Q", "II", "[V", "Lfoo", "L;", "La;b;"] {
            assert!(validate_type_descriptor(invalid).is_err(), "{invalid}");
        }
    }

    #[test]
    fn prototype_parse_and_display() {
        let proto = Prototype::parse("(I[JLjava/lang/String;D)Z").unwrap();
        assert_eq!(proto.return_type, "Z");
        assert_eq!(
            proto.parameters,
            vec!["I", "[J", "Ljava/lang/String;", "D"]
        );
        assert_eq!(proto.parameter_registers(), 5);
        assert_eq!(proto.to_string(), "(I[JLjava/lang/String;D)Z");
        assert_eq!(Prototype::void().to_string(), "()V");
    }

    #[test]
    fn prototype_parse_errors() {
        for invalid in ["I)V", "(I", "(Ljava/lang/String)V", "(V)V", "([)V", "()"] {
            assert!(Prototype::parse(invalid).is_err(), "{invalid}");
        }
    }

    #[test]
    fn reference_display() {
        let method = MethodRef::new("La/B;", "run", Prototype::new("V", ["I"]));
        assert_eq!(method.to_string(), "La/B;->run(I)V");

        let field = FieldRef::new("La/B;", "count", "J");
        assert_eq!(field.to_string(), "La/B;->count:J");
    }
}
