//! Domain types for intercepted calls
//!
//! Intercepted methods exchange arguments and results as [`Value`]s so that a
//! single rule can sit in front of methods with different signatures.

use std::fmt;

/// Kind of method at a call site.
///
/// Matchers use this to skip constructors and static entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Constructor,
    Static,
    Instance,
}

/// Declared parameter type at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Int,
    Bool,
    Str,
    StrList,
    Other(String),
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Int => f.write_str("int"),
            ParamKind::Bool => f.write_str("bool"),
            ParamKind::Str => f.write_str("String"),
            ParamKind::StrList => f.write_str("String[]"),
            ParamKind::Other(name) => f.write_str(name),
        }
    }
}

/// A dynamically typed argument or result of an intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Unit,
    Bool(bool),
    Int(i64),
    Str(String),
    StrList(Vec<Option<String>>),
}

impl Value {
    /// Short type name used in argument mismatch errors.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "String",
            Value::StrList(_) => "String[]",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_kind_display() {
        assert_eq!(ParamKind::Str.to_string(), "String");
        assert_eq!(ParamKind::StrList.to_string(), "String[]");
        assert_eq!(ParamKind::Other("Path".to_string()).to_string(), "Path");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(7_i64).as_int(), Some(7));
        assert_eq!(Value::Null.as_str(), None);
        assert_eq!(Value::StrList(vec![]).type_name(), "String[]");
    }
}
