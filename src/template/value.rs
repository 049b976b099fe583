//! Values produced by template expressions

use std::collections::BTreeMap;
use std::fmt;

/// A dynamically typed expression value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Truthiness used by `if` blocks, `and`/`or`/`not` and conditional tasks.
    ///
    /// Strings are read the way setting values are written in project files,
    /// so `"0"`, `"false"`, `"no"`, `"off"` and `"none"` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => str_is_truthy(s),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Interpret the value as a list; strings split on whitespace
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Value::None => Vec::new(),
            Value::List(items) => items,
            Value::Str(s) => s
                .split_whitespace()
                .map(|part| Value::Str(part.to_string()))
                .collect(),
            Value::Map(map) => map.into_keys().map(Value::Str).collect(),
            other => vec![other],
        }
    }
}

/// Boolean reading of a rendered string
pub fn str_is_truthy(s: &str) -> bool {
    let lowered = s.trim().to_ascii_lowercase();
    !matches!(lowered.as_str(), "" | "0" | "false" | "no" | "off" | "none")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Map(map) => {
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}={}", key, value)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::Str).collect())
    }
}

impl From<BTreeMap<String, String>> for Value {
    fn from(map: BTreeMap<String, String>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, Value::Str(v))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Str("0".to_string()).is_truthy());
        assert!(!Value::Str(" Off ".to_string()).is_truthy());
        assert!(Value::Str("yes".to_string()).is_truthy());
        assert!(Value::Str("/opt/app".to_string()).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::List(vec![Value::None]).is_truthy());
    }

    #[test]
    fn test_display() {
        let list = Value::List(vec![Value::from("a"), Value::Int(2), Value::Bool(true)]);
        assert_eq!(list.to_string(), "a 2 True");
        assert_eq!(Value::None.to_string(), "");
    }

    #[test]
    fn test_into_items_splits_strings() {
        let items = Value::from("x  y\nz").into_items();
        assert_eq!(
            items,
            vec![Value::from("x"), Value::from("y"), Value::from("z")]
        );
    }
}
