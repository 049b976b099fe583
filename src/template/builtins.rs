//! Functions callable from template expressions
//!
//! Every builtin is pure: none of them touches the filesystem, the network,
//! the process environment or a subprocess.

use crate::error::{InterpolationError, InterpolationResult};
use crate::template::Value;
use std::path::Path;

/// Names of all builtins, for `check` output and error hints
pub const BUILTINS: &[&str] = &[
    "basename", "bool", "default", "dirname", "int", "join", "len", "lower", "path_join",
    "replace", "split", "str", "strip", "upper",
];

/// Call a builtin by name
pub fn call(name: &str, args: Vec<Value>) -> InterpolationResult<Value> {
    match name {
        "len" => {
            let [value] = exact::<1>(name, args)?;
            let len = match &value {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                Value::None => 0,
                other => {
                    return Err(type_error(name, other));
                }
            };
            Ok(Value::Int(len as i64))
        }
        "str" => {
            let [value] = exact::<1>(name, args)?;
            Ok(Value::Str(value.to_string()))
        }
        "int" => {
            let [value] = exact::<1>(name, args)?;
            to_int(value).map(Value::Int)
        }
        "bool" => {
            let [value] = exact::<1>(name, args)?;
            Ok(Value::Bool(value.is_truthy()))
        }
        "lower" => {
            let [value] = exact::<1>(name, args)?;
            Ok(Value::Str(value.to_string().to_lowercase()))
        }
        "upper" => {
            let [value] = exact::<1>(name, args)?;
            Ok(Value::Str(value.to_string().to_uppercase()))
        }
        "strip" => {
            let [value] = exact::<1>(name, args)?;
            Ok(Value::Str(value.to_string().trim().to_string()))
        }
        "replace" => {
            let [value, from, to] = exact::<3>(name, args)?;
            Ok(Value::Str(
                value.to_string().replace(&from.to_string(), &to.to_string()),
            ))
        }
        "split" => {
            if args.len() == 1 {
                let [value] = exact::<1>(name, args)?;
                return Ok(Value::List(Value::Str(value.to_string()).into_items()));
            }
            let [value, sep] = exact::<2>(name, args)?;
            let sep = sep.to_string();
            if sep.is_empty() {
                return Err(InterpolationError::Evaluation(
                    "split() separator must not be empty".to_string(),
                ));
            }
            Ok(Value::List(
                value
                    .to_string()
                    .split(sep.as_str())
                    .map(|part| Value::Str(part.to_string()))
                    .collect(),
            ))
        }
        "join" => {
            let [value, sep] = exact::<2>(name, args)?;
            let sep = sep.to_string();
            let parts: Vec<String> = value.into_items().iter().map(Value::to_string).collect();
            Ok(Value::Str(parts.join(&sep)))
        }
        "basename" => {
            let [value] = exact::<1>(name, args)?;
            let path = value.to_string();
            let base = Path::new(&path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Value::Str(base))
        }
        "dirname" => {
            let [value] = exact::<1>(name, args)?;
            let path = value.to_string();
            let dir = Path::new(&path)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Value::Str(dir))
        }
        "path_join" => {
            if args.is_empty() {
                return Err(arity(name, "at least 1", 0));
            }
            let mut joined = std::path::PathBuf::new();
            for part in args {
                joined.push(part.to_string());
            }
            Ok(Value::Str(joined.to_string_lossy().into_owned()))
        }
        "default" => {
            let [value, fallback] = exact::<2>(name, args)?;
            Ok(if value.is_truthy() { value } else { fallback })
        }
        other => Err(InterpolationError::UndefinedName(format!("{}()", other))),
    }
}

fn exact<const N: usize>(name: &str, args: Vec<Value>) -> InterpolationResult<[Value; N]> {
    let got = args.len();
    args.try_into()
        .map_err(|_| arity(name, &N.to_string(), got))
}

fn arity(name: &str, expected: &str, got: usize) -> InterpolationError {
    InterpolationError::Evaluation(format!(
        "{}() takes {} argument(s), {} given",
        name, expected, got
    ))
}

fn type_error(name: &str, value: &Value) -> InterpolationError {
    InterpolationError::Evaluation(format!(
        "{}() does not accept a {} value",
        name,
        value.type_name()
    ))
}

fn to_int(value: Value) -> InterpolationResult<i64> {
    match value {
        Value::Int(i) => Ok(i),
        Value::Bool(b) => Ok(b as i64),
        Value::Str(s) => s.trim().parse::<i64>().map_err(|_| {
            InterpolationError::Evaluation(format!("invalid literal for int(): {:?}", s))
        }),
        other => Err(type_error("int", &other)),
    }
}
