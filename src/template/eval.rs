//! Expression evaluation

use crate::error::{InterpolationError, InterpolationResult};
use crate::template::builtins;
use crate::template::expr::{BinaryOp, Expr};
use crate::template::Value;
use std::cmp::Ordering;

/// The result of looking up a name: either a concrete value or a namespace
/// whose members are resolved on demand.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Value(Value),
    Namespace(String),
}

/// Supplies names to expressions
pub trait Scope {
    /// Resolve a root identifier such as `env` or a loop variable
    fn root(&self, name: &str) -> InterpolationResult<Binding>;

    /// Resolve `namespace.name`
    fn member(&self, namespace: &str, name: &str) -> InterpolationResult<Binding>;
}

/// Evaluate an expression to a value
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> InterpolationResult<Value> {
    match eval_binding(expr, scope)? {
        Binding::Value(value) => Ok(value),
        Binding::Namespace(ns) => Err(InterpolationError::Evaluation(format!(
            "namespace '{}' cannot be used as a value",
            ns
        ))),
    }
}

fn eval_binding(expr: &Expr, scope: &dyn Scope) -> InterpolationResult<Binding> {
    match expr {
        Expr::Name(name) => scope.root(name),
        Expr::Attr(base, name) => match eval_binding(base, scope)? {
            Binding::Namespace(ns) => scope.member(&ns, name),
            Binding::Value(Value::Map(mut map)) => map
                .remove(name)
                .map(Binding::Value)
                .ok_or_else(|| InterpolationError::UndefinedName(dotted(base, name))),
            Binding::Value(other) => Err(InterpolationError::Evaluation(format!(
                "{} value has no attribute '{}'",
                other.type_name(),
                name
            ))),
        },
        other => eval_value(other, scope).map(Binding::Value),
    }
}

fn dotted(base: &Expr, name: &str) -> String {
    fn path(expr: &Expr) -> String {
        match expr {
            Expr::Name(n) => n.clone(),
            Expr::Attr(base, n) => format!("{}.{}", path(base), n),
            Expr::Index(base, _) => format!("{}[...]", path(base)),
            _ => "<expr>".to_string(),
        }
    }
    format!("{}.{}", path(base), name)
}

fn eval_value(expr: &Expr, scope: &dyn Scope) -> InterpolationResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(_) | Expr::Attr(_, _) => evaluate(expr, scope),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<InterpolationResult<Vec<_>>>()
            .map(Value::List),
        Expr::Index(base, index) => {
            let base = evaluate(base, scope)?;
            let index = evaluate(index, scope)?;
            index_value(base, index)
        }
        Expr::Call(function, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<InterpolationResult<Vec<_>>>()?;
            builtins::call(function, args)
        }
        Expr::Neg(inner) => match evaluate(inner, scope)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| overflow("-")),
            other => Err(InterpolationError::Evaluation(format!(
                "bad operand type for unary -: {}",
                other.type_name()
            ))),
        },
        Expr::Not(inner) => Ok(Value::Bool(!evaluate(inner, scope)?.is_truthy())),
        Expr::And(left, right) => {
            let left = evaluate(left, scope)?;
            if left.is_truthy() {
                evaluate(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = evaluate(left, scope)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                evaluate(right, scope)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            binary(*op, left, right)
        }
    }
}

fn overflow(op: &str) -> InterpolationError {
    InterpolationError::Evaluation(format!("integer overflow in '{}'", op))
}

fn index_value(base: Value, index: Value) -> InterpolationResult<Value> {
    match (base, index) {
        (Value::List(items), Value::Int(i)) => {
            let len = items.len() as i64;
            let idx = if i < 0 { len + i } else { i };
            if idx < 0 || idx >= len {
                return Err(InterpolationError::Evaluation(format!(
                    "list index {} out of range",
                    i
                )));
            }
            Ok(items.into_iter().nth(idx as usize).unwrap_or(Value::None))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let idx = if i < 0 { len + i } else { i };
            if idx < 0 || idx >= len {
                return Err(InterpolationError::Evaluation(format!(
                    "string index {} out of range",
                    i
                )));
            }
            Ok(Value::Str(chars[idx as usize].to_string()))
        }
        (Value::Map(mut map), Value::Str(key)) => map
            .remove(&key)
            .ok_or_else(|| InterpolationError::UndefinedName(format!("[{:?}]", key))),
        (base, index) => Err(InterpolationError::Evaluation(format!(
            "{} cannot be indexed by {}",
            base.type_name(),
            index.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> InterpolationResult<Value> {
    use BinaryOp::*;

    match op {
        Eq => return Ok(Value::Bool(left == right)),
        Ne => return Ok(Value::Bool(left != right)),
        In => return contains(right, &left).map(Value::Bool),
        NotIn => return contains(right, &left).map(|b| Value::Bool(!b)),
        Lt | Le | Gt | Ge => {
            let ordering = compare(&left, &right)?;
            let result = match op {
                Lt => ordering == Ordering::Less,
                Le => ordering != Ordering::Greater,
                Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (op, left, right) {
        (Add, Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::Int).ok_or_else(|| overflow("+")),
        (Sub, Value::Int(a), Value::Int(b)) => a.checked_sub(b).map(Value::Int).ok_or_else(|| overflow("-")),
        (Mul, Value::Int(a), Value::Int(b)) => a.checked_mul(b).map(Value::Int).ok_or_else(|| overflow("*")),
        (Div, Value::Int(_), Value::Int(0)) | (Rem, Value::Int(_), Value::Int(0)) => Err(
            InterpolationError::Evaluation("integer division by zero".to_string()),
        ),
        (Div, Value::Int(a), Value::Int(b)) => a.checked_div_euclid(b).map(Value::Int).ok_or_else(|| overflow("/")),
        (Rem, Value::Int(a), Value::Int(b)) => a.checked_rem_euclid(b).map(Value::Int).ok_or_else(|| overflow("%")),
        (Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (op, left, right) => Err(InterpolationError::Evaluation(format!(
            "unsupported operand types for {}: {} and {}",
            symbol(op),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::In => "in",
        BinaryOp::NotIn => "not in",
    }
}

fn compare(left: &Value, right: &Value) -> InterpolationResult<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        (a, b) => Err(InterpolationError::Evaluation(format!(
            "cannot order {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn contains(container: Value, needle: &Value) -> InterpolationResult<bool> {
    match (container, needle) {
        (Value::Str(hay), Value::Str(n)) => Ok(hay.contains(n.as_str())),
        (Value::List(items), n) => Ok(items.iter().any(|item| item == n)),
        (Value::Map(map), Value::Str(key)) => Ok(map.contains_key(key)),
        (container, n) => Err(InterpolationError::Evaluation(format!(
            "'in' is not supported between {} and {}",
            n.type_name(),
            container.type_name()
        ))),
    }
}
