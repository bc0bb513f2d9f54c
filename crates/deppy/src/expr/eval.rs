use std::cmp::Ordering;

use semver::{Version, VersionReq};

use crate::entity::Entity;
use crate::error::ExprError;

use super::parser::{BinaryOp, Builtin, Expr, VarRef};

/// A runtime value. Property access yields sequences of strings; indexing a
/// sequence yields a string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    Seq(Vec<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
        }
    }

    pub fn into_bool(self) -> Result<bool, ExprError> {
        match self {
            Value::Bool(b) => Ok(b),
            other => Err(type_error("bool", &other)),
        }
    }

    pub fn into_int(self) -> Result<i64, ExprError> {
        match self {
            Value::Int(n) => Ok(n),
            other => Err(type_error("int", &other)),
        }
    }

    pub fn into_str(self) -> Result<String, ExprError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(type_error("string", &other)),
        }
    }

    pub fn into_seq(self) -> Result<Vec<String>, ExprError> {
        match self {
            Value::Seq(s) => Ok(s),
            other => Err(type_error("sequence", &other)),
        }
    }
}

fn type_error(expected: &str, found: &Value) -> ExprError {
    ExprError::Eval(format!("expected a {expected} but found a {}", found.kind()))
}

/// The read-only bindings an expression evaluates against.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Env<'a> {
    pub entity: Option<&'a Entity>,
    pub entity_one: Option<&'a Entity>,
    pub entity_two: Option<&'a Entity>,
    /// The current `#` element inside `any`.
    pub elem: Option<&'a str>,
}

impl<'a> Env<'a> {
    fn resolve(&self, var: VarRef) -> Result<&'a Entity, ExprError> {
        let entity = match var {
            VarRef::Entity => self.entity,
            VarRef::EntityOne => self.entity_one,
            VarRef::EntityTwo => self.entity_two,
        };
        entity.ok_or_else(|| {
            ExprError::Eval(format!("{} is not bound in this context", var.name()))
        })
    }
}

/// Evaluate a compiled expression under the given bindings.
pub(crate) fn eval(expr: &Expr, env: &Env<'_>) -> Result<Value, ExprError> {
    match expr {
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Elem => match env.elem {
            Some(elem) => Ok(Value::Str(elem.to_string())),
            None => Err(ExprError::Eval(
                "'#' is only available inside any(...)".to_string(),
            )),
        },
        Expr::Property { var, key } => {
            let entity = env.resolve(*var)?;
            let key = eval(key, env)?.into_str()?;
            Ok(Value::Seq(entity.property(&key).to_vec()))
        }
        Expr::Index { seq, index } => {
            let seq = eval(seq, env)?.into_seq()?;
            let index = eval(index, env)?.into_int()?;
            let position = usize::try_from(index)
                .ok()
                .filter(|&i| i < seq.len())
                .ok_or_else(|| {
                    ExprError::Eval(format!(
                        "index {index} out of range for a sequence of length {}",
                        seq.len()
                    ))
                })?;
            Ok(Value::Str(seq[position].clone()))
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, env)?.into_bool()?)),
        Expr::Neg(inner) => {
            let n = eval(inner, env)?.into_int()?;
            n.checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ExprError::Eval("integer overflow in negation".to_string()))
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, env),
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => {
            if eval(cond, env)?.into_bool()? {
                eval(then, env)
            } else {
                eval(otherwise, env)
            }
        }
        Expr::Any { seq, predicate } => {
            let items = eval(seq, env)?.into_seq()?;
            for item in &items {
                let mut scoped = *env;
                scoped.elem = Some(item);
                if eval(predicate, &scoped)?.into_bool()? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Expr::Call { builtin, args } => eval_call(*builtin, args, env),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, env: &Env<'_>) -> Result<Value, ExprError> {
    // Logical operators short-circuit.
    match op {
        BinaryOp::And => {
            if !eval(lhs, env)?.into_bool()? {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval(rhs, env)?.into_bool()?));
        }
        BinaryOp::Or => {
            if eval(lhs, env)?.into_bool()? {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval(rhs, env)?.into_bool()?));
        }
        _ => {}
    }

    let left = eval(lhs, env)?;
    let right = eval(rhs, env)?;
    match op {
        BinaryOp::Eq => equality(&left, &right).map(Value::Bool),
        BinaryOp::NotEq => equality(&left, &right).map(|eq| Value::Bool(!eq)),
        BinaryOp::Lt => comparison(&left, &right).map(|o| Value::Bool(o == Ordering::Less)),
        BinaryOp::Le => comparison(&left, &right).map(|o| Value::Bool(o != Ordering::Greater)),
        BinaryOp::Gt => comparison(&left, &right).map(|o| Value::Bool(o == Ordering::Greater)),
        BinaryOp::Ge => comparison(&left, &right).map(|o| Value::Bool(o != Ordering::Less)),
        BinaryOp::Add => arithmetic(left, right, i64::checked_add, "addition"),
        BinaryOp::Sub => arithmetic(left, right, i64::checked_sub, "subtraction"),
        BinaryOp::Mul => arithmetic(left, right, i64::checked_mul, "multiplication"),
        BinaryOp::Div => {
            let (a, b) = (left.into_int()?, right.into_int()?);
            a.checked_div(b)
                .map(Value::Int)
                .ok_or_else(|| ExprError::Eval("division by zero".to_string()))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn equality(left: &Value, right: &Value) -> Result<bool, ExprError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        _ => Err(ExprError::Eval(format!(
            "cannot compare a {} with a {}",
            left.kind(),
            right.kind()
        ))),
    }
}

fn comparison(left: &Value, right: &Value) -> Result<Ordering, ExprError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        _ => Err(ExprError::Eval(format!(
            "cannot order a {} against a {}",
            left.kind(),
            right.kind()
        ))),
    }
}

fn arithmetic(
    left: Value,
    right: Value,
    apply: fn(i64, i64) -> Option<i64>,
    what: &str,
) -> Result<Value, ExprError> {
    let (a, b) = (left.into_int()?, right.into_int()?);
    apply(a, b)
        .map(Value::Int)
        .ok_or_else(|| ExprError::Eval(format!("integer overflow in {what}")))
}

fn eval_call(builtin: Builtin, args: &[Expr], env: &Env<'_>) -> Result<Value, ExprError> {
    match builtin {
        Builtin::InSemverRange => {
            let version = eval(&args[0], env)?.into_str()?;
            let range = eval(&args[1], env)?.into_str()?;
            let version = parse_version(&version)?;
            let range = VersionReq::parse(&range)
                .map_err(|e| ExprError::Eval(format!("invalid semver range {range:?}: {e}")))?;
            Ok(Value::Bool(range.matches(&version)))
        }
        Builtin::SemverCompare => {
            let one = parse_version(&eval(&args[0], env)?.into_str()?)?;
            let two = parse_version(&eval(&args[1], env)?.into_str()?)?;
            let ordering = match one.cmp(&two) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            };
            Ok(Value::Int(ordering))
        }
        Builtin::JsonPath => {
            let document = eval(&args[0], env)?.into_str()?;
            let path = eval(&args[1], env)?.into_str()?;
            json_path(&document, &path).map(Value::Str)
        }
    }
}

fn parse_version(version: &str) -> Result<Version, ExprError> {
    Version::parse(version)
        .map_err(|e| ExprError::Eval(format!("invalid semver version {version:?}: {e}")))
}

/// Locate a dotted path inside a JSON document. Numeric segments index
/// arrays. The located value is rendered as a string; a missing path is an
/// evaluation error.
fn json_path(document: &str, path: &str) -> Result<String, ExprError> {
    let parsed: serde_json::Value = serde_json::from_str(document)
        .map_err(|e| ExprError::Eval(format!("JSONPath applied to invalid JSON: {e}")))?;
    let mut current = &parsed;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
        .ok_or_else(|| {
            ExprError::Eval(format!(
                "object path ({path}) not found for object: {document}"
            ))
        })?;
    }
    Ok(match current {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
