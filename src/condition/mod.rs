//! Condition Language
//!
//! Conditions gate flow steps (`when`) and are available to hook
//! collaborators. The wire format is a JSON value:
//!
//! - `null` is always true, a boolean is itself
//! - a list is an implicit AND over its elements
//! - a map without `$` keys is an AND of exact equalities, `{"row.stage": "Won"}`
//! - a single-key map whose key is an operator, `{"$gt": ["row.amount", 10]}`
//!
//! Conditions are parsed once into [`Condition`] and validated eagerly, so
//! evaluation never fails.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use stepflow::condition::Condition;
//!
//! let cond = Condition::parse(&json!({"$any": ["row.tags", {"$eq": ["item", "vip"]}]})).unwrap();
//! let ctx = json!({"row": {"tags": ["vip", "new"]}});
//! assert!(cond.evaluate(&ctx));
//! ```

mod eval;

use regex::Regex;
use serde::de::{self, Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::context::Scope;
use crate::error::ConditionError;

pub use eval::{is_truthy, values_equal};

/// Comparison operators taking `[path, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// List quantifiers taking `[path, condition]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// True if some element satisfies the body (false on an empty list)
    Any,
    /// True if every element satisfies the body (true on an empty list)
    All,
}

/// A parsed condition tree.
#[derive(Debug, Clone)]
pub enum Condition {
    Literal(bool),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    /// Equality map: every path must resolve to its expected value
    Equals(Vec<(String, Value)>),
    Compare {
        op: Comparison,
        path: String,
        operand: Value,
    },
    In {
        path: String,
        values: Vec<Value>,
    },
    Contains {
        path: String,
        needle: Value,
    },
    StartsWith {
        path: String,
        prefix: String,
    },
    EndsWith {
        path: String,
        suffix: String,
    },
    Regex {
        path: String,
        pattern: Regex,
    },
    Quantified {
        quantifier: Quantifier,
        path: String,
        body: Box<Condition>,
    },
    Exists {
        path: String,
        expected: Option<bool>,
    },
    Truthy(String),
}

impl Condition {
    /// Parses a condition from its JSON form.
    pub fn parse(value: &Value) -> Result<Self, ConditionError> {
        match value {
            Value::Null => Ok(Self::Literal(true)),
            Value::Bool(b) => Ok(Self::Literal(*b)),
            Value::Array(items) => Ok(Self::All(parse_all(items)?)),
            Value::Object(map) => parse_object(map),
            // Numbers and strings are not conditions; they never match.
            _ => Ok(Self::Literal(false)),
        }
    }

    /// Evaluates the condition against a lookup scope.
    pub fn evaluate(&self, scope: &dyn Scope) -> bool {
        eval::evaluate(self, scope)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Condition::parse(&value).map_err(de::Error::custom)
    }
}

/// Parses and evaluates a condition in one go.
pub fn eval_condition(cond: &Value, scope: &dyn Scope) -> Result<bool, ConditionError> {
    Ok(Condition::parse(cond)?.evaluate(scope))
}

fn parse_all(items: &[Value]) -> Result<Vec<Condition>, ConditionError> {
    items.iter().map(Condition::parse).collect()
}

/// Operator keys look like `$name`: a dollar followed by an identifier.
fn is_operator_key(key: &str) -> bool {
    let mut chars = match key.strip_prefix('$') {
        Some(rest) => rest.chars(),
        None => return false,
    };
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_object(map: &Map<String, Value>) -> Result<Condition, ConditionError> {
    if !map.keys().any(|k| k.starts_with('$')) {
        if map.keys().any(|k| k.trim().is_empty()) {
            return Ok(Condition::Literal(false));
        }
        let entries = map
            .iter()
            .map(|(path, expected)| (path.clone(), expected.clone()))
            .collect();
        return Ok(Condition::Equals(entries));
    }

    if map.len() != 1 {
        return Err(ConditionError::MixedOperatorKeys);
    }
    let (op, arg) = match map.iter().next() {
        Some(entry) => entry,
        None => return Ok(Condition::Literal(true)),
    };
    if !is_operator_key(op) {
        return Err(ConditionError::InvalidOperator(op.clone()));
    }

    let op_str = op.as_str();
    match op_str {
        "$and" | "$or" => {
            let items = arg.as_array().ok_or_else(|| bad(op_str, "a list of conditions"))?;
            let parsed = parse_all(items)?;
            Ok(if op_str == "$and" {
                Condition::All(parsed)
            } else {
                Condition::Any(parsed)
            })
        }
        "$not" => Ok(Condition::Not(Box::new(Condition::parse(arg)?))),
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
            let (path, operand) = path_pair(op_str, arg)?;
            let op = match op_str {
                "$eq" => Comparison::Eq,
                "$ne" => Comparison::Ne,
                "$gt" => Comparison::Gt,
                "$gte" => Comparison::Gte,
                "$lt" => Comparison::Lt,
                _ => Comparison::Lte,
            };
            Ok(Condition::Compare {
                op,
                path,
                operand: operand.clone(),
            })
        }
        "$in" => {
            let (path, operand) = path_pair(op_str, arg)?;
            let values = operand
                .as_array()
                .ok_or_else(|| bad(op_str, "[path, [values...]]"))?
                .clone();
            Ok(Condition::In { path, values })
        }
        "$contains" => {
            let (path, needle) = path_pair(op_str, arg)?;
            Ok(Condition::Contains {
                path,
                needle: needle.clone(),
            })
        }
        "$startsWith" | "$endsWith" => {
            let (path, operand) = path_pair(op_str, arg)?;
            let text = operand
                .as_str()
                .ok_or_else(|| bad(op_str, "[path, string]"))?
                .to_string();
            Ok(if op_str == "$startsWith" {
                Condition::StartsWith { path, prefix: text }
            } else {
                Condition::EndsWith { path, suffix: text }
            })
        }
        "$regex" => {
            let (path, operand) = path_pair(op_str, arg)?;
            let source = operand
                .as_str()
                .ok_or_else(|| bad(op_str, "[path, pattern_string]"))?;
            let pattern = Regex::new(source).map_err(|e| ConditionError::InvalidRegex {
                pattern: source.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Condition::Regex { path, pattern })
        }
        "$any" | "$all" => {
            let (path, body) = path_pair(op_str, arg)?;
            if !body.is_object() {
                return Err(bad(op_str, "[path, <condition_object>]"));
            }
            let quantifier = if op_str == "$any" {
                Quantifier::Any
            } else {
                Quantifier::All
            };
            Ok(Condition::Quantified {
                quantifier,
                path,
                body: Box::new(Condition::parse(body)?),
            })
        }
        "$exists" => match arg {
            Value::Array(items) => {
                if items.len() != 2 {
                    return Err(bad(op_str, "'path' or ['path', bool]"));
                }
                let path = non_empty_path(op_str, &items[0])?;
                let expected = items[1]
                    .as_bool()
                    .ok_or_else(|| bad(op_str, "'path' or ['path', bool]"))?;
                Ok(Condition::Exists {
                    path,
                    expected: Some(expected),
                })
            }
            other => Ok(Condition::Exists {
                path: non_empty_path(op_str, other)?,
                expected: None,
            }),
        },
        "$truthy" => Ok(Condition::Truthy(non_empty_path(op_str, arg)?)),
        _ => Err(ConditionError::UnknownOperator(op.clone())),
    }
}

fn bad(op: &str, expected: &'static str) -> ConditionError {
    ConditionError::BadArgument {
        op: op.to_string(),
        expected,
    }
}

fn non_empty_path(op: &str, value: &Value) -> Result<String, ConditionError> {
    match value.as_str() {
        Some(path) if !path.trim().is_empty() => Ok(path.to_string()),
        _ => Err(ConditionError::EmptyPath { op: op.to_string() }),
    }
}

/// Splits a `[path, value]` argument.
fn path_pair<'a>(op: &str, arg: &'a Value) -> Result<(String, &'a Value), ConditionError> {
    match arg.as_array().map(Vec::as_slice) {
        Some([path, operand]) => Ok((non_empty_path(op, path)?, operand)),
        _ => Err(bad(op, "[path, value]")),
    }
}
