//! Condition evaluation over a [`Scope`].

use std::borrow::Cow;

use serde_json::Value;

use super::{Comparison, Condition, Quantifier};
use crate::context::{resolve, Scope};

/// Overlays `item` on a parent scope while a quantifier walks a list.
struct ItemScope<'a> {
    item: &'a Value,
    parent: &'a dyn Scope,
}

impl Scope for ItemScope<'_> {
    fn root(&self, key: &str) -> Option<Cow<'_, Value>> {
        if key == "item" {
            Some(Cow::Borrowed(self.item))
        } else {
            self.parent.root(key)
        }
    }
}

pub(super) fn evaluate(cond: &Condition, scope: &dyn Scope) -> bool {
    match cond {
        Condition::Literal(b) => *b,
        Condition::All(items) => items.iter().all(|c| evaluate(c, scope)),
        Condition::Any(items) => items.iter().any(|c| evaluate(c, scope)),
        Condition::Not(inner) => !evaluate(inner, scope),
        Condition::Equals(entries) => entries
            .iter()
            .all(|(path, expected)| values_equal(&resolve(path, scope), expected)),
        Condition::Compare { op, path, operand } => {
            compare(*op, &resolve(path, scope), operand)
        }
        Condition::In { path, values } => {
            let actual = resolve(path, scope);
            values.iter().any(|v| values_equal(&actual, v))
        }
        Condition::Contains { path, needle } => contains(&resolve(path, scope), needle),
        Condition::StartsWith { path, prefix } => resolve(path, scope)
            .as_str()
            .map_or(false, |s| s.starts_with(prefix.as_str())),
        Condition::EndsWith { path, suffix } => resolve(path, scope)
            .as_str()
            .map_or(false, |s| s.ends_with(suffix.as_str())),
        Condition::Regex { path, pattern } => resolve(path, scope)
            .as_str()
            .map_or(false, |s| pattern.is_match(s)),
        Condition::Quantified {
            quantifier,
            path,
            body,
        } => {
            let items = match resolve(path, scope) {
                Value::Null => Vec::new(),
                Value::Array(items) => items,
                _ => return false,
            };
            let check = |item: &Value| {
                evaluate(
                    body,
                    &ItemScope {
                        item,
                        parent: scope,
                    },
                )
            };
            match quantifier {
                Quantifier::Any => items.iter().any(check),
                Quantifier::All => items.iter().all(check),
            }
        }
        Condition::Exists { path, expected } => {
            let exists = !resolve(path, scope).is_null();
            expected.map_or(exists, |want| exists == want)
        }
        Condition::Truthy(path) => is_truthy(&resolve(path, scope)),
    }
}

fn compare(op: Comparison, actual: &Value, operand: &Value) -> bool {
    match op {
        Comparison::Eq => values_equal(actual, operand),
        Comparison::Ne => !values_equal(actual, operand),
        _ => {
            let (a, b) = match (actual.as_f64(), operand.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return false,
            };
            match op {
                Comparison::Gt => a > b,
                Comparison::Gte => a >= b,
                Comparison::Lt => a < b,
                _ => a <= b,
            }
        }
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().map_or(false, |n| s.contains(n)),
        Value::Array(items) => items.iter().any(|v| values_equal(v, needle)),
        Value::Object(map) => needle.as_str().map_or(false, |k| map.contains_key(k)),
        _ => false,
    }
}

/// JSON equality where numbers compare by value, so `1 == 1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Truthiness: null, false, zero, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(cond: Value, ctx: &Value) -> bool {
        Condition::parse(&cond).unwrap().evaluate(ctx)
    }

    #[test]
    fn test_equality_map() {
        let ctx = json!({"row": {"stage": "Closed Won", "amount": 10}});
        assert!(check(json!({"row.stage": "Closed Won"}), &ctx));
        assert!(!check(json!({"row.stage": "Closed Won", "row.amount": 11}), &ctx));
        assert!(!check(json!({" ": null}), &ctx));
    }

    #[test]
    fn test_null_and_list() {
        let ctx = json!({"a": 1});
        assert!(check(Value::Null, &ctx));
        assert!(check(json!([]), &ctx));
        assert!(check(json!([{"a": 1}, true]), &ctx));
        assert!(!check(json!([{"a": 1}, false]), &ctx));
    }

    #[test]
    fn test_boolean_operators() {
        let ctx = json!({"a": 1, "b": 2});
        assert!(check(json!({"$and": [{"a": 1}, {"b": 2}]}), &ctx));
        assert!(check(json!({"$or": [{"a": 9}, {"b": 2}]}), &ctx));
        assert!(!check(json!({"$or": []}), &ctx));
        assert!(check(json!({"$not": {"a": 9}}), &ctx));
    }

    #[test]
    fn test_comparisons() {
        let ctx = json!({"row": {"amount": 10, "label": "10", "flag": true}});
        assert!(check(json!({"$gt": ["row.amount", 9]}), &ctx));
        assert!(check(json!({"$gte": ["row.amount", 10.0]}), &ctx));
        assert!(check(json!({"$lt": ["row.amount", 10.5]}), &ctx));
        assert!(check(json!({"$lte": ["row.amount", 10]}), &ctx));
        assert!(!check(json!({"$gt": ["row.label", 1]}), &ctx));
        assert!(!check(json!({"$gt": ["row.flag", 0]}), &ctx));
        assert!(!check(json!({"$lt": ["row.missing", 1]}), &ctx));
    }

    #[test]
    fn test_eq_and_ne() {
        let ctx = json!({"n": 1, "s": "x"});
        assert!(check(json!({"$eq": ["n", 1.0]}), &ctx));
        assert!(check(json!({"$ne": ["s", "y"]}), &ctx));
        assert!(check(json!({"$eq": ["missing", null]}), &ctx));
    }

    #[test]
    fn test_in_and_contains() {
        let ctx = json!({"stage": "Won", "tags": ["a", "b"], "title": "hello world", "obj": {"k": 1}});
        assert!(check(json!({"$in": ["stage", ["Lost", "Won"]]}), &ctx));
        assert!(!check(json!({"$in": ["stage", []]}), &ctx));
        assert!(check(json!({"$contains": ["tags", "b"]}), &ctx));
        assert!(check(json!({"$contains": ["title", "lo wo"]}), &ctx));
        assert!(check(json!({"$contains": ["obj", "k"]}), &ctx));
        assert!(!check(json!({"$contains": ["stage", 1]}), &ctx));
    }

    #[test]
    fn test_string_operators() {
        let ctx = json!({"email": "ann@example.com", "n": 5});
        assert!(check(json!({"$startsWith": ["email", "ann"]}), &ctx));
        assert!(check(json!({"$endsWith": ["email", ".com"]}), &ctx));
        assert!(!check(json!({"$startsWith": ["n", "5"]}), &ctx));
        assert!(check(json!({"$regex": ["email", "@example\\."]}), &ctx));
        assert!(!check(json!({"$regex": ["n", "5"]}), &ctx));
    }

    #[test]
    fn test_any_all() {
        let ctx = json!({"items": [{"qty": 1}, {"qty": 3}], "empty": [], "scalar": 3});
        assert!(check(json!({"$any": ["items", {"$gt": ["item.qty", 2]}]}), &ctx));
        assert!(!check(json!({"$all": ["items", {"$gt": ["item.qty", 2]}]}), &ctx));
        assert!(!check(json!({"$any": ["empty", {"$truthy": "item"}]}), &ctx));
        assert!(check(json!({"$all": ["empty", {"$truthy": "item"}]}), &ctx));
        assert!(check(json!({"$all": ["missing", {"$truthy": "item"}]}), &ctx));
        assert!(!check(json!({"$all": ["scalar", {"$truthy": "item"}]}), &ctx));
    }

    #[test]
    fn test_item_binding_sees_outer_scope() {
        let ctx = json!({"min": 2, "xs": [1, 2, 3], "item": "outer"});
        assert!(check(json!({"$any": ["xs", {"$eq": ["item", 3]}]}), &ctx));
        assert!(check(json!({"$eq": ["item", "outer"]}), &ctx));
        assert!(check(json!({"$all": ["xs", {"$exists": "min"}]}), &ctx));
    }

    #[test]
    fn test_exists_and_truthy() {
        let ctx = json!({"a": 0, "b": null, "c": "x"});
        assert!(check(json!({"$exists": "a"}), &ctx));
        assert!(!check(json!({"$exists": "b"}), &ctx));
        assert!(check(json!({"$exists": ["zzz", false]}), &ctx));
        assert!(!check(json!({"$truthy": "a"}), &ctx));
        assert!(check(json!({"$truthy": "c"}), &ctx));
    }

    #[test]
    fn test_values_equal_numeric() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!values_equal(&json!("1"), &json!(1)));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{} should be falsy", falsy);
        }
        for truthy in [json!(true), json!(-1), json!("0"), json!([0]), json!({"a": null})] {
            assert!(is_truthy(&truthy), "{} should be truthy", truthy);
        }
    }
}
