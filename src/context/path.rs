//! Dot-path lookup.
//!
//! `resolve("steps.fetch.data.items.0.id", scope)` walks maps by key and
//! lists by all-digit index. Anything missing resolves to `null`; lookups
//! never fail.

use std::borrow::Cow;

use serde_json::{Map, Value};

/// Source of root values for path lookup.
///
/// The first path segment is handed to [`Scope::root`]; the rest is walked
/// over the returned value.
pub trait Scope {
    fn root(&self, key: &str) -> Option<Cow<'_, Value>>;
}

impl Scope for Value {
    fn root(&self, key: &str) -> Option<Cow<'_, Value>> {
        self.as_object()?.get(key).map(Cow::Borrowed)
    }
}

impl Scope for Map<String, Value> {
    fn root(&self, key: &str) -> Option<Cow<'_, Value>> {
        self.get(key).map(Cow::Borrowed)
    }
}

/// Resolves a dot-path, returning `Value::Null` when any segment is missing.
pub fn resolve(path: &str, scope: &dyn Scope) -> Value {
    let mut segments = path.trim().split('.').filter(|s| !s.is_empty());
    let first = match segments.next() {
        Some(first) => first,
        None => return Value::Null,
    };
    let root = match scope.root(first) {
        Some(root) => root,
        None => return Value::Null,
    };

    let mut current: &Value = &root;
    for segment in segments {
        current = match descend(current, segment) {
            Some(next) => next,
            None => return Value::Null,
        };
    }
    current.clone()
}

fn descend<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) if segment.bytes().all(|b| b.is_ascii_digit()) => {
            items.get(segment.parse::<usize>().ok()?)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_lookup() {
        let ctx = json!({"row": {"stage": "Won", "tags": ["a", {"k": 2}]}});
        assert_eq!(resolve("row.stage", &ctx), json!("Won"));
        assert_eq!(resolve("row.tags.0", &ctx), json!("a"));
        assert_eq!(resolve("row.tags.1.k", &ctx), json!(2));
        assert_eq!(resolve("row", &ctx), json!({"stage": "Won", "tags": ["a", {"k": 2}]}));
    }

    #[test]
    fn test_missing_is_null() {
        let ctx = json!({"a": {"b": 1}, "xs": [1, 2]});
        assert_eq!(resolve("a.c", &ctx), Value::Null);
        assert_eq!(resolve("a.b.c", &ctx), Value::Null);
        assert_eq!(resolve("zzz.b", &ctx), Value::Null);
        assert_eq!(resolve("xs.2", &ctx), Value::Null);
        assert_eq!(resolve("xs.-1", &ctx), Value::Null);
        assert_eq!(resolve("xs.first", &ctx), Value::Null);
    }

    #[test]
    fn test_blank_paths() {
        let ctx = json!({"a": 1});
        assert_eq!(resolve("", &ctx), Value::Null);
        assert_eq!(resolve("   ", &ctx), Value::Null);
        assert_eq!(resolve(".", &ctx), Value::Null);
    }

    #[test]
    fn test_empty_segments_are_ignored() {
        let ctx = json!({"a": {"b": 1}});
        assert_eq!(resolve("a..b", &ctx), json!(1));
        assert_eq!(resolve(" a.b ", &ctx), json!(1));
    }

    #[test]
    fn test_non_object_root() {
        assert_eq!(resolve("a", &json!([1, 2])), Value::Null);
        assert_eq!(resolve("a", &json!("text")), Value::Null);
    }

    #[test]
    fn test_map_scope() {
        let mut map = Map::new();
        map.insert("item".into(), json!({"qty": 3}));
        assert_eq!(resolve("item.qty", &map), json!(3));
    }
}
