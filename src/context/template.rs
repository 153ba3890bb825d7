//! `${path}` templating over JSON values.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use super::path::{resolve, Scope};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

/// Renders placeholders inside strings, lists and map values.
///
/// A string that is exactly one placeholder (surrounding whitespace
/// ignored) yields the resolved value with its own type, so
/// `"${vars.answer}"` can produce the number `42`. Map keys are not
/// rendered.
pub fn render(value: &Value, scope: &dyn Scope) -> Value {
    match value {
        Value::String(s) => render_str(s, scope),
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, scope)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render(v, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Renders a single string.
pub fn render_str(text: &str, scope: &dyn Scope) -> Value {
    if let Some(path) = whole_placeholder(text) {
        return resolve(path, scope);
    }
    if !text.contains("${") {
        return Value::String(text.to_string());
    }
    let rendered = PLACEHOLDER.replace_all(text, |caps: &Captures| {
        stringify(&resolve(&caps[1], scope))
    });
    Value::String(rendered.into_owned())
}

/// Text form used when a value is spliced into a larger string.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn whole_placeholder(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix("${")?.strip_suffix('}')?;
    if inner.is_empty() || inner.contains('}') {
        return None;
    }
    Some(inner.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whole_placeholder_keeps_type() {
        let ctx = json!({"vars": {"answer": 42, "obj": {"a": [1]}}});
        assert_eq!(render(&json!("${vars.answer}"), &ctx), json!(42));
        assert_eq!(render(&json!("  ${vars.obj} "), &ctx), json!({"a": [1]}));
        assert_eq!(render(&json!("${vars.missing}"), &ctx), Value::Null);
    }

    #[test]
    fn test_interpolation_stringifies() {
        let ctx = json!({"name": "Ann", "n": 3, "flag": true, "obj": {"a": 1}});
        assert_eq!(render(&json!("hi ${name}"), &ctx), json!("hi Ann"));
        assert_eq!(render(&json!("${n} items"), &ctx), json!("3 items"));
        assert_eq!(render(&json!("${flag}/${obj}"), &ctx), json!("true/{\"a\":1}"));
        assert_eq!(render(&json!("[${missing}]"), &ctx), json!("[]"));
        assert_eq!(render(&json!("${name}${n}"), &ctx), json!("Ann3"));
    }

    #[test]
    fn test_recurses_into_containers() {
        let ctx = json!({"input": {"id": 7}});
        let template = json!({"${input.id}": ["${input.id}", {"deep": "id=${input.id}"}], "n": 1});
        assert_eq!(
            render(&template, &ctx),
            json!({"${input.id}": [7, {"deep": "id=7"}], "n": 1})
        );
    }

    #[test]
    fn test_non_templates_pass_through() {
        let ctx = json!({});
        assert_eq!(render(&json!("plain $ {text}"), &ctx), json!("plain $ {text}"));
        assert_eq!(render(&json!("${}"), &ctx), json!("${}"));
        assert_eq!(render(&json!(1.5), &ctx), json!(1.5));
        assert_eq!(render(&Value::Null, &ctx), Value::Null);
    }
}
