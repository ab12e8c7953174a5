//! `{{placeholder}}` expansion for scripted handler bodies.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::matcher::PathParams;
use crate::request::MockRequest;

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
// The pattern is known-valid and tested by test_placeholder_pattern_compiles().
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}")
        .expect("BUG: PLACEHOLDER regex is invalid, this is a programmer error")
});

/// Values visible to placeholders.
pub(crate) struct TemplateContext {
    root: Value,
}

impl TemplateContext {
    pub(crate) fn new(request: &MockRequest, params: &PathParams) -> Self {
        let mut root = Map::new();
        root.insert("method".into(), Value::String(request.method().to_string()));
        root.insert("path".into(), Value::String(request.path().to_string()));
        root.insert("params".into(), params.to_json());
        root.insert("query".into(), request.query_json());
        root.insert("headers".into(), request.headers_json());
        root.insert("body".into(), request.body_json());
        Self {
            root: Value::Object(root),
        }
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.root, |value, part| match value {
                Value::Object(map) => map.get(part),
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// Expand placeholders in every string of `template`.
    ///
    /// A string that consists of exactly one placeholder is replaced by the
    /// referenced JSON value; unknown placeholders in that position become
    /// `null`. Placeholders inside longer strings are interpolated, with
    /// unknown ones rendering as empty text.
    pub(crate) fn render(&self, template: &Value) -> Value {
        match template {
            Value::String(text) => self.render_str(text),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn render_str(&self, text: &str) -> Value {
        if let Some(caps) = PLACEHOLDER.captures(text)
            && let Some(whole) = caps.get(0)
            && whole.start() == 0
            && whole.end() == text.len()
        {
            return self.lookup(&caps[1]).cloned().unwrap_or(Value::Null);
        }

        let rendered = PLACEHOLDER.replace_all(text, |caps: &regex::Captures<'_>| {
            match self.lookup(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        });
        Value::String(rendered.into_owned())
    }
}
