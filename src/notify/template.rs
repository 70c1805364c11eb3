//! `${item.x}` / `${timeline.x}` placeholder expansion

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{(item|timeline)((?:\.[A-Za-z0-9_-]+)+)\}")
            .expect("placeholder pattern is valid")
    })
}

/// Values available to a template
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub item: Option<Value>,
    pub timeline: Value,
}

impl TemplateContext {
    fn root(&self, name: &str) -> Option<&Value> {
        match name {
            "item" => self.item.as_ref(),
            "timeline" => Some(&self.timeline),
            _ => None,
        }
    }
}

/// Follows a dotted path through objects (and arrays by index)
fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .try_fold(root, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(list) => segment.parse::<usize>().ok().and_then(|i| list.get(i)),
            _ => None,
        })
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitutes every resolvable placeholder; unknown paths stay verbatim
pub fn render(template: &str, context: &TemplateContext) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| {
            let resolved = context
                .root(&caps[1])
                .and_then(|root| lookup(root, &caps[2]));
            match resolved {
                Some(value) => display(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
