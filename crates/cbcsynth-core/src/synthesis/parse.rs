//! Tolerant response parsing.
//!
//! The model is asked for `{"java": "..."}` but the format is not
//! guaranteed, so parsing is an ordered chain of strategies and the first
//! one that yields non-empty code wins:
//!
//! 1. the whole body as a JSON object with a code field
//! 2. the interior of the first fenced code block
//! 3. the whole body as code

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// JSON fields that may carry the code, in lookup order.
pub const CODE_FIELDS: &[&str] = &["java", "code"];

type ParseStrategy = fn(&str) -> Option<String>;

const STRATEGIES: &[(&str, ParseStrategy)] = &[
    ("json", from_json_object),
    ("fenced", from_fenced_block),
    ("raw", from_raw_body),
];

fn fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:[A-Za-z0-9_+\-]*[ \t]*\r?\n)?(.*?)```").expect("valid regex")
    })
}

/// Extract code from a model response. `None` means no usable code.
pub fn parse_code(body: &str) -> Option<String> {
    parse_code_with_strategy(body).map(|(_, code)| code)
}

/// Like [`parse_code`], also naming the strategy that matched.
pub fn parse_code_with_strategy(body: &str) -> Option<(&'static str, String)> {
    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(body).map(|code| (*name, code)))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn from_json_object(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    let obj = value.as_object()?;
    CODE_FIELDS
        .iter()
        .find_map(|field| obj.get(*field).and_then(Value::as_str).and_then(non_empty))
}

fn from_fenced_block(body: &str) -> Option<String> {
    let interior = fence().captures(body)?.get(1)?.as_str();
    // A fenced JSON answer still carries its code in a field.
    from_json_object(interior).or_else(|| non_empty(interior))
}

fn from_raw_body(body: &str) -> Option<String> {
    // A bare JSON object without a code field is never a statement block.
    if serde_json::from_str::<Value>(body.trim())
        .map(|v| v.is_object())
        .unwrap_or(false)
    {
        return None;
    }
    non_empty(body)
}
