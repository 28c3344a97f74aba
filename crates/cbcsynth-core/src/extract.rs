//! PRE/POST extraction from KeY proof scripts.
//!
//! Two dialects are recognised, tried in order:
//!
//! 1. explicit blocks: `\pre{ ... }` and `\post{ ... }`
//! 2. a problem block: `\problem { PRE -> { update } \<{ program }\> POST }`
//!
//! The first grammar that yields both fragments wins. The update block and
//! the program fragment of the problem form are only skipped over, never
//! inspected.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CbcError, Result};
use crate::scan::{matching_brace, skip_ws};

/// Precondition / postcondition text pair, trimmed but otherwise verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecPair {
    pub pre: String,
    pub post: String,
}

impl SpecPair {
    fn from_fragments(pre: &str, post: &str) -> Option<Self> {
        let pre = pre.trim();
        let post = post.trim();
        if pre.is_empty() || post.is_empty() {
            return None;
        }
        Some(Self {
            pre: pre.to_string(),
            post: post.to_string(),
        })
    }
}

type Grammar = fn(&str) -> Option<SpecPair>;

/// Recognised dialects in priority order.
const GRAMMARS: &[(&str, Grammar)] = &[
    ("explicit-blocks", extract_explicit_blocks),
    ("problem", extract_problem),
];

fn pre_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bpre\s*\{").expect("valid regex"))
}

fn post_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bpost\s*\{").expect("valid regex"))
}

fn problem_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bproblem\s*\{").expect("valid regex"))
}

fn update_arrow() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"->\s*\{").expect("valid regex"))
}

/// Extract the PRE/POST pair from proof-script text.
pub fn extract(text: &str) -> Result<SpecPair> {
    extract_named(text, "script text")
}

/// Read a proof script from disk and extract its PRE/POST pair.
pub fn extract_file(path: &Path) -> Result<SpecPair> {
    let text = std::fs::read_to_string(path)?;
    extract_named(&text, &path.display().to_string())
}

/// Like [`extract`], naming `source_name` in the error.
pub fn extract_named(text: &str, source_name: &str) -> Result<SpecPair> {
    for (name, grammar) in GRAMMARS {
        if let Some(pair) = grammar(text) {
            debug!(grammar = name, source = source_name, "extracted PRE/POST");
            return Ok(pair);
        }
    }
    Err(CbcError::SpecNotFound {
        source_name: source_name.to_string(),
    })
}

/// Interior of the first balanced `{...}` block opened by `tag`.
fn tagged_block<'a>(text: &'a str, tag: &Regex) -> Option<&'a str> {
    let m = tag.find(text)?;
    let open = m.end() - 1;
    let close = matching_brace(text, open)?;
    Some(&text[open + 1..close])
}

fn extract_explicit_blocks(text: &str) -> Option<SpecPair> {
    let pre = tagged_block(text, pre_tag())?;
    let post = tagged_block(text, post_tag())?;
    SpecPair::from_fragments(pre, post)
}

fn extract_problem(text: &str) -> Option<SpecPair> {
    let body = tagged_block(text, problem_tag())?;

    let arrow = update_arrow().find(body)?;
    let pre = &body[..arrow.start()];

    let after_updates = skip_update_blocks(body, arrow.end() - 1)?;
    let after_program = skip_program_fragment(body, after_updates)?;

    SpecPair::from_fragments(pre, &body[after_program..])
}

/// Skip the update block opened at `open` and any further update blocks
/// chained after it (`{heapAtPre:=heap} {x:=1}`).
fn skip_update_blocks(body: &str, open: usize) -> Option<usize> {
    let mut end = matching_brace(body, open)? + 1;
    loop {
        let next = skip_ws(body, end);
        if !body[next..].starts_with('{') {
            return Some(end);
        }
        end = matching_brace(body, next)? + 1;
    }
}

/// Skip a `\<{ ... }\>` (or `\[{ ... }\]`) fragment starting at or after
/// `from`, returning the offset just past its closing delimiter.
fn skip_program_fragment(body: &str, from: usize) -> Option<usize> {
    let mut i = skip_ws(body, from);
    if body[i..].starts_with('\\') {
        i += 1;
    }
    let closer = match body.as_bytes().get(i)? {
        b'<' => '>',
        b'[' => ']',
        _ => return None,
    };
    let open = skip_ws(body, i + 1);
    let close = matching_brace(body, open)?;

    let mut j = skip_ws(body, close + 1);
    if body[j..].starts_with('\\') {
        j += 1;
    }
    if !body[j..].starts_with(closer) {
        return None;
    }
    Some(j + 1)
}
