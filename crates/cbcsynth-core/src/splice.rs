//! Structure-preserving insertion of synthesized code into a proof script.
//!
//! The inserted code is never parsed. Two insertion sites are recognised:
//!
//! 1. the marker line `//@SYNTHESIS_HOLE`, replaced in place
//! 2. the body of the first program block `\<{ ... }\>` (or `\[{ ... }\]`);
//!    the code goes right before the innermost body's closing brace
//!
//! Every brace of the original survives, so
//! `braces(patched) == braces(original) + braces(normalized code)`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CbcError, Result};
use crate::scan::{brace_counts, matching_brace, opening_brace, skip_ws};

/// Marker token for the synthesis hole.
pub const SYNTHESIS_HOLE: &str = "//@SYNTHESIS_HOLE";

/// Where the code ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpliceSite {
    Marker,
    ProgramBlock,
}

fn program_opener() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\?([<\[])\{").expect("valid regex"))
}

/// Strip one enclosing brace pair and make sure the code ends a statement.
pub fn normalize_code(code: &str) -> String {
    let mut code = code.trim();
    if code.starts_with('{') && matching_brace(code, 0) == Some(code.len() - 1) {
        code = code[1..code.len() - 1].trim();
    }
    let mut out = code.to_string();
    if !ends_statement(&out) {
        out.push(';');
    }
    out
}

/// Whether `code` already ends a statement: a trailing `;`, or a `}` that
/// closes a block. A `}` closing an array initializer or a lambda body
/// bound in an expression (`a = new int[]{1, 2}`, `f = () -> { .. }`)
/// still needs its `;`.
fn ends_statement(code: &str) -> bool {
    match code.chars().last() {
        Some(';') => true,
        Some('}') => {
            let Some(open) = opening_brace(code, code.len() - 1) else {
                return true;
            };
            let before = code[..open].trim_end();
            !(before.ends_with('=') || before.ends_with(']') || before.ends_with("->"))
        }
        _ => false,
    }
}

/// Splice `code` into `original`.
pub fn splice(original: &str, code: &str) -> Result<String> {
    splice_with_site(original, code).map(|(_, text)| text)
}

/// Splice `code` into `original`, reporting which site was used.
pub fn splice_with_site(original: &str, code: &str) -> Result<(SpliceSite, String)> {
    let code = normalize_code(code);

    let (site, patched) = if original.contains(SYNTHESIS_HOLE) {
        if original.matches(SYNTHESIS_HOLE).count() > 1 {
            warn!("several synthesis holes present, filling the first");
        }
        (SpliceSite::Marker, original.replacen(SYNTHESIS_HOLE, &code, 1))
    } else {
        let close = innermost_body_close(original).ok_or(CbcError::SpliceLocationNotFound)?;
        let sep = if original[..close].ends_with(char::is_whitespace) {
            ""
        } else {
            " "
        };
        let mut patched = String::with_capacity(original.len() + code.len() + 2);
        patched.push_str(&original[..close]);
        patched.push_str(sep);
        patched.push_str(&code);
        patched.push(' ');
        patched.push_str(&original[close..]);
        (SpliceSite::ProgramBlock, patched)
    };

    if cfg!(debug_assertions) {
        let (o1, c1) = brace_counts(original);
        let (o2, c2) = brace_counts(&code);
        debug_assert_eq!(brace_counts(&patched), (o1 + o2, c1 + c2));
    }
    debug!(?site, "spliced synthesized code");
    Ok((site, patched))
}

/// Offset of the closing brace of the innermost body of the first program
/// block, if any.
fn innermost_body_close(text: &str) -> Option<usize> {
    let mut blocks = program_opener().captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        let closer = if &caps[1] == "<" { '>' } else { ']' };
        let open = whole.end() - 1;
        let close = matching_brace(text, open)?;
        let rest = &text[close + 1..];
        let rest = rest.strip_prefix('\\').unwrap_or(rest);
        rest.starts_with(closer).then_some((open, close))
    });

    let (mut open, mut close) = blocks.next()?;
    if blocks.next().is_some() {
        warn!("several program blocks present, splicing into the first");
    }

    // Descend while the body is exactly one nested brace group.
    loop {
        let first = skip_ws(text, open + 1);
        if first >= close || text.as_bytes()[first] != b'{' {
            break;
        }
        match matching_brace(text, first) {
            Some(inner_close) if skip_ws(text, inner_close + 1) == close => {
                open = first;
                close = inner_close;
            }
            _ => break,
        }
    }
    Some(close)
}
