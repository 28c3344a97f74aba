//! Input shrinking for PRE/POST text.
//!
//! KeY output is verbose: well-formedness conjuncts, heap snapshot updates
//! and `u_` prefixes carry no information for the model. They are removed
//! with fixed substitution rules, whitespace is collapsed, and the result is
//! capped so requests stay bounded.

use std::sync::OnceLock;

use regex::Regex;

/// Default cap on each shrunk text field, in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 4000;

const RULES: &[(&str, &str)] = &[
    // heap snapshot update `{heapAtPre:=heap}`
    (r"\{\s*heapAtPre\s*:=\s*heap\s*\}", ""),
    // `self.<created> = TRUE &`
    (r"\b\w+\.<created>\s*=\s*TRUE\s*(?:&&|&|\\and)\s*", ""),
    // leading / trailing well-formedness conjuncts
    (r"\bwellFormed\s*\(\s*\w+\s*\)\s*(?:&&|&|\\and)\s*", ""),
    (r"\s*(?:&&|&|\\and)\s*wellFormed\s*\(\s*\w+\s*\)", ""),
    (r"\bwellFormed\s*\(\s*\w+\s*\)", "true"),
    // prover-internal variable prefix
    (r"\bu_", ""),
    (r"\s+", " "),
];

fn rules() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|(pat, rep)| (Regex::new(pat).expect("valid regex"), *rep))
            .collect()
    })
}

/// Apply the substitution rules, collapse whitespace and cap the length.
pub fn shrink(text: &str, max_chars: usize) -> String {
    let mut out = text.to_string();
    for (re, rep) in rules() {
        out = re.replace_all(&out, *rep).into_owned();
    }
    truncate_chars(out.trim(), max_chars).to_string()
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
