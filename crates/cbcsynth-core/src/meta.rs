//! Statement metadata carried in proof-script header comments:
//!
//! ```text
//! //statementid:{1f6c2a9e-...}
//! //isLoopUpdate:{true}
//! //mutable:{i, wt}
//! ```

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementMeta {
    pub statement_id: Option<String>,
    pub is_loop_update: Option<bool>,
    pub mutable: Vec<String>,
}

fn statement_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"//statementid:\{([0-9a-fA-F-]+)\}").expect("valid regex"))
}

fn loop_update_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"//isLoopUpdate:\{(true|false)\}").expect("valid regex"))
}

fn mutable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"//mutable:\s*\{([^}]*)\}").expect("valid regex"))
}

fn statement_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Statement\d+\.key$").expect("valid regex"))
}

impl StatementMeta {
    pub fn from_script(text: &str) -> Self {
        Self {
            statement_id: statement_id_re()
                .captures(text)
                .map(|c| c[1].to_string()),
            is_loop_update: loop_update_re().captures(text).map(|c| &c[1] == "true"),
            mutable: mutable_re()
                .captures(text)
                .map(|c| {
                    c[1].split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::from_script(&std::fs::read_to_string(path)?))
    }
}

/// Whether `file_name` looks like a statement script (`Statement<N>.key`).
pub fn is_statement_file(file_name: &str) -> bool {
    statement_file_re().is_match(file_name)
}
