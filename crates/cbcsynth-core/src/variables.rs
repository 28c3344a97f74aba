//! Typed program variables of a statement, supplied by an external model.
//!
//! The resolver is a boundary: the core never re-derives variables from the
//! proof script, it only asks a [`VariableResolver`] for the ordered list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CbcError, Result};

/// A program variable visible to the synthesized code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub modifiable: bool,
    #[serde(rename = "type")]
    pub ty: String,
}

impl Variable {
    pub fn new(name: impl Into<String>, modifiable: bool, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifiable,
            ty: ty.into(),
        }
    }
}

/// Looks up the ordered variable list for a statement id.
pub trait VariableResolver: Send + Sync {
    fn resolve(&self, model_path: &Path, statement_id: &str) -> Result<Vec<Variable>>;
}

/// Resolver backed by a JSON model file of the form
/// `{ "<statement id>": [ {"name": .., "modifiable": .., "type": ..}, .. ] }`.
#[derive(Debug, Default, Clone)]
pub struct JsonModelResolver;

impl JsonModelResolver {
    pub fn new() -> Self {
        Self
    }
}

impl VariableResolver for JsonModelResolver {
    fn resolve(&self, model_path: &Path, statement_id: &str) -> Result<Vec<Variable>> {
        if !model_path.is_file() {
            return Err(CbcError::MissingCollaboratorFile {
                path: model_path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(model_path)?;
        let mut model: BTreeMap<String, Vec<Variable>> = serde_json::from_str(&raw)?;
        let vars = model
            .remove(statement_id)
            .ok_or_else(|| CbcError::UnknownStatement {
                id: statement_id.to_string(),
                model: model_path.to_path_buf(),
            })?;
        debug!(statement_id, count = vars.len(), "resolved variables");
        Ok(vars)
    }
}

/// Resolver that returns a fixed list regardless of the model path.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    statement_id: Option<String>,
    variables: Vec<Variable>,
}

impl StaticResolver {
    /// Answer every statement id with `variables`.
    pub fn new(variables: Vec<Variable>) -> Self {
        Self {
            statement_id: None,
            variables,
        }
    }

    /// Only answer for `statement_id`; any other id is unknown.
    pub fn for_statement(statement_id: impl Into<String>, variables: Vec<Variable>) -> Self {
        Self {
            statement_id: Some(statement_id.into()),
            variables,
        }
    }
}

impl VariableResolver for StaticResolver {
    fn resolve(&self, model_path: &Path, statement_id: &str) -> Result<Vec<Variable>> {
        match &self.statement_id {
            Some(id) if id != statement_id => Err(CbcError::UnknownStatement {
                id: statement_id.to_string(),
                model: PathBuf::from(model_path),
            }),
            _ => Ok(self.variables.clone()),
        }
    }
}
