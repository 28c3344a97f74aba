//! cbcsynth core library
//!
//! Fills statement holes in Correctness-by-Construction proof scripts:
//! extract the PRE/POST pair, ask a language model for a Java statement
//! block, splice it back and hand the result to the KeY prover.

pub mod error;
pub mod extract;
pub mod meta;
pub mod pipeline;
pub mod sanitize;
mod scan;
pub mod splice;
pub mod synthesis;
pub mod telemetry;
pub mod timing;
pub mod variables;
pub mod verifier;

pub use error::{BackendError, CbcError, Result};
pub use extract::{extract, extract_file, SpecPair};
pub use meta::{is_statement_file, StatementMeta};
pub use pipeline::{Pipeline, PipelineError, PipelineRun, PipelineTask, Verdict};
pub use sanitize::{prepare_working_copy, sanitize, sanitize_text, HELPER_SCRIPT};
pub use splice::{normalize_code, splice, splice_with_site, SpliceSite, SYNTHESIS_HOLE};
pub use synthesis::backend::{CompletionBackend, OpenAiBackend};
pub use synthesis::{SynthesisClient, SynthesisConfig, SynthesisResult};
pub use timing::{PipelineState, StageClock, TimingRecord};
pub use variables::{JsonModelResolver, StaticResolver, Variable, VariableResolver};
pub use verifier::{find_java, KeyVerifier, Verifier, VerifierReport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
