//! Pipeline controller: one statement, one working folder, strictly
//! sequential stages.
//!
//! ```text
//! start -> setup -> extracted -> variables-resolved -> synthesizing
//!       -> synthesized -> spliced -> verified -> done
//! ```
//!
//! A failing stage aborts the run where it stands. Files already written to
//! the working folder stay there for inspection, together with the timing
//! record up to the failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{CbcError, Result};
use crate::extract::{extract_named, SpecPair};
use crate::sanitize::prepare_working_copy;
use crate::splice::{splice_with_site, SpliceSite};
use crate::synthesis::{SynthesisClient, SynthesisResult};
use crate::timing::{PipelineState, StageClock, TimingRecord};
use crate::variables::VariableResolver;
use crate::verifier::{Verifier, VerifierReport};

/// Synthesized code, verbatim.
pub const CODE_FILE: &str = "synthesized_code.txt";
/// Stage timing trace.
pub const TIMING_FILE: &str = "times.json";
/// Full run record.
pub const RUN_FILE: &str = "run.json";

/// One statement hole to fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTask {
    /// Source proof script. Never modified.
    pub script: PathBuf,
    /// Statement name, e.g. `Statement3`. Names the working folder.
    pub statement: String,
    /// Distinguishes repeated attempts at the same statement.
    pub run_number: u32,
    /// Model file handed to the variable resolver.
    pub model_path: PathBuf,
    /// Statement id inside the model.
    pub statement_id: String,
    pub loop_update: bool,
}

impl PipelineTask {
    /// Task named after the script's file stem.
    pub fn new(
        script: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        statement_id: impl Into<String>,
    ) -> Self {
        let script = script.into();
        let statement = script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "statement".to_string());
        Self {
            script,
            statement,
            run_number: 0,
            model_path: model_path.into(),
            statement_id: statement_id.into(),
            loop_update: false,
        }
    }

    pub fn with_run_number(mut self, run_number: u32) -> Self {
        self.run_number = run_number;
        self
    }

    pub fn with_loop_update(mut self, loop_update: bool) -> Self {
        self.loop_update = loop_update;
        self
    }

    /// `<root>/temp_<statement>_<run>`: unique per (statement, run number).
    pub fn working_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("temp_{}_{}", self.statement, self.run_number))
    }

    /// Name of the patched script inside the working folder.
    pub fn patched_file_name(&self) -> String {
        format!("{}_patched.key", self.statement)
    }
}

/// Final outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Verdict {
    /// The verifier closed every goal.
    Accepted,
    /// The verifier exited non-zero or could not be run.
    Rejected {
        exit_code: Option<i32>,
        error: Option<String>,
    },
}

/// Record of a run that reached `done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub working_dir: PathBuf,
    pub spec: SpecPair,
    pub synthesis: SynthesisResult,
    pub splice_site: SpliceSite,
    pub patched_script: PathBuf,
    /// SHA-256 of the synthesized code.
    pub code_digest: String,
    /// SHA-256 of the patched script.
    pub patched_digest: String,
    pub verifier: VerifierReport,
    pub timing: TimingRecord,
}

impl PipelineRun {
    pub fn success(&self) -> bool {
        self.verifier.accepted()
    }

    pub fn verdict(&self) -> Verdict {
        if self.success() {
            Verdict::Accepted
        } else {
            Verdict::Rejected {
                exit_code: self.verifier.exit_code,
                error: self.verifier.error.clone(),
            }
        }
    }
}

/// A run that aborted before `done`.
#[derive(Debug, thiserror::Error)]
#[error("run {run_id} aborted in state {state}: {source}")]
pub struct PipelineError {
    pub run_id: Uuid,
    /// Last state reached.
    pub state: PipelineState,
    pub working_dir: PathBuf,
    #[source]
    pub source: CbcError,
}

struct StageOutputs {
    spec: SpecPair,
    synthesis: SynthesisResult,
    splice_site: SpliceSite,
    patched_script: PathBuf,
    patched_digest: String,
    verifier: VerifierReport,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Pipeline controller.
///
/// Runs share nothing but the filesystem namespace under `work_root`; the
/// working folder of each run is unique per (statement, run number).
#[derive(Clone)]
pub struct Pipeline {
    synthesizer: SynthesisClient,
    resolver: Arc<dyn VariableResolver>,
    verifier: Arc<dyn Verifier>,
    work_root: PathBuf,
}

impl Pipeline {
    pub fn new(
        synthesizer: SynthesisClient,
        resolver: Arc<dyn VariableResolver>,
        verifier: Arc<dyn Verifier>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            synthesizer,
            resolver,
            verifier,
            work_root: work_root.into(),
        }
    }

    /// Execute every stage for `task`.
    ///
    /// `Ok` means the run reached `done`; check [`PipelineRun::success`] for
    /// the verifier's verdict.
    pub async fn run(
        &self,
        task: &PipelineTask,
    ) -> std::result::Result<PipelineRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "pipeline_run",
            run_id = %run_id,
            statement = %task.statement,
            run_number = task.run_number
        );
        self.run_inner(run_id, task).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        task: &PipelineTask,
    ) -> std::result::Result<PipelineRun, PipelineError> {
        let working_dir = task.working_dir(&self.work_root);
        let mut clock = StageClock::start();
        info!(working_dir = %working_dir.display(), "starting pipeline run");

        let outcome = self.run_stages(task, &working_dir, &mut clock).await;
        let timing = clock.record();
        if working_dir.is_dir() {
            if let Err(e) = timing.write_json(&working_dir.join(TIMING_FILE)) {
                warn!(error = %e, "failed to write timing record");
            }
        }

        let out = match outcome {
            Ok(out) => out,
            Err(source) => {
                let state = clock.current();
                error!(%state, error = %source, "pipeline run aborted");
                return Err(PipelineError {
                    run_id,
                    state,
                    working_dir,
                    source,
                });
            }
        };

        let run = PipelineRun {
            run_id,
            working_dir,
            code_digest: sha256_hex(out.synthesis.code.as_bytes()),
            spec: out.spec,
            synthesis: out.synthesis,
            splice_site: out.splice_site,
            patched_script: out.patched_script,
            patched_digest: out.patched_digest,
            verifier: out.verifier,
            timing,
        };
        match serde_json::to_string_pretty(&run) {
            Ok(json) => {
                if let Err(e) = std::fs::write(run.working_dir.join(RUN_FILE), json) {
                    warn!(error = %e, "failed to write run record");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize run record"),
        }

        info!(success = run.success(), "pipeline run done");
        Ok(run)
    }

    async fn run_stages(
        &self,
        task: &PipelineTask,
        working_dir: &Path,
        clock: &mut StageClock,
    ) -> Result<StageOutputs> {
        let working_copy = prepare_working_copy(&task.script, working_dir)?;
        clock.enter(PipelineState::Setup);

        let text = std::fs::read_to_string(&working_copy)?;
        let spec = extract_named(&text, &working_copy.display().to_string())?;
        clock.enter(PipelineState::Extracted);

        let variables = self.resolver.resolve(&task.model_path, &task.statement_id)?;
        clock.enter(PipelineState::VariablesResolved);

        clock.enter(PipelineState::Synthesizing);
        let synthesis = self
            .synthesizer
            .synthesize(&variables, &spec.pre, &spec.post, task.loop_update)
            .await?;
        clock.enter(PipelineState::Synthesized);
        std::fs::write(working_dir.join(CODE_FILE), &synthesis.code)?;

        let (splice_site, patched) = splice_with_site(&text, &synthesis.code)?;
        let patched_script = working_dir.join(task.patched_file_name());
        std::fs::write(&patched_script, &patched)?;
        clock.enter(PipelineState::Spliced);

        let verifier = self.verifier.verify(&patched_script, working_dir).await?;
        clock.enter(PipelineState::Verified);
        if !verifier.accepted() {
            info!(exit_code = ?verifier.exit_code, "verifier rejected the patch");
        }
        clock.enter(PipelineState::Done);

        Ok(StageOutputs {
            spec,
            synthesis,
            splice_site,
            patched_script,
            patched_digest: sha256_hex(patched.as_bytes()),
            verifier,
        })
    }
}
