//! cbcsynth - LLM-guided hole filling for CbC proof scripts
//!
//! ## Commands
//!
//! - `run`: extract, synthesize, splice and verify one statement (or every
//!   `Statement<N>.key` in a folder)
//! - `extract`: print the PRE/POST pair of a script
//! - `sanitize`: strip path directives from a script in place
//! - `splice`: insert a code fragment into a script
//! - `meta`: print the statement header metadata of a script

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use cbcsynth_core::{
    extract_file, is_statement_file, sanitize, splice, JsonModelResolver, KeyVerifier, Pipeline,
    PipelineTask, StatementMeta, SynthesisClient, SynthesisConfig,
};

#[derive(Parser)]
#[command(name = "cbcsynth")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fill CbC statement holes with LLM-synthesized code and check them with KeY", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for a statement script
    Run(RunArgs),

    /// Print the PRE/POST pair of a proof script as JSON
    Extract {
        /// Proof script
        script: PathBuf,
    },

    /// Remove \javaSource, \classpath and \bootclasspath lines in place
    Sanitize {
        /// Proof script
        script: PathBuf,
    },

    /// Splice a code fragment into a proof script
    Splice {
        /// Proof script
        script: PathBuf,

        /// File holding the code fragment
        #[arg(short, long)]
        code: PathBuf,

        /// Write the patched script here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the statement header metadata as JSON
    Meta {
        /// Proof script
        script: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Statement script, or a folder of Statement<N>.key scripts
    #[arg(short, long)]
    script: PathBuf,

    /// Model file mapping statement ids to variables
    #[arg(short, long)]
    model: PathBuf,

    /// Root under which per-run working folders are created
    #[arg(long, default_value = ".")]
    work_root: PathBuf,

    /// Run number, part of the working folder name
    #[arg(long, default_value_t = 0)]
    run_number: u32,

    /// Statement id in the model (default: the script's //statementid header).
    /// Only valid for a single script
    #[arg(long)]
    statement_id: Option<String>,

    /// Treat the hole as a loop update; `--loop-update false` overrides a
    /// //isLoopUpdate:{true} header
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    loop_update: Option<bool>,

    /// KeY jar used for verification
    #[arg(long, env = "CBCSYNTH_KEY_JAR", default_value = "key.jar")]
    key_jar: PathBuf,

    /// Verifier timeout in seconds
    #[arg(long, default_value_t = 600)]
    verifier_timeout: u64,

    /// OpenAI-compatible endpoint (default: CBCSYNTH_ENDPOINT or api.openai.com)
    #[arg(long)]
    endpoint: Option<String>,

    /// Primary model
    #[arg(long)]
    primary_model: Option<String>,

    /// Fallback model, called once if the primary fails
    #[arg(long, conflicts_with = "no_fallback")]
    fallback_model: Option<String>,

    /// Never call a fallback model
    #[arg(long)]
    no_fallback: bool,

    /// Per-call synthesis timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl RunArgs {
    fn synthesis_config(&self) -> SynthesisConfig {
        let mut config = SynthesisConfig::from_env();
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.primary_model {
            config.primary_model = model.clone();
        }
        if let Some(model) = &self.fallback_model {
            config.fallback_model = Some(model.clone());
        }
        if self.no_fallback {
            config.fallback_model = None;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        config
    }

    /// Build a task for `script`, filling gaps from its header comments.
    fn task_for(&self, script: &Path) -> Result<PipelineTask> {
        let meta = StatementMeta::from_file(script)
            .with_context(|| format!("Failed to read script header: {:?}", script))?;
        let statement_id = match self.statement_id.clone().or(meta.statement_id) {
            Some(id) => id,
            None => bail!(
                "No statement id for {:?}: pass --statement-id or add a //statementid header",
                script
            ),
        };
        Ok(PipelineTask::new(script, &self.model, statement_id)
            .with_run_number(self.run_number)
            .with_loop_update(self.loop_update.or(meta.is_loop_update).unwrap_or(false)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cbcsynth_core::telemetry::level_for(cli.verbose);
    cbcsynth_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Extract { script } => cmd_extract(&script),
        Commands::Sanitize { script } => cmd_sanitize(&script),
        Commands::Splice {
            script,
            code,
            output,
        } => cmd_splice(&script, &code, output.as_deref()),
        Commands::Meta { script } => cmd_meta(&script),
    }
}

/// Statement scripts under `dir`, sorted by name.
fn statement_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut scripts = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("Failed to list folder: {:?}", dir))?
    {
        let path = entry?.path();
        let is_statement = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(is_statement_file)
            .unwrap_or(false);
        if is_statement && path.is_file() {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}

/// Scripts selected by `--script`: the file itself, or every statement
/// script in the folder.
fn selected_scripts(args: &RunArgs) -> Result<Vec<PathBuf>> {
    if !args.script.is_dir() {
        return Ok(vec![args.script.clone()]);
    }
    if args.statement_id.is_some() {
        bail!(
            "--statement-id cannot be used with a folder: {:?}; each script needs its own //statementid header",
            args.script
        );
    }
    let scripts = statement_scripts(&args.script)?;
    if scripts.is_empty() {
        bail!("No Statement<N>.key scripts in {:?}", args.script);
    }
    Ok(scripts)
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let scripts = selected_scripts(args)?;

    let synthesizer = SynthesisClient::new(args.synthesis_config())
        .context("Failed to build synthesis client")?;
    let verifier = KeyVerifier::locate(&args.key_jar, args.verifier_timeout)
        .context("Failed to locate a java runtime for KeY")?;
    let pipeline = Pipeline::new(
        synthesizer,
        Arc::new(JsonModelResolver::new()),
        Arc::new(verifier),
        &args.work_root,
    );

    let failures = run_scripts(&pipeline, args, &scripts, &mut std::io::stdout()).await?;
    if failures > 0 {
        bail!("{} of {} statements failed", failures, scripts.len());
    }
    Ok(())
}

/// Run every script in turn, writing one verdict line per script to `out`.
///
/// A single script fails the command on any error. With several scripts a
/// failing statement is reported as `ERROR` and the batch goes on; the
/// number of failed statements is returned.
async fn run_scripts(
    pipeline: &Pipeline,
    args: &RunArgs,
    scripts: &[PathBuf],
    out: &mut impl Write,
) -> Result<usize> {
    let single = scripts.len() == 1;
    let mut failures = 0usize;

    for script in scripts {
        let outcome = match args.task_for(script) {
            Ok(task) => pipeline
                .run(&task)
                .await
                .map(|run| (task, run))
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((task, run)) => {
                let verdict = if run.success() { "SUCCESS" } else { "NO-OP" };
                if single {
                    writeln!(out, "{}", verdict)?;
                } else {
                    writeln!(out, "{}\t{}", task.statement, verdict)?;
                }
                info!(working_dir = %run.working_dir.display(), model = %run.synthesis.model, "run finished");
            }
            Err(e) => {
                if single {
                    return Err(e).context(format!("Pipeline failed for {:?}", script));
                }
                warn!(script = %script.display(), error = %e, "statement failed");
                writeln!(out, "{}\tERROR", statement_name(script))?;
                failures += 1;
            }
        }
    }
    Ok(failures)
}

fn statement_name(script: &Path) -> String {
    script
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.display().to_string())
}

fn cmd_extract(script: &Path) -> Result<()> {
    let pair = extract_file(script)
        .with_context(|| format!("Failed to extract PRE/POST from {:?}", script))?;
    println!("{}", serde_json::to_string_pretty(&pair)?);
    Ok(())
}

fn cmd_sanitize(script: &Path) -> Result<()> {
    sanitize(script).with_context(|| format!("Failed to sanitize {:?}", script))?;
    println!("Sanitized {:?}", script);
    Ok(())
}

fn cmd_splice(script: &Path, code: &Path, output: Option<&Path>) -> Result<()> {
    let original = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read script: {:?}", script))?;
    let fragment = std::fs::read_to_string(code)
        .with_context(|| format!("Failed to read code fragment: {:?}", code))?;
    let patched = splice(&original, &fragment)
        .with_context(|| format!("Failed to splice into {:?}", script))?;

    match output {
        Some(path) => {
            std::fs::write(path, &patched)
                .with_context(|| format!("Failed to write patched script to {:?}", path))?;
            println!("Wrote patched script to {:?}", path);
        }
        None => print!("{}", patched),
    }
    Ok(())
}

fn cmd_meta(script: &Path) -> Result<()> {
    let meta = StatementMeta::from_file(script)
        .with_context(|| format!("Failed to read script: {:?}", script))?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}
