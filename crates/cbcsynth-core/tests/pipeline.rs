//! End-to-end runs of the pipeline controller against in-memory fakes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cbcsynth_core::pipeline::{CODE_FILE, RUN_FILE, TIMING_FILE};
use cbcsynth_core::{
    sanitize_text, BackendError, CbcError, CompletionBackend, JsonModelResolver, Pipeline,
    PipelineState, PipelineTask, StaticResolver, SynthesisClient, SynthesisConfig, TimingRecord,
    Variable, Verdict, Verifier, VerifierReport, SYNTHESIS_HOLE,
};

const SCRIPT: &str = "//statementid:{0a1b}\n\
\\javaSource \"../src\";\n\
\\programVariables { int x; }\n\
\\pre{ x >= 0 }\n\
\\post{ x >= 1 }\n\
\\problem { x >= 0 -> {heapAtPre:=heap} \\<{ //@SYNTHESIS_HOLE }\\> x >= 1 }\n";

/// Backend answering per model name; `None` is a transport fault.
struct ScriptedBackend {
    answers: HashMap<String, Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(answers: &[(&str, Option<&str>)]) -> Arc<Self> {
        Arc::new(Self {
            answers: answers
                .iter()
                .map(|(m, a)| (m.to_string(), a.map(str::to_string)))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, model: &str, _system: &str, _user: &str) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(model.to_string());
        match self.answers.get(model) {
            Some(Some(body)) => Ok(body.clone()),
            _ => Err(BackendError::Transport("connection refused".to_string())),
        }
    }
}

/// Verifier that exits with a fixed code and remembers what it saw.
struct FixedVerifier {
    exit_code: i32,
    seen: Mutex<Vec<String>>,
}

impl FixedVerifier {
    fn new(exit_code: i32) -> Arc<Self> {
        Arc::new(Self {
            exit_code,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Verifier for FixedVerifier {
    async fn verify(&self, script: &Path, _output_dir: &Path) -> cbcsynth_core::Result<VerifierReport> {
        self.seen
            .lock()
            .unwrap()
            .push(std::fs::read_to_string(script).unwrap());
        Ok(VerifierReport {
            exit_code: Some(self.exit_code),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
            error: None,
        })
    }
}

fn config() -> SynthesisConfig {
    SynthesisConfig {
        primary_model: "primary".to_string(),
        fallback_model: Some("fallback".to_string()),
        timeout_secs: 5,
        ..SynthesisConfig::default()
    }
}

fn counter_vars() -> Vec<Variable> {
    vec![Variable::new("x", true, "int")]
}

fn write_script(dir: &Path, text: &str) -> PathBuf {
    let project = dir.join("project");
    std::fs::create_dir_all(&project).unwrap();
    let script = project.join("Statement1.key");
    std::fs::write(&script, text).unwrap();
    script
}

fn pipeline(
    backend: Arc<ScriptedBackend>,
    verifier: Arc<FixedVerifier>,
    work_root: &Path,
) -> Pipeline {
    Pipeline::new(
        SynthesisClient::with_backend(config(), backend),
        Arc::new(StaticResolver::new(counter_vars())),
        verifier,
        work_root,
    )
}

fn read_timing(dir: &Path) -> TimingRecord {
    let raw = std::fs::read_to_string(dir.join(TIMING_FILE)).expect("timing record written");
    serde_json::from_str(&raw).expect("timing record parses")
}

#[tokio::test]
async fn marker_run_patches_only_the_hole() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), SCRIPT);
    let backend = ScriptedBackend::new(&[("primary", Some(r#"{"java": "x = x + 1;"}"#))]);
    let verifier = FixedVerifier::new(0);
    let work_root = tmp.path().join("work");

    let task = PipelineTask::new(&script, "unused.json", "0a1b");
    let run = pipeline(backend.clone(), verifier.clone(), &work_root)
        .run(&task)
        .await
        .expect("run reaches done");

    assert!(run.success());
    assert_eq!(run.verdict(), Verdict::Accepted);
    assert_eq!(run.synthesis.model, "primary");
    assert_eq!(backend.calls(), vec!["primary"]);
    assert_eq!(run.spec.pre, "x >= 0");
    assert_eq!(run.spec.post, "x >= 1");

    let expected = sanitize_text(SCRIPT).replacen(SYNTHESIS_HOLE, "x = x + 1;", 1);
    let patched = std::fs::read_to_string(&run.patched_script).unwrap();
    assert_eq!(patched, expected);
    assert!(!patched.contains("\\javaSource"));
    assert_eq!(verifier.seen.lock().unwrap().as_slice(), &[expected]);

    let dir = work_root.join("temp_Statement1_0");
    assert_eq!(run.working_dir, dir);
    assert_eq!(run.patched_script, dir.join("Statement1_patched.key"));
    assert_eq!(
        std::fs::read_to_string(dir.join(CODE_FILE)).unwrap(),
        "x = x + 1;"
    );
    assert!(dir.join(RUN_FILE).is_file());

    // Source script untouched.
    assert_eq!(std::fs::read_to_string(&script).unwrap(), SCRIPT);

    let timing = read_timing(&dir);
    assert_eq!(
        timing.labels,
        vec![
            "start",
            "setup",
            "extracted",
            "variables-resolved",
            "synthesizing",
            "synthesized",
            "spliced",
            "verified",
            "done"
        ]
    );
    assert_eq!(timing.deltas_ms.len(), timing.labels.len() - 1);
}

#[tokio::test]
async fn program_block_run_keeps_trailing_brace() {
    let tmp = tempfile::tempdir().unwrap();
    let text = "\\problem { n >= 0 -> {i:=0} \\<{ { i = 0; } }\\> i = n }\n";
    let script = write_script(tmp.path(), text);
    let backend = ScriptedBackend::new(&[(
        "primary",
        Some("```java\nwhile (i < n) { i++; }\n```"),
    )]);
    let work_root = tmp.path().join("work");

    let task = PipelineTask::new(&script, "m.json", "id").with_run_number(3);
    let run = pipeline(backend, FixedVerifier::new(0), &work_root)
        .run(&task)
        .await
        .unwrap();

    let patched = std::fs::read_to_string(&run.patched_script).unwrap();
    assert!(patched.contains("{ i = 0; while (i < n) { i++; } }"));
    assert!(patched.ends_with("}\\> i = n }\n"));
    assert_eq!(run.working_dir, work_root.join("temp_Statement1_3"));
}

#[tokio::test]
async fn primary_fault_falls_back_once() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), SCRIPT);
    let backend = ScriptedBackend::new(&[
        ("primary", None),
        ("fallback", Some(r#"{"java": "x = 1;"}"#)),
    ]);
    let work_root = tmp.path().join("work");

    let run = pipeline(backend.clone(), FixedVerifier::new(0), &work_root)
        .run(&PipelineTask::new(&script, "m.json", "id"))
        .await
        .unwrap();

    assert_eq!(backend.calls(), vec!["primary", "fallback"]);
    assert_eq!(run.synthesis.model, "fallback");
    assert_eq!(run.synthesis.attempts, 2);
    assert_eq!(run.synthesis.code, "x = 1;");
}

#[tokio::test]
async fn both_models_failing_aborts_before_writing_code() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), SCRIPT);
    let backend = ScriptedBackend::new(&[("primary", None), ("fallback", Some("{}"))]);
    let verifier = FixedVerifier::new(0);
    let work_root = tmp.path().join("work");

    let err = pipeline(backend.clone(), verifier.clone(), &work_root)
        .run(&PipelineTask::new(&script, "m.json", "id"))
        .await
        .unwrap_err();

    assert!(matches!(err.source, CbcError::SynthesisFailed(_)));
    assert_eq!(err.state, PipelineState::Synthesizing);
    assert_eq!(backend.calls().len(), 2);
    assert!(verifier.seen.lock().unwrap().is_empty());

    let dir = work_root.join("temp_Statement1_0");
    assert_eq!(err.working_dir, dir);
    assert!(!dir.join(CODE_FILE).exists());
    assert!(!dir.join("Statement1_patched.key").exists());
    assert!(!dir.join(RUN_FILE).exists());
    assert_eq!(read_timing(&dir).labels.last().unwrap(), "synthesizing");
}

#[tokio::test]
async fn verifier_rejection_is_an_outcome_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), SCRIPT);
    let backend = ScriptedBackend::new(&[("primary", Some(r#"{"java": "x = x - 1;"}"#))]);
    let work_root = tmp.path().join("work");

    let run = pipeline(backend, FixedVerifier::new(1), &work_root)
        .run(&PipelineTask::new(&script, "m.json", "id"))
        .await
        .expect("rejection still reaches done");

    assert!(!run.success());
    assert_eq!(
        run.verdict(),
        Verdict::Rejected {
            exit_code: Some(1),
            error: None
        }
    );
    assert_eq!(run.timing.labels.last().unwrap(), "done");
}

#[tokio::test]
async fn missing_spec_aborts_in_setup() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "\\programVariables { int x; }\n");
    let backend = ScriptedBackend::new(&[]);
    let work_root = tmp.path().join("work");

    let err = pipeline(backend.clone(), FixedVerifier::new(0), &work_root)
        .run(&PipelineTask::new(&script, "m.json", "id"))
        .await
        .unwrap_err();

    assert!(matches!(err.source, CbcError::SpecNotFound { .. }));
    assert_eq!(err.state, PipelineState::Setup);
    assert!(backend.calls().is_empty());
    // Working folder is kept for inspection.
    assert!(err.working_dir.join("Statement1.key").is_file());
}

#[tokio::test]
async fn missing_splice_site_aborts_after_synthesis() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "\\pre{ x >= 0 }\n\\post{ x >= 1 }\n");
    let backend = ScriptedBackend::new(&[("primary", Some(r#"{"java": "x = 1;"}"#))]);
    let work_root = tmp.path().join("work");

    let err = pipeline(backend, FixedVerifier::new(0), &work_root)
        .run(&PipelineTask::new(&script, "m.json", "id"))
        .await
        .unwrap_err();

    assert!(matches!(err.source, CbcError::SpliceLocationNotFound));
    assert_eq!(err.state, PipelineState::Synthesized);
    assert!(err.working_dir.join(CODE_FILE).is_file());
}

#[tokio::test]
async fn missing_script_aborts_in_start() {
    let tmp = tempfile::tempdir().unwrap();
    let work_root = tmp.path().join("work");

    let err = pipeline(ScriptedBackend::new(&[]), FixedVerifier::new(0), &work_root)
        .run(&PipelineTask::new(tmp.path().join("Statement9.key"), "m.json", "id"))
        .await
        .unwrap_err();

    assert!(matches!(err.source, CbcError::MissingCollaboratorFile { .. }));
    assert_eq!(err.state, PipelineState::Start);
}

#[tokio::test]
async fn json_model_resolver_feeds_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), SCRIPT);
    let model = tmp.path().join("model.json");
    std::fs::write(
        &model,
        r#"{"0a1b": [{"name": "x", "modifiable": true, "type": "int"}]}"#,
    )
    .unwrap();
    let backend = ScriptedBackend::new(&[("primary", Some(r#"{"java": "x = x + 1;"}"#))]);
    let work_root = tmp.path().join("work");

    let pipeline = Pipeline::new(
        SynthesisClient::with_backend(config(), backend),
        Arc::new(JsonModelResolver::new()),
        FixedVerifier::new(0),
        &work_root,
    );

    assert!(pipeline
        .run(&PipelineTask::new(&script, &model, "0a1b"))
        .await
        .unwrap()
        .success());

    let err = pipeline
        .run(&PipelineTask::new(&script, &model, "ffff").with_run_number(1))
        .await
        .unwrap_err();
    assert!(matches!(err.source, CbcError::UnknownStatement { .. }));
    assert_eq!(err.state, PipelineState::Extracted);
}

#[tokio::test]
async fn helper_script_is_copied_and_sanitized() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), SCRIPT);
    std::fs::write(
        script.parent().unwrap().join("helper.key"),
        "\\classpath \"lib\";\n\\functions { int f; }\n",
    )
    .unwrap();
    let backend = ScriptedBackend::new(&[("primary", Some(r#"{"java": "x = 1;"}"#))]);
    let work_root = tmp.path().join("work");

    let run = pipeline(backend, FixedVerifier::new(0), &work_root)
        .run(&PipelineTask::new(&script, "m.json", "id"))
        .await
        .unwrap();

    let helper = std::fs::read_to_string(run.working_dir.join("helper.key")).unwrap();
    assert_eq!(helper, "\\functions { int f; }\n");
}
