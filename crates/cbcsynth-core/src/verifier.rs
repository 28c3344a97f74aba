//! External verifier invocation.
//!
//! The verifier is a boundary: only its exit status matters. Exit code 0
//! means no open goals. Any other code, a spawn failure or a timeout is a
//! rejection, never a crash of the pipeline.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{CbcError, Result};

/// Outcome of one verifier invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierReport {
    /// Exit code, `None` if the process never exited normally.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Spawn or timeout failure.
    pub error: Option<String>,
}

impl VerifierReport {
    /// Whether the verifier closed every goal.
    pub fn accepted(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }

    fn failed(error: String, duration_ms: u64) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms,
            error: Some(error),
        }
    }
}

/// Checks a patched proof script.
///
/// `Err` is reserved for missing collaborator files detected before the
/// verifier runs; everything after that is reported in [`VerifierReport`].
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, script: &Path, output_dir: &Path) -> Result<VerifierReport>;
}

/// Runs the KeY prover in auto mode:
/// `java -jar <key.jar> --auto --openGoalsSmtPath <out> <script>`.
#[derive(Debug, Clone)]
pub struct KeyVerifier {
    java: PathBuf,
    jar: PathBuf,
    timeout_secs: u64,
}

impl KeyVerifier {
    /// Locate java (see [`find_java`]) and use it to run `jar`.
    pub fn locate(jar: impl Into<PathBuf>, timeout_secs: u64) -> Result<Self> {
        let java = find_java().ok_or_else(|| CbcError::MissingCollaboratorFile {
            path: PathBuf::from("java"),
        })?;
        Ok(Self::with_java(java, jar, timeout_secs))
    }

    pub fn with_java(java: impl Into<PathBuf>, jar: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            java: java.into(),
            jar: jar.into(),
            timeout_secs,
        }
    }

    fn command_line(&self, script: &Path, output_dir: &Path) -> Vec<String> {
        vec![
            self.java.to_string_lossy().into_owned(),
            "-jar".to_string(),
            self.jar.to_string_lossy().into_owned(),
            "--auto".to_string(),
            "--openGoalsSmtPath".to_string(),
            output_dir.to_string_lossy().into_owned(),
            script.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl Verifier for KeyVerifier {
    async fn verify(&self, script: &Path, output_dir: &Path) -> Result<VerifierReport> {
        for required in [self.jar.as_path(), script] {
            if !required.is_file() {
                return Err(CbcError::MissingCollaboratorFile {
                    path: required.to_path_buf(),
                });
            }
        }
        std::fs::create_dir_all(output_dir)?;

        let argv = self.command_line(script, output_dir);
        info!(command = %argv.join(" "), "running verifier");
        let start = Instant::now();

        let child = match Command::new(&argv[0])
            .args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "verifier failed to start");
                return Ok(VerifierReport::failed(
                    format!("spawn {}: {e}", argv[0]),
                    start.elapsed().as_millis() as u64,
                ));
            }
        };

        let waited = if self.timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(out) => out,
                Err(_) => {
                    warn!(timeout_secs = self.timeout_secs, "verifier timed out");
                    return Ok(VerifierReport::failed(
                        format!("timed out after {} seconds", self.timeout_secs),
                        start.elapsed().as_millis() as u64,
                    ));
                }
            }
        } else {
            child.wait_with_output().await
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let output = match waited {
            Ok(output) => output,
            Err(e) => return Ok(VerifierReport::failed(format!("wait: {e}"), duration_ms)),
        };

        let report = VerifierReport {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            error: None,
        };
        debug!(stdout = %report.stdout, stderr = %report.stderr, "verifier output");
        info!(exit_code = ?report.exit_code, duration_ms, "verifier finished");
        Ok(report)
    }
}

/// Find a java executable: `$JAVA`, then `$JAVA_HOME/bin/java`, then `PATH`.
pub fn find_java() -> Option<PathBuf> {
    let exe = format!("java{}", std::env::consts::EXE_SUFFIX);

    if let Some(java) = std::env::var_os("JAVA").map(PathBuf::from) {
        if java.is_file() {
            return Some(java);
        }
    }
    if let Some(home) = std::env::var_os("JAVA_HOME") {
        let candidate = PathBuf::from(home).join("bin").join(&exe);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(&exe))
            .find(|candidate| candidate.is_file())
    })
}
