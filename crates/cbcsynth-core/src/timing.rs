//! Pipeline states and the per-run stage clock.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Pipeline states, in the only order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Start,
    Setup,
    Extracted,
    VariablesResolved,
    Synthesizing,
    Synthesized,
    Spliced,
    Verified,
    Done,
}

impl PipelineState {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Start => "start",
            PipelineState::Setup => "setup",
            PipelineState::Extracted => "extracted",
            PipelineState::VariablesResolved => "variables-resolved",
            PipelineState::Synthesizing => "synthesizing",
            PipelineState::Synthesized => "synthesized",
            PipelineState::Spliced => "spliced",
            PipelineState::Verified => "verified",
            PipelineState::Done => "done",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Records the instant each state is entered.
#[derive(Debug)]
pub struct StageClock {
    started_at: DateTime<Utc>,
    origin: Instant,
    marks: Vec<(PipelineState, Duration)>,
}

impl Default for StageClock {
    fn default() -> Self {
        Self::start()
    }
}

impl StageClock {
    /// Start the clock in [`PipelineState::Start`].
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            origin: Instant::now(),
            marks: vec![(PipelineState::Start, Duration::ZERO)],
        }
    }

    /// Enter `state`. States must be entered in order.
    pub fn enter(&mut self, state: PipelineState) {
        debug_assert!(
            self.current() < state,
            "state {state} entered after {}",
            self.current()
        );
        self.marks.push((state, self.origin.elapsed()));
    }

    /// Last state entered.
    pub fn current(&self) -> PipelineState {
        self.marks
            .last()
            .map(|(state, _)| *state)
            .unwrap_or(PipelineState::Start)
    }

    pub fn record(&self) -> TimingRecord {
        let offsets_ms: Vec<u64> = self
            .marks
            .iter()
            .map(|(_, at)| at.as_millis() as u64)
            .collect();
        let deltas_ms = offsets_ms.windows(2).map(|w| w[1] - w[0]).collect();
        TimingRecord {
            started_at: self.started_at,
            labels: self.marks.iter().map(|(s, _)| s.label().to_string()).collect(),
            offsets_ms,
            deltas_ms,
        }
    }
}

/// Persisted timing trace of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub started_at: DateTime<Utc>,
    /// Stage labels in the order they were entered.
    pub labels: Vec<String>,
    /// Milliseconds from run start at which each stage was entered.
    pub offsets_ms: Vec<u64>,
    /// Milliseconds between consecutive stages (`labels.len() - 1` entries).
    pub deltas_ms: Vec<u64>,
}

impl TimingRecord {
    /// Write as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
