//! Aggregated outcome of a pipeline run

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use openmcp_common::{Error, Result};

/// Pipeline phase a stage belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Acquire resources
    Setup,
    /// Verify behaviour
    Assess,
    /// Release resources
    Teardown,
    /// Final steps that always run
    Finish,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Setup => "setup",
            Self::Assess => "assess",
            Self::Teardown => "teardown",
            Self::Finish => "finish",
        };
        f.write_str(s)
    }
}

/// Where a pipeline run is, or where it ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started
    Idle,
    /// Running setup stages
    SettingUp,
    /// Running assess stages
    Assessing,
    /// Running teardown and finish stages
    TearingDown,
    /// Every stage passed
    Done,
    /// At least one stage failed
    Failed,
}

/// Result of one stage
#[derive(Clone, Debug, PartialEq)]
pub struct StageOutcome {
    /// Stage name
    pub stage: String,
    /// Phase it ran in
    pub phase: Phase,
    /// Whether it succeeded
    pub passed: bool,
    /// Wall time spent
    pub duration: Duration,
    /// Failure cause
    pub error: Option<String>,
}

/// Outcomes of every stage that ran, in execution order
#[derive(Clone, Debug)]
pub struct PipelineReport {
    /// Pipeline name
    pub suite: String,
    /// Stage outcomes in execution order
    pub outcomes: Vec<StageOutcome>,
    /// Terminal state
    pub state: PipelineState,
    /// Teardown was skipped and resources left in place
    pub kept_resources: bool,
}

impl PipelineReport {
    /// Empty report for `suite`
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            outcomes: Vec::new(),
            state: PipelineState::Idle,
            kept_resources: false,
        }
    }

    /// True when no stage failed
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    /// `phase/stage: cause` for each failed stage
    pub fn failures(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| {
                format!(
                    "{}/{}: {}",
                    o.phase,
                    o.stage,
                    o.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect()
    }

    /// Names of the stages that ran in `phase`, in order
    pub fn stages_in(&self, phase: Phase) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.phase == phase)
            .map(|o| o.stage.as_str())
            .collect()
    }

    /// Log one event per stage followed by the totals.
    ///
    /// Failed stages log at `warn` with their cause, cut to 200 characters.
    pub fn log_summary(&self) {
        for o in &self.outcomes {
            let elapsed = format!("{:.1}s", o.duration.as_secs_f64());
            match &o.error {
                None => info!(suite = %self.suite, phase = %o.phase, stage = %o.stage, %elapsed, "PASS"),
                Some(e) => {
                    let cause: String = e.chars().take(200).collect();
                    warn!(suite = %self.suite, phase = %o.phase, stage = %o.stage, %elapsed, %cause, "FAIL")
                }
            }
        }

        let failed = self.outcomes.iter().filter(|o| !o.passed).count();
        let total: Duration = self.outcomes.iter().map(|o| o.duration).sum();
        info!(
            suite = %self.suite,
            passed = self.outcomes.len() - failed,
            failed,
            total = %format!("{:.1}s", total.as_secs_f64()),
            state = ?self.state,
            "pipeline finished"
        );
        if self.kept_resources {
            warn!(suite = %self.suite, "teardown skipped, clusters were kept");
        }
    }

    /// `Ok` when every stage passed, otherwise [`Error::Pipeline`]
    pub fn into_result(self) -> Result<()> {
        if self.passed() {
            Ok(())
        } else {
            Err(Error::Pipeline {
                failures: self.failures(),
            })
        }
    }
}
