//! Staged setup, assess and teardown orchestration
//!
//! A [`Pipeline`] runs its stages one at a time against a shared context:
//!
//! 1. Setup stages in registration order. The first failure skips the rest
//!    of setup and every assess stage.
//! 2. Assess stages in registration order. Every assess stage runs; failures
//!    are recorded.
//! 3. Teardown, which always runs and never stops early:
//!    - the paired teardowns of every setup stage that was started,
//!      newest first;
//!    - explicit teardown stages in registration order;
//!    - finish stages in registration order.
//!
//! Stages are never retried. Waiting belongs inside a stage.

use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{info, warn};

use openmcp_common::Result;

use crate::report::{Phase, PipelineReport, PipelineState, StageOutcome};

/// One named step of a pipeline
#[async_trait]
pub trait Stage<C: Sync>: Send + Sync {
    /// Name shown in logs and reports
    fn name(&self) -> &str;

    /// Execute against the shared context
    async fn run(&self, ctx: &C) -> Result<()>;
}

/// A [`Stage`] built from a closure
pub struct FnStage<C, F> {
    name: String,
    f: F,
    _ctx: PhantomData<fn(&C)>,
}

impl<C, F> FnStage<C, F>
where
    F: for<'a> Fn(&'a C) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    /// Stage `name` running `f`
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _ctx: PhantomData,
        }
    }
}

#[async_trait]
impl<C, F> Stage<C> for FnStage<C, F>
where
    C: Sync,
    F: for<'a> Fn(&'a C) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &C) -> Result<()> {
        (self.f)(ctx).await
    }
}

struct SetupStage<C> {
    stage: Box<dyn Stage<C>>,
    teardown: Option<Box<dyn Stage<C>>>,
}

/// Ordered setup, assess, teardown and finish stages over a context `C`
pub struct Pipeline<C> {
    name: String,
    setup: Vec<SetupStage<C>>,
    assess: Vec<Box<dyn Stage<C>>>,
    teardown: Vec<Box<dyn Stage<C>>>,
    finish: Vec<Box<dyn Stage<C>>>,
    keep_resources: bool,
}

impl<C: Sync> Pipeline<C> {
    /// Empty pipeline
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: Vec::new(),
            assess: Vec::new(),
            teardown: Vec::new(),
            finish: Vec::new(),
            keep_resources: false,
        }
    }

    /// Pipeline name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a setup stage
    pub fn setup(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.setup.push(SetupStage {
            stage: Box::new(stage),
            teardown: None,
        });
        self
    }

    /// Append a setup stage whose `teardown` runs once it has been started,
    /// even if it failed
    pub fn setup_with_teardown(
        mut self,
        stage: impl Stage<C> + 'static,
        teardown: impl Stage<C> + 'static,
    ) -> Self {
        self.setup.push(SetupStage {
            stage: Box::new(stage),
            teardown: Some(Box::new(teardown)),
        });
        self
    }

    /// Append an assess stage
    pub fn assess(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.assess.push(Box::new(stage));
        self
    }

    /// Append a teardown stage
    pub fn teardown(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.teardown.push(Box::new(stage));
        self
    }

    /// Append a finish stage
    pub fn finish(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.finish.push(Box::new(stage));
        self
    }

    /// Skip teardown and finish stages, leaving resources in place
    pub fn keep_resources(mut self, keep: bool) -> Self {
        self.keep_resources = keep;
        self
    }

    /// Names of the registered stages of `phase`; paired teardowns are
    /// listed under [`Phase::Teardown`] in the order they would run
    pub fn stage_names(&self, phase: Phase) -> Vec<&str> {
        match phase {
            Phase::Setup => self.setup.iter().map(|s| s.stage.name()).collect(),
            Phase::Assess => self.assess.iter().map(|s| s.name()).collect(),
            Phase::Teardown => self
                .setup
                .iter()
                .rev()
                .filter_map(|s| s.teardown.as_deref())
                .chain(self.teardown.iter().map(|s| s.as_ref()))
                .map(|s| s.name())
                .collect(),
            Phase::Finish => self.finish.iter().map(|s| s.name()).collect(),
        }
    }

    /// Run every stage and report the outcome
    pub async fn execute(&self, ctx: &C) -> PipelineReport {
        let mut report = PipelineReport::new(&self.name);
        let mut failed = false;

        report.state = PipelineState::SettingUp;
        info!(pipeline = %self.name, stages = self.setup.len(), "setting up");
        let mut started = 0;
        for entry in &self.setup {
            started += 1;
            if !run_stage(entry.stage.as_ref(), Phase::Setup, ctx, &mut report).await {
                failed = true;
                break;
            }
        }

        if failed {
            warn!(pipeline = %self.name, "setup failed, skipping assess");
        } else {
            report.state = PipelineState::Assessing;
            info!(pipeline = %self.name, stages = self.assess.len(), "assessing");
            for stage in &self.assess {
                if !run_stage(stage.as_ref(), Phase::Assess, ctx, &mut report).await {
                    failed = true;
                }
            }
        }

        if self.keep_resources {
            warn!(pipeline = %self.name, "keeping resources, teardown skipped");
            report.kept_resources = true;
        } else {
            report.state = PipelineState::TearingDown;
            info!(pipeline = %self.name, "tearing down");
            let paired = self.setup[..started]
                .iter()
                .rev()
                .filter_map(|s| s.teardown.as_deref());
            for stage in paired.chain(self.teardown.iter().map(|s| s.as_ref())) {
                run_stage(stage, Phase::Teardown, ctx, &mut report).await;
            }
            for stage in &self.finish {
                run_stage(stage.as_ref(), Phase::Finish, ctx, &mut report).await;
            }
        }

        report.state = if failed || !report.passed() {
            PipelineState::Failed
        } else {
            PipelineState::Done
        };
        report
    }
}

/// Run one stage, recording its outcome; panics count as failures
async fn run_stage<C: Sync>(
    stage: &dyn Stage<C>,
    phase: Phase,
    ctx: &C,
    report: &mut PipelineReport,
) -> bool {
    let name = stage.name();
    info!(stage = %name, %phase, "stage started");
    let start = Instant::now();
    let result = AssertUnwindSafe(stage.run(ctx)).catch_unwind().await;
    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(format!("stage panicked: {}", panic_message(payload.as_ref()))),
    };
    let duration = start.elapsed();

    match &error {
        None => info!(stage = %name, %phase, elapsed = ?duration, "stage passed"),
        Some(e) if matches!(phase, Phase::Teardown | Phase::Finish) => {
            warn!(stage = %name, %phase, error = %e, "cleanup stage failed, continuing")
        }
        Some(e) => warn!(stage = %name, %phase, error = %e, "stage failed"),
    }

    let passed = error.is_none();
    report.outcomes.push(StageOutcome {
        stage: name.to_string(),
        phase,
        passed,
        duration,
        error,
    });
    passed
}

/// Text of a `panic!` payload; formatted panics carry a `String`, literal
/// ones a `&'static str`
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(literal) = payload.downcast_ref::<&'static str>() {
        *literal
    } else if let Some(formatted) = payload.downcast_ref::<String>() {
        formatted.as_str()
    } else {
        "non-string panic payload"
    }
}

/// A nested pipeline runs as a single stage that fails when any inner stage
/// fails
#[async_trait]
impl<C: Sync> Stage<C> for Pipeline<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &C) -> Result<()> {
        let report = self.execute(ctx).await;
        report.log_summary();
        report.into_result()
    }
}
