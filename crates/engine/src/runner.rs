//! Scenario runner that plans, launches, drives and tears down a target

use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use tuimuppet_common::defaults;
use tuimuppet_common::index::build_sequence_index;
use tuimuppet_common::{
    Error, MacroFile, Matcher, Result, RunReport, RunStatus, Scenario, Sequence, SequenceResult,
    Step,
};

use crate::artifacts::CaptureWriter;
use crate::backend::Backend;
use crate::interpreter::Interpreter;
use crate::macros::{expand, merge_macros};
use crate::matcher::{self, CompiledMatcher, Surface};
use crate::report;
use crate::timing::Timing;

/// A sequence with its macros expanded
#[derive(Debug, Clone)]
pub struct PlannedSequence {
    pub name: String,
    /// Compiled when the sequence starts; a bad pattern fails only this sequence
    pub ensure: Option<Matcher>,
    pub steps: Vec<Step>,
}

/// Everything resolved before a process is launched
#[derive(Debug, Clone)]
pub struct RunPlan {
    scenario: Scenario,
    ready: Option<CompiledMatcher>,
    sequences: Vec<PlannedSequence>,
}

impl RunPlan {
    /// Merge macros, index sequences, resolve the order and expand steps.
    /// Any error here aborts the run before launch.
    pub fn build(
        scenario: Scenario,
        sequences: Vec<Sequence>,
        macro_files: &[MacroFile],
    ) -> Result<Self> {
        Self::build_selected(scenario, sequences, macro_files, None)
    }

    /// Like [`RunPlan::build`], but when `selected` is set the order becomes
    /// just that sequence. It may be any loaded sequence, listed in the
    /// scenario's order or not.
    pub fn build_selected(
        mut scenario: Scenario,
        sequences: Vec<Sequence>,
        macro_files: &[MacroFile],
        selected: Option<&str>,
    ) -> Result<Self> {
        let library = merge_macros(macro_files)?;
        let index = build_sequence_index(sequences)?;

        if let Some(name) = selected {
            if !index.contains_key(name) {
                return Err(Error::SequenceReference(name.to_string()));
            }
            debug!("Running only sequence {}", name);
            scenario.sequence_order = vec![name.to_string()];
        }
        scenario.validate()?;

        let ordered = scenario
            .sequence_order
            .iter()
            .map(|name| {
                index
                    .get(name)
                    .ok_or_else(|| Error::SequenceReference(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let sequences = ordered
            .into_iter()
            .map(|sequence| -> Result<PlannedSequence> {
                Ok(PlannedSequence {
                    name: sequence.name.clone(),
                    ensure: sequence.ensure.clone(),
                    steps: expand(&sequence.steps, &library)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let ready = scenario
            .launch
            .ready_matcher
            .as_ref()
            .map(CompiledMatcher::compile)
            .transpose()?;

        debug!(
            "Planned {} sequence(s) for scenario {}",
            sequences.len(),
            scenario.name
        );
        Ok(Self {
            scenario,
            ready,
            sequences,
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn sequences(&self) -> &[PlannedSequence] {
        &self.sequences
    }
}

/// Drives one scenario against one backend
pub struct ScenarioRunner {
    plan: RunPlan,
    timing: Timing,
    captures: CaptureWriter,
}

impl ScenarioRunner {
    pub fn new(plan: RunPlan) -> Result<Self> {
        let scenario = &plan.scenario;
        let timing = Timing::from_defaults(&scenario.defaults);
        let captures = CaptureWriter::new(scenario.name.clone(), &scenario.artifacts)?;
        Ok(Self {
            plan,
            timing,
            captures,
        })
    }

    /// Override the scenario's captures directory
    pub fn with_captures_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.captures = self.captures.with_dir(dir);
        }
        self
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Run every planned sequence. The backend is destroyed exactly once,
    /// whatever the outcome; teardown errors are logged and dropped.
    pub async fn run(&self, backend: &mut dyn Backend) -> Result<RunReport> {
        let started_at = Utc::now();
        info!(
            "Running scenario {} on the {} backend",
            self.plan.scenario.name,
            backend.name()
        );

        let outcome = self.drive(backend).await;

        if let Err(e) = backend.destroy().await {
            warn!("Backend teardown failed: {}", e);
        }

        let results = outcome?;
        let report = report::build(&self.plan.scenario.name, started_at, Utc::now(), results)?;

        let failed = report
            .sequences
            .iter()
            .filter(|s| s.status == RunStatus::Failed)
            .count();
        info!(
            "Scenario {}: {} ({} sequence(s) run, {} failed)",
            report.scenario,
            report.status,
            report.sequences.len(),
            failed
        );
        Ok(report)
    }

    async fn drive(&self, backend: &mut dyn Backend) -> Result<Vec<SequenceResult>> {
        let pid = self.start(backend).await?;

        let mut results = Vec::new();
        for sequence in &self.plan.sequences {
            let result = self.run_sequence(backend, sequence, pid).await;
            let failed = result.status == RunStatus::Failed;
            results.push(result);
            if failed {
                break;
            }
        }
        Ok(results)
    }

    async fn start(&self, backend: &mut dyn Backend) -> Result<u32> {
        let launch = &self.plan.scenario.launch;
        let pid = backend
            .launch(&launch.command, &launch.args, launch.cwd.as_deref())
            .await?;
        info!("Launched {} (pid {})", launch.command, pid);

        let startup = launch.startup_timeout_ms.map(Duration::from_millis);
        if let Some(timeout) = startup {
            wait_until_running(backend, pid, timeout).await?;
        }
        if let Some(ready) = &self.plan.ready {
            matcher::wait_for(
                backend,
                ready,
                Surface::Screen,
                false,
                startup.unwrap_or(self.timing.wait_timeout),
                self.timing.poll,
            )
            .await?;
            debug!("Ready matcher {} satisfied", ready.describe());
        }
        Ok(pid)
    }

    async fn run_sequence(
        &self,
        backend: &mut dyn Backend,
        sequence: &PlannedSequence,
        pid: u32,
    ) -> SequenceResult {
        let start = Instant::now();
        info!("Sequence {}", sequence.name);

        let mut steps = Vec::new();
        let mut artifacts = Vec::new();

        let status = match self.check_ready(backend, sequence, pid).await {
            Err(e) => {
                error!("✗ {} not ready: {}", sequence.name, e);
                RunStatus::Failed
            }
            Ok(()) => {
                let mut interpreter =
                    Interpreter::new(backend, &self.timing, &self.captures, &sequence.name);
                let mut status = RunStatus::Passed;
                for (index, step) in sequence.steps.iter().enumerate() {
                    let result = interpreter.run_step(step, index, &mut artifacts).await;
                    let failed = result.status == RunStatus::Failed;
                    steps.push(result);
                    if failed {
                        status = RunStatus::Failed;
                        break;
                    }
                }
                status
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match status {
            RunStatus::Failed => error!("✗ {} ({} ms)", sequence.name, duration_ms),
            _ => info!("✓ {} ({} ms)", sequence.name, duration_ms),
        }

        SequenceResult {
            name: sequence.name.clone(),
            status,
            duration_ms,
            steps,
            artifacts,
        }
    }

    async fn check_ready(
        &self,
        backend: &mut dyn Backend,
        sequence: &PlannedSequence,
        pid: u32,
    ) -> Result<()> {
        wait_until_running(backend, pid, self.timing.wait_timeout).await?;
        if let Some(ensure) = &sequence.ensure {
            let ensure = CompiledMatcher::compile(ensure)?;
            matcher::wait_for(
                backend,
                &ensure,
                Surface::Screen,
                false,
                self.timing.wait_timeout,
                self.timing.poll,
            )
            .await?;
        }
        Ok(())
    }
}

/// Poll `is_running` until it reports true or the deadline passes
async fn wait_until_running(
    backend: &mut dyn Backend,
    pid: u32,
    timeout: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    let poll = Duration::from_millis(defaults::PROCESS_POLL_MS);
    loop {
        if backend.is_running(pid).await? {
            return Ok(());
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Err(Error::MatchTimeout {
                matcher: format!("process {} running", pid),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        sleep(poll.min(deadline - now)).await;
    }
}

/// Plan and run in one call
pub async fn run_scenario(
    scenario: Scenario,
    sequences: Vec<Sequence>,
    macro_files: &[MacroFile],
    backend: &mut dyn Backend,
) -> Result<RunReport> {
    let plan = RunPlan::build(scenario, sequences, macro_files)?;
    ScenarioRunner::new(plan)?.run(backend).await
}
