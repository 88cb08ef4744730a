//! Test campaign orchestration.
//!
//! This module contains the engine that coordinates an on-device test run:
//! one campaign per target ABI, each resolving a capable device from the
//! shared fleet, staging artifacts, running named shell tests, and recording
//! structured results. The run joins every campaign before producing a
//! single deterministic verdict.
//!
//! # Execution Flow
//!
//! ```text
//!                         Orchestrator::run
//!                                │
//!          ┌───────────┬─────────┴──────┬────────────┐
//!          ▼           ▼                ▼            ▼
//!      campaign     campaign        campaign     campaign      (concurrent,
//!       (arm)       (arm64)          (x86)       (x86_64)       one per ABI)
//!          │
//!          │ resolve device (none -> warning, campaign ends empty)
//!          │ prepare: rm -rf <base>/<project>/<abi>
//!          │ push phase: all PushSpecs concurrently, join all
//!          │ ── barrier: no test starts before every push landed ──
//!          │ run phase: all ShellTestSpecs concurrently, join all
//!          ▼
//!      Vec<TestResult> + warnings
//!                                │
//!                        join all campaigns
//!                                │
//!                  warnings logged, failures aggregated
//! ```
//!
//! # Failure Isolation
//!
//! A failed shell test becomes a [`TestResult::Failure`] and never prevents
//! a sibling test from running or being recorded. A failed prepare or push
//! step is fatal to its own campaign only, and surfaces as
//! [`RunError::Campaign`] once every campaign has joined. Nothing is ever
//! cancelled: the run always waits for full completion of everything it
//! launched before reporting.

use std::fmt;
use std::path::PathBuf;

use futures::future;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::abi::Abi;
use crate::channel::RemoteCommandError;
use crate::device::Device;
use crate::fleet::Fleet;

/// Default device-side directory campaigns stage artifacts under.
pub const DEFAULT_BASE_DIR: &str = "/data/local/tmp/fleetrun";

/// One artifact to place on a device: a local source path and a
/// device-relative destination. The campaign roots the destination under
/// its ABI's working directory.
#[derive(Debug, Clone)]
pub struct PushSpec {
    /// Local path of the artifact to push.
    pub src: PathBuf,

    /// Destination path, relative to the campaign's device directory.
    pub dest: String,
}

impl PushSpec {
    pub fn new(src: impl Into<PathBuf>, dest: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
        }
    }
}

/// One named remote invocation to treat as a test.
#[derive(Debug, Clone)]
pub struct ShellTestSpec {
    /// Name the result is reported under.
    pub name: String,

    /// Argument vector passed to the device shell.
    pub cmd: Vec<String>,
}

impl ShellTestSpec {
    pub fn new(name: impl Into<String>, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into_iter().map(Into::into).collect(),
        }
    }
}

/// Outcome of one named shell test, scoped to the ABI that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    /// The command exited zero.
    Success { name: String, abi: Abi },

    /// The command failed; `output` carries the diagnostic (the command
    /// line and its merged output, or another error's message).
    Failure {
        name: String,
        abi: Abi,
        output: String,
    },
}

impl TestResult {
    pub fn name(&self) -> &str {
        match self {
            TestResult::Success { name, .. } | TestResult::Failure { name, .. } => name,
        }
    }

    pub fn abi(&self) -> Abi {
        match self {
            TestResult::Success { abi, .. } | TestResult::Failure { abi, .. } => *abi,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TestResult::Failure { .. })
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestResult::Success { name, abi } => write!(f, "PASS {abi} {name}"),
            TestResult::Failure { name, abi, output } => {
                write!(f, "FAIL {abi} {name}: {output}")
            }
        }
    }
}

/// Per-ABI context handed to a [`TestPlan`].
#[derive(Debug, Clone)]
pub struct PlanContext {
    /// The ABI this campaign targets.
    pub abi: Abi,

    /// The device-side directory artifacts are staged under.
    pub device_dir: String,
}

/// Supplies the artifacts to push and the tests to run.
///
/// The orchestrator consults the plan once per ABI, passing that ABI's
/// context, and feeds the returned lists directly into the campaign. The
/// same plan instance serves all campaigns concurrently.
pub trait TestPlan: Send + Sync {
    /// Artifacts to stage for the given ABI.
    fn pushes(&self, ctx: &PlanContext) -> Vec<PushSpec>;

    /// Tests to run for the given ABI, after every push has landed.
    fn shell_tests(&self, ctx: &PlanContext) -> Vec<ShellTestSpec>;
}

/// Aggregated outcome of a run whose campaigns all completed.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Every test result, across all ABIs. Arrival order is whatever the
    /// underlying commands produced; consumers must not assume ordering.
    pub results: Vec<TestResult>,

    /// Non-fatal warnings (one per ABI that no device could serve).
    pub warnings: Vec<String>,
}

impl RunReport {
    /// `true` when no test failed. Warnings never affect the verdict.
    pub fn success(&self) -> bool {
        !self.results.iter().any(TestResult::is_failure)
    }

    /// One formatted `FAIL <abi> <name>: <diagnostic>` line per failure.
    pub fn failure_lines(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|result| result.is_failure())
            .map(ToString::to_string)
            .collect()
    }
}

/// Errors that end a run without a clean verdict.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// A campaign's prepare or push step failed. Fatal to the run, but only
    /// after every sibling campaign has completed.
    #[error("campaign for {abi} failed: {source}")]
    Campaign {
        abi: Abi,
        #[source]
        source: RemoteCommandError,
    },

    /// At least one test failed. The report lists every failure.
    #[error("on-device tests failed:\n{}", .report.failure_lines().join("\n"))]
    TestsFailed { report: RunReport },
}

struct CampaignOutcome {
    results: Vec<TestResult>,
    warnings: Vec<String>,
}

impl CampaignOutcome {
    fn new() -> Self {
        Self {
            results: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Coordinates one full on-device test run across all target ABIs.
///
/// Campaigns share the [`Fleet`] read-only (device capability state is
/// memoized once, guarded) and run concurrently on scoped tasks, so the
/// orchestrator needs a multi-threaded runtime, as provided by
/// `#[tokio::main]`.
pub struct Orchestrator {
    project: String,
    min_sdk_version: u32,
    base_dir: String,
}

impl Orchestrator {
    /// Creates an orchestrator for `project` with the configured minimum
    /// SDK version. Each ABI raises that minimum to its own floor.
    pub fn new(project: impl Into<String>, min_sdk_version: u32) -> Self {
        Self {
            project: project.into(),
            min_sdk_version,
            base_dir: DEFAULT_BASE_DIR.to_string(),
        }
    }

    /// Overrides the device-side base directory, mainly so tests can point
    /// campaigns at a scratch path.
    pub fn with_base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    fn device_dir(&self, abi: Abi) -> String {
        format!("{}/{}/{}", self.base_dir, self.project, abi)
    }

    /// Runs every ABI campaign concurrently and aggregates the verdict.
    ///
    /// All campaigns are joined before anything is reported: warnings are
    /// always emitted, even on an otherwise clean run; passing tests are
    /// logged at debug; the run fails iff a campaign's prepare/push step
    /// failed or at least one test result is a failure.
    pub async fn run(&self, fleet: &Fleet, plan: &dyn TestPlan) -> Result<RunReport, RunError> {
        let outcomes: Mutex<Vec<Result<CampaignOutcome, RunError>>> = Mutex::new(Vec::new());

        tokio_scoped::scope(|scope| {
            for abi in Abi::ALL {
                let outcomes = &outcomes;
                scope.spawn(async move {
                    let outcome = self.run_campaign(fleet, plan, abi).await;
                    outcomes.lock().await.push(outcome);
                });
            }
        });

        let mut report = RunReport::default();
        let mut campaign_error = None;

        for outcome in outcomes.into_inner() {
            match outcome {
                Ok(campaign) => {
                    report.results.extend(campaign.results);
                    report.warnings.extend(campaign.warnings);
                }
                Err(err) => {
                    error!(%err, "campaign failed");
                    campaign_error.get_or_insert(err);
                }
            }
        }

        for warning in &report.warnings {
            warn!("{warning}");
        }

        if let Some(err) = campaign_error {
            return Err(err);
        }

        for result in &report.results {
            if !result.is_failure() {
                debug!("{result}");
            }
        }

        if !report.success() {
            return Err(RunError::TestsFailed { report });
        }

        info!(
            tests = report.results.len(),
            warnings = report.warnings.len(),
            "on-device tests passed"
        );
        Ok(report)
    }

    async fn run_campaign(
        &self,
        fleet: &Fleet,
        plan: &dyn TestPlan,
        abi: Abi,
    ) -> Result<CampaignOutcome, RunError> {
        let min_version = abi.effective_min_version(self.min_sdk_version);
        let mut campaign = CampaignOutcome::new();

        let Some(device) = fleet.find_device_for(abi, min_version).await else {
            campaign.warnings.push(format!(
                "no device capable of running tests for {abi} at minimum version {min_version}"
            ));
            return Ok(campaign);
        };

        info!(serial = device.serial(), %abi, "resolved device for campaign");

        let device_dir = self.device_dir(abi);
        let ctx = PlanContext {
            abi,
            device_dir: device_dir.clone(),
        };

        // Clean slate: everything under this ABI's directory is stale.
        device
            .shell(["rm", "-rf", device_dir.as_str()])
            .await
            .map_err(|source| RunError::Campaign { abi, source })?;

        self.push_phase(device, plan.pushes(&ctx), &device_dir)
            .await
            .map_err(|source| RunError::Campaign { abi, source })?;

        // Barrier passed: every artifact landed, tests may reference them.
        campaign.results = self.run_phase(device, plan.shell_tests(&ctx), abi).await;
        Ok(campaign)
    }

    /// Pushes every artifact concurrently and joins the whole phase.
    ///
    /// Any single failure fails the phase, but only after every in-flight
    /// push has completed; a half-staged device must not run tests, and a
    /// sibling push must not be cancelled mid-transfer.
    async fn push_phase(
        &self,
        device: &Device,
        pushes: Vec<PushSpec>,
        device_dir: &str,
    ) -> Result<(), RemoteCommandError> {
        debug!(serial = device.serial(), count = pushes.len(), "staging artifacts");

        let transfers = pushes.iter().map(|spec| {
            let dest = format!("{}/{}", device_dir, spec.dest);
            async move { device.push(&spec.src, &dest).await }
        });

        for result in future::join_all(transfers).await {
            result?;
        }
        Ok(())
    }

    /// Runs every shell test concurrently; each yields exactly one result.
    ///
    /// One test's failure never prevents another test's execution or result
    /// capture, so this phase is infallible at the campaign level.
    async fn run_phase(
        &self,
        device: &Device,
        tests: Vec<ShellTestSpec>,
        abi: Abi,
    ) -> Vec<TestResult> {
        debug!(serial = device.serial(), count = tests.len(), "running shell tests");

        let runs = tests.into_iter().map(|spec| async move {
            match device.shell(spec.cmd).await {
                Ok(_) => TestResult::Success {
                    name: spec.name,
                    abi,
                },
                Err(err) => TestResult::Failure {
                    name: spec.name,
                    abi,
                    output: format!("{}\n{}", err.command_line(), err.output),
                },
            }
        });

        future::join_all(runs).await
    }
}
