//! Load test orchestrator
//!
//! Lifecycle of one run:
//!
//! 1. scenario setup (failure is fatal, no VU starts)
//! 2. the scheduler drives VUs along the stage plan
//! 3. the metrics registry is frozen
//! 4. thresholds are evaluated once against the final snapshot
//! 5. everything is folded into a [`RunReport`]

use crate::config::RunConfig;
use crate::error::LoadResult;
use crate::metrics::MetricsRegistry;
use crate::report::RunReport;
use crate::scheduler::{Scenario, Scheduler};
use crate::stage::StagePlan;
use crate::threshold::{self, Threshold};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Configured load test, ready to run a scenario.
pub struct LoadTest {
    plan: StagePlan,
    registry: MetricsRegistry,
    thresholds: Vec<Threshold>,
    tick: Duration,
    progress_interval: Duration,
}

impl LoadTest {
    pub fn new(plan: StagePlan) -> Self {
        Self {
            plan,
            registry: MetricsRegistry::new(),
            thresholds: Vec::new(),
            tick: Duration::from_millis(100),
            progress_interval: Duration::from_secs(10),
        }
    }

    /// Plan, thresholds and scheduler settings from a loaded configuration.
    pub fn from_config(config: &RunConfig) -> LoadResult<Self> {
        Ok(Self::new(config.stage_plan())
            .with_thresholds(config.thresholds()?)
            .with_tick(config.scheduler.tick())
            .with_progress_interval(config.scheduler.progress_interval()))
    }

    pub fn with_thresholds(mut self, thresholds: Vec<Threshold>) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Add one threshold, e.g. `threshold("http_req_duration", "p(95)<500")`.
    pub fn threshold(mut self, metric: &str, expr: &str) -> LoadResult<Self> {
        self.thresholds.push(Threshold::parse(metric, expr)?);
        Ok(self)
    }

    /// Record into an existing registry instead of a fresh one.
    pub fn with_registry(mut self, registry: MetricsRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Run `scenario` along the plan and evaluate thresholds.
    ///
    /// Only a setup failure (or a metric kind conflict) is an error; failing
    /// iterations and violated thresholds are reported in the [`RunReport`].
    pub async fn run<S>(&self, mut scenario: S) -> LoadResult<RunReport>
    where
        S: Scenario + 'static,
    {
        self.plan.validate()?;
        let started_at = Utc::now();
        let name = scenario.name().to_string();

        tracing::info!(scenario = %name, thresholds = self.thresholds.len(), "running setup");
        if let Err(e) = scenario.setup(&self.registry).await {
            tracing::error!(scenario = %name, error = %e, "setup failed, load test not started");
            return Err(e);
        }

        let schedule = Scheduler::new(self.plan.clone(), self.registry.clone())
            .with_tick(self.tick)
            .with_progress_interval(self.progress_interval)
            .run(Arc::new(scenario))
            .await?;

        self.registry.freeze();
        let snapshot = self.registry.snapshot();
        let thresholds = threshold::evaluate(&self.thresholds, &snapshot);

        for failure in thresholds.failures() {
            tracing::warn!(threshold = %failure, "threshold crossed");
        }
        tracing::info!(
            scenario = %name,
            passed = thresholds.passed,
            iterations = schedule.iterations,
            "load test complete"
        );

        Ok(RunReport::new(name, started_at, schedule, snapshot, thresholds))
    }
}

/// Run `scenario` along `plan` without thresholds.
pub async fn run<S>(plan: StagePlan, scenario: S) -> LoadResult<RunReport>
where
    S: Scenario + 'static,
{
    LoadTest::new(plan).run(scenario).await
}
