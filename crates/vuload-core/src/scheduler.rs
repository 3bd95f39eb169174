//! Virtual-user scheduler
//!
//! Owns the concurrency timeline of a run. On every tick the desired
//! concurrency `C(t)` is read from the [`StagePlan`] and the set of live
//! virtual users is reconciled with `round(C(t))`:
//!
//! - new VUs are spawned at increasing index
//! - the highest-indexed VUs are retired; a retired VU finishes its in-flight
//!   iteration and then stops (there is no forced cancellation)
//! - when the target rises again, a retired VU that has not stopped yet is
//!   reinstated instead of spawning a second task with the same index
//!
//! Every VU is a tokio task looping over [`Scenario::iteration`]. An iteration
//! that returns an error or panics is counted and logged; it never affects
//! other VUs or the scheduler.

use crate::error::{LoadError, LoadResult};
use crate::metrics::{Counter, MetricsRegistry, Trend};
use crate::report::duration_ms;
use crate::stage::StagePlan;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Per-iteration view a virtual user hands to its scenario.
#[derive(Debug, Clone)]
pub struct VuContext {
    vu: usize,
    iteration: u64,
    metrics: MetricsRegistry,
}

impl VuContext {
    pub fn new(vu: usize, iteration: u64, metrics: MetricsRegistry) -> Self {
        Self {
            vu,
            iteration,
            metrics,
        }
    }

    /// Index of the virtual user, in `[0, concurrency)`.
    pub fn vu(&self) -> usize {
        self.vu
    }

    /// Iteration number within this VU, from 0.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Cooperatively suspend this VU.
    pub async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Work performed repeatedly by every virtual user.
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str {
        "scenario"
    }

    /// Runs once before any VU starts. An error aborts the run.
    async fn setup(&mut self, _metrics: &MetricsRegistry) -> LoadResult<()> {
        Ok(())
    }

    /// False while a setup this scenario depends on has not run.
    fn is_ready(&self) -> bool {
        true
    }

    /// One iteration. Errors are local to the iteration.
    async fn iteration(&self, ctx: &VuContext) -> LoadResult<()>;
}

/// A [`Scenario`] made from an async closure.
pub struct FnScenario<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnScenario<F>
where
    F: Fn(VuContext) -> Fut + Send + Sync,
    Fut: Future<Output = LoadResult<()>> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Scenario for FnScenario<F>
where
    F: Fn(VuContext) -> Fut + Send + Sync,
    Fut: Future<Output = LoadResult<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn iteration(&self, ctx: &VuContext) -> LoadResult<()> {
        (self.f)(ctx.clone()).await
    }
}

/// One reconciliation of live VUs against the plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VuSample {
    /// Time since run start.
    #[serde(rename = "elapsed_ms", serialize_with = "duration_ms")]
    pub elapsed: Duration,
    /// `C(t)` before rounding.
    pub target: f64,
    /// Live, non-retired VUs after reconciliation.
    pub active: usize,
}

/// What the scheduler observed over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleSummary {
    #[serde(rename = "elapsed_ms", serialize_with = "duration_ms")]
    pub elapsed: Duration,
    pub iterations: u64,
    pub failed_iterations: u64,
    pub peak_vus: usize,
    pub samples: Vec<VuSample>,
}

/// Built-in iteration metrics shared by all VUs.
#[derive(Clone)]
struct IterationMetrics {
    iterations: Counter,
    duration: Trend,
    failures: Counter,
}

impl IterationMetrics {
    fn register(registry: &MetricsRegistry) -> LoadResult<Self> {
        Ok(Self {
            iterations: registry.counter("iterations")?,
            duration: registry.trend("iteration_duration")?,
            failures: registry.counter("iteration_failures")?,
        })
    }
}

#[derive(Debug, Default)]
struct Tally {
    completed: AtomicU64,
    failed: AtomicU64,
}

const ACTIVE: u8 = 0;
const RETIRING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle of one VU task, shared with the scheduler.
#[derive(Debug, Default)]
struct VuState(AtomicU8);

impl VuState {
    fn retire(&self) {
        let _ = self
            .0
            .compare_exchange(ACTIVE, RETIRING, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Cancel a pending retirement. Fails once the VU has stopped.
    fn reinstate(&self) -> bool {
        self.0
            .compare_exchange(RETIRING, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Checked by the VU between iterations. Once true, the VU never runs
    /// another iteration.
    fn stop_if_retiring(&self) -> bool {
        self.0
            .compare_exchange(RETIRING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct LiveVu {
    index: usize,
    state: Arc<VuState>,
    handle: JoinHandle<()>,
}

/// Drives virtual users along a stage plan.
pub struct Scheduler {
    plan: StagePlan,
    metrics: MetricsRegistry,
    tick: Duration,
    progress_interval: Duration,
}

impl Scheduler {
    pub fn new(plan: StagePlan, metrics: MetricsRegistry) -> Self {
        Self {
            plan,
            metrics,
            tick: Duration::from_millis(100),
            progress_interval: Duration::from_secs(10),
        }
    }

    /// Reconciliation period. Zero is raised to one millisecond.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// Run the plan to completion. Returns once every VU has stopped.
    ///
    /// [`Scenario::setup`] is not called here; a scenario that still needs
    /// it is rejected. [`LoadTest`](crate::LoadTest) runs setup first.
    pub async fn run<S>(&self, scenario: Arc<S>) -> LoadResult<ScheduleSummary>
    where
        S: Scenario + ?Sized + 'static,
    {
        if !scenario.is_ready() {
            return Err(LoadError::setup(format!(
                "scenario `{}` requires setup before its virtual users start",
                scenario.name()
            )));
        }

        let builtin = IterationMetrics::register(&self.metrics)?;
        let tally = Arc::new(Tally::default());
        let total = self.plan.total_duration();

        tracing::info!(
            scenario = scenario.name(),
            plan = %self.plan.description(),
            max_vus = self.plan.max_target(),
            "starting virtual users"
        );

        let mut live: Vec<LiveVu> = Vec::new();
        let mut stopping: Vec<LiveVu> = Vec::new();
        let mut samples = Vec::new();
        let mut peak_vus = 0;
        let mut last_progress = Duration::ZERO;

        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();
            if elapsed >= total {
                break;
            }

            let desired = self.plan.desired_vus(elapsed);

            while live.len() < desired {
                let index = live.len();
                let reinstated = stopping
                    .iter()
                    .position(|vu| vu.index == index && vu.state.reinstate());
                if let Some(position) = reinstated {
                    tracing::debug!(vu = index, "virtual user reinstated");
                    live.push(stopping.swap_remove(position));
                    continue;
                }

                let state = Arc::new(VuState::default());
                let handle = tokio::spawn(run_vu(
                    index,
                    Arc::clone(&scenario),
                    self.metrics.clone(),
                    builtin.clone(),
                    Arc::clone(&tally),
                    Arc::clone(&state),
                ));
                live.push(LiveVu {
                    index,
                    state,
                    handle,
                });
            }

            while live.len() > desired {
                if let Some(vu) = live.pop() {
                    vu.state.retire();
                    stopping.push(vu);
                }
            }
            stopping.retain(|vu| !vu.handle.is_finished());

            peak_vus = peak_vus.max(live.len());
            samples.push(VuSample {
                elapsed,
                target: self.plan.target_at(elapsed),
                active: live.len(),
            });

            if elapsed.saturating_sub(last_progress) >= self.progress_interval {
                last_progress = elapsed;
                tracing::info!(
                    elapsed_s = elapsed.as_secs(),
                    active_vus = live.len(),
                    iterations = tally.completed.load(Ordering::Relaxed),
                    failed = tally.failed.load(Ordering::Relaxed),
                    "progress"
                );
            }
        }

        for vu in live.drain(..) {
            vu.state.retire();
            stopping.push(vu);
        }
        let in_flight = stopping.len();
        tracing::debug!(in_flight, "plan finished, waiting for in-flight iterations");

        for vu in stopping {
            if let Err(e) = vu.handle.await {
                tracing::warn!(error = %e, "virtual user task ended abnormally");
            }
        }

        let summary = ScheduleSummary {
            elapsed: start.elapsed(),
            iterations: tally.completed.load(Ordering::Relaxed),
            failed_iterations: tally.failed.load(Ordering::Relaxed),
            peak_vus,
            samples,
        };

        tracing::info!(
            elapsed_ms = summary.elapsed.as_millis() as u64,
            iterations = summary.iterations,
            failed = summary.failed_iterations,
            peak_vus = summary.peak_vus,
            "virtual users finished"
        );

        Ok(summary)
    }
}

/// Loop of one virtual user until it is retired.
async fn run_vu<S>(
    index: usize,
    scenario: Arc<S>,
    registry: MetricsRegistry,
    builtin: IterationMetrics,
    tally: Arc<Tally>,
    state: Arc<VuState>,
) where
    S: Scenario + ?Sized,
{
    tracing::debug!(vu = index, "virtual user started");
    let mut iteration = 0u64;

    while !state.stop_if_retiring() {
        let ctx = VuContext::new(index, iteration, registry.clone());
        let started = Instant::now();

        let outcome = AssertUnwindSafe(scenario.iteration(&ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(LoadError::Iteration(panic_message(&*panic))));

        builtin.iterations.add(1.0);
        builtin.duration.add_duration(started.elapsed());
        tally.completed.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = outcome {
            builtin.failures.add(1.0);
            tally.failed.fetch_add(1, Ordering::Relaxed);
            match e {
                LoadError::Iteration(ref message) if message.starts_with("panicked") => {
                    tracing::warn!(vu = index, iteration, "{message}");
                }
                other => tracing::debug!(vu = index, iteration, error = %other, "iteration failed"),
            }
        }

        iteration += 1;
        tokio::task::yield_now().await;
    }

    tracing::debug!(vu = index, iterations = iteration, "virtual user retired");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use parking_lot::Mutex;
    use std::collections::{BTreeSet, HashMap};

    fn sleeping(
        pause: Duration,
    ) -> FnScenario<impl Fn(VuContext) -> futures::future::BoxFuture<'static, LoadResult<()>>> {
        FnScenario::new("sleep", move |ctx: VuContext| {
            async move {
                ctx.sleep(pause).await;
                Ok(())
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_plan_runs_all_vus() {
        let registry = MetricsRegistry::new();
        let seen = Arc::new(Mutex::new(BTreeSet::new()));
        let recorder = Arc::clone(&seen);
        let scenario = FnScenario::new("record", move |ctx: VuContext| {
            recorder.lock().insert(ctx.vu());
            async move {
                ctx.sleep(Duration::from_millis(250)).await;
                Ok(())
            }
        });

        let summary = Scheduler::new(StagePlan::fixed(3, Duration::from_secs(2)), registry.clone())
            .run(Arc::new(scenario))
            .await
            .unwrap();

        assert_eq!(*seen.lock(), BTreeSet::from([0, 1, 2]));
        assert_eq!(summary.peak_vus, 3);
        assert!(summary.samples.iter().all(|s| s.active == 3));
        // 3 VUs * 2s / 250ms, give or take the iteration straddling the end.
        assert!((24..=27).contains(&summary.iterations), "{}", summary.iterations);
        assert_eq!(summary.failed_iterations, 0);
        assert_eq!(
            registry.snapshot().counter_value("iterations"),
            Some(summary.iterations as f64)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_and_panics_are_local() {
        let registry = MetricsRegistry::new();
        let scenario = FnScenario::new("flaky", |ctx: VuContext| async move {
            ctx.sleep(Duration::from_millis(100)).await;
            match (ctx.vu(), ctx.iteration() % 2) {
                (0, 0) => Err(LoadError::Iteration("boom".to_string())),
                (1, 0) => panic!("vu 1 blew up"),
                _ => Ok(()),
            }
        });

        let summary = Scheduler::new(StagePlan::fixed(2, Duration::from_secs(1)), registry.clone())
            .run(Arc::new(scenario))
            .await
            .unwrap();

        assert!(summary.iterations >= 18);
        assert!(summary.failed_iterations >= 9);
        assert!(summary.failed_iterations < summary.iterations);
        assert_eq!(
            registry.snapshot().counter_value("iteration_failures"),
            Some(summary.failed_iterations as f64)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_down_retires_highest_index() {
        let registry = MetricsRegistry::new();
        let plan = StagePlan::new(vec![
            Stage::new(Duration::ZERO, 4),
            Stage::new(Duration::from_secs(1), 4),
            Stage::new(Duration::ZERO, 1),
            Stage::new(Duration::from_secs(1), 1),
        ]);
        let late = Arc::new(Mutex::new(BTreeSet::new()));
        let start = tokio::time::Instant::now();
        let scenario = {
            let late = Arc::clone(&late);
            FnScenario::new("ramp", move |ctx: VuContext| {
                let late = Arc::clone(&late);
                async move {
                    ctx.sleep(Duration::from_millis(50)).await;
                    if start.elapsed() > Duration::from_millis(1200) {
                        late.lock().insert(ctx.vu());
                    }
                    Ok(())
                }
            })
        };

        let summary = Scheduler::new(plan, registry).run(Arc::new(scenario)).await.unwrap();

        assert_eq!(summary.peak_vus, 4);
        assert_eq!(summary.samples.last().map(|s| s.active), Some(1));
        assert_eq!(*late.lock(), BTreeSet::from([0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rising_target_reinstates_retiring_vu() {
        let registry = MetricsRegistry::new();
        // 2 -> 1 -> 2 while the retired VU is still inside its iteration.
        let plan = StagePlan::new(vec![
            Stage::new(Duration::ZERO, 2),
            Stage::new(Duration::from_millis(500), 2),
            Stage::new(Duration::ZERO, 1),
            Stage::new(Duration::from_millis(100), 1),
            Stage::new(Duration::ZERO, 2),
            Stage::new(Duration::from_millis(500), 2),
        ]);
        let running = Arc::new(Mutex::new(HashMap::<usize, (usize, usize)>::new()));
        let scenario = {
            let running = Arc::clone(&running);
            FnScenario::new("overlap", move |ctx: VuContext| {
                let running = Arc::clone(&running);
                async move {
                    {
                        let mut running = running.lock();
                        let (now, max) = running.entry(ctx.vu()).or_default();
                        *now += 1;
                        *max = (*max).max(*now);
                    }
                    ctx.sleep(Duration::from_millis(400)).await;
                    if let Some((now, _)) = running.lock().get_mut(&ctx.vu()) {
                        *now -= 1;
                    }
                    Ok(())
                }
            })
        };

        let summary = Scheduler::new(plan, registry)
            .with_tick(Duration::from_millis(50))
            .run(Arc::new(scenario))
            .await
            .unwrap();

        let running = running.lock();
        assert_eq!(running.keys().copied().collect::<BTreeSet<_>>(), BTreeSet::from([0, 1]));
        for (vu, (_, max)) in running.iter() {
            assert_eq!(*max, 1, "vu {vu} ran overlapping iterations");
        }
        assert_eq!(summary.peak_vus, 2);
        assert_eq!(summary.failed_iterations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_plan_starts_nothing() {
        let registry = MetricsRegistry::new();
        let summary = Scheduler::new(StagePlan::fixed(5, Duration::ZERO), registry)
            .run(Arc::new(sleeping(Duration::from_millis(10))))
            .await
            .unwrap();

        assert_eq!(summary.iterations, 0);
        assert_eq!(summary.peak_vus, 0);
        assert!(summary.samples.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_builtin_metric_kind_conflict_is_reported() {
        let registry = MetricsRegistry::new();
        registry.trend("iterations").unwrap();

        let result = Scheduler::new(StagePlan::fixed(1, Duration::from_secs(1)), registry)
            .run(Arc::new(sleeping(Duration::from_millis(10))))
            .await;

        assert!(matches!(result, Err(LoadError::MetricKindMismatch { .. })));
    }
}
