//! Declarative dependent-step scenarios
//!
//! A [`StepScenario`] is an ordered list of [`Step`]s sharing a per-iteration
//! state `S`. Each step builds a request from the state, sends it through the
//! backoff executor, records its latency, evaluates its checks and may
//! capture values (a token, a record id) back into the state for later steps.
//!
//! A failing *blocking* step ends the iteration; later steps depend on what it
//! would have captured. A failing non-blocking step is recorded and the
//! iteration continues.
//!
//! Metrics written per step `name`:
//!
//! | Metric                           | Kind    | Sample                        |
//! |----------------------------------|---------|-------------------------------|
//! | `step_duration{step=name}`       | trend   | response time (ms)            |
//! | `checks{check=<check>}`          | rate    | check outcome                 |
//! | `errors{step=name}`              | rate    | `true` when the step failed   |
//! | `http_reqs{step=name}`           | counter | one per attempt               |
//! | `http_req_duration{step=name}`   | trend   | per attempt with a response   |
//! | `http_req_failed{step=name}`     | rate    | status `0` or `>= 400`        |
//!
//! The latency trend can be renamed per step with [`Step::trend`].

use crate::backoff::{Backoff, RetryOutcome};
use crate::error::{LoadError, LoadResult, ParseError};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::metrics::{Counter, MetricKey, MetricsRegistry, Rate, Trend};
use crate::scheduler::{Scenario, VuContext};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

type RequestFn<S> = dyn Fn(&S) -> LoadResult<HttpRequest> + Send + Sync;
type CheckFn<S> = dyn Fn(&S, &HttpResponse) -> bool + Send + Sync;
type CaptureFn<S> = dyn Fn(&mut S, &HttpResponse) -> Result<(), ParseError> + Send + Sync;
type InitFn<S> = dyn Fn(&mut S, &VuContext) + Send + Sync;

/// Named boolean assertion on a response.
pub struct Check<S> {
    name: String,
    predicate: Box<CheckFn<S>>,
}

impl<S> Check<S> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One request of a scenario.
pub struct Step<S> {
    name: String,
    blocking: bool,
    request: Box<RequestFn<S>>,
    checks: Vec<Check<S>>,
    capture: Option<Box<CaptureFn<S>>>,
    pause: Duration,
    trend: Option<String>,
}

impl<S> Step<S> {
    /// A non-blocking step without checks or pause.
    ///
    /// `request` returning an error fails the step without sending anything.
    pub fn new<F>(name: impl Into<String>, request: F) -> Self
    where
        F: Fn(&S) -> LoadResult<HttpRequest> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            blocking: false,
            request: Box::new(request),
            checks: Vec::new(),
            capture: None,
            pause: Duration::ZERO,
            trend: None,
        }
    }

    /// End the iteration when this step fails.
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn check<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&S, &HttpResponse) -> bool + Send + Sync + 'static,
    {
        self.checks.push(Check {
            name: name.into(),
            predicate: Box::new(predicate),
        });
        self
    }

    /// Store values from a response that passed every check. An error fails
    /// the step.
    pub fn capture<F>(mut self, capture: F) -> Self
    where
        F: Fn(&mut S, &HttpResponse) -> Result<(), ParseError> + Send + Sync + 'static,
    {
        self.capture = Some(Box::new(capture));
        self
    }

    /// Cooperative pause after the step. Skipped when a blocking step fails.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Record latency into the trend `name` instead of
    /// `step_duration{step=<step>}`.
    pub fn trend(mut self, name: impl Into<String>) -> Self {
        self.trend = Some(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn checks(&self) -> &[Check<S>] {
        &self.checks
    }
}

/// Result of one step within an iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub passed: bool,
    /// Final status; `None` when no request was sent or retries ran out.
    pub status: Option<u16>,
    pub attempts: u32,
}

/// Steps attempted by one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IterationReport {
    pub steps: Vec<StepOutcome>,
    /// Blocking step whose failure ended the iteration.
    pub aborted_at: Option<String>,
}

impl IterationReport {
    /// Names of the attempted steps, in order.
    pub fn attempted(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.step.as_str())
    }

    pub fn passed(&self) -> bool {
        self.aborted_at.is_none() && self.steps.iter().all(|s| s.passed)
    }
}

/// Per-attempt transport metrics of one step.
struct HttpMetrics {
    reqs: Counter,
    duration: Trend,
    failed: Rate,
}

impl HttpMetrics {
    fn record(&self, response: &HttpResponse) {
        self.reqs.add(1.0);
        if !response.is_transport_failure() {
            self.duration.add_duration(response.duration);
        }
        self.failed.add(response.is_failed());
    }
}

struct StepMetrics {
    latency: Trend,
    checks: Vec<Rate>,
    errors: Rate,
    http: HttpMetrics,
}

impl StepMetrics {
    fn resolve<S>(step: &Step<S>, registry: &MetricsRegistry) -> LoadResult<Self> {
        let tagged = |name: &str| MetricKey::new(name).with_tag("step", step.name.as_str());

        let latency = match &step.trend {
            Some(name) => registry.trend(name)?,
            None => registry.trend_with_key(tagged("step_duration"))?,
        };
        let checks = step
            .checks
            .iter()
            .map(|c| registry.rate_with_key(MetricKey::new("checks").with_tag("check", c.name.as_str())))
            .collect::<LoadResult<Vec<_>>>()?;

        Ok(Self {
            latency,
            checks,
            errors: registry.rate_with_key(tagged("errors"))?,
            http: HttpMetrics {
                reqs: registry.counter_with_key(tagged("http_reqs"))?,
                duration: registry.trend_with_key(tagged("http_req_duration"))?,
                failed: registry.rate_with_key(tagged("http_req_failed"))?,
            },
        })
    }
}

struct ScenarioMetrics {
    setup: Vec<StepMetrics>,
    steps: Vec<StepMetrics>,
}

/// A scenario made of dependent HTTP steps over a cloneable state.
pub struct StepScenario<S> {
    name: String,
    client: Arc<dyn HttpClient>,
    backoff: Backoff,
    template: S,
    setup_steps: Vec<Step<S>>,
    steps: Vec<Step<S>>,
    init: Option<Box<InitFn<S>>>,
    metrics: Option<ScenarioMetrics>,
}

impl<S> StepScenario<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// `template` is the state every iteration starts from, after setup.
    pub fn new(name: impl Into<String>, client: Arc<dyn HttpClient>, template: S) -> Self {
        Self {
            name: name.into(),
            client,
            backoff: Backoff::default(),
            template,
            setup_steps: Vec::new(),
            steps: Vec::new(),
            init: None,
            metrics: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Step run once against the template before load starts. Any failure
    /// aborts the run.
    pub fn setup_step(mut self, step: Step<S>) -> Self {
        self.setup_steps.push(step);
        self
    }

    pub fn step(mut self, step: Step<S>) -> Self {
        self.steps.push(step);
        self
    }

    /// Adjust each iteration's fresh copy of the template, e.g. to pick
    /// per-VU credentials or generate request data.
    pub fn init<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut S, &VuContext) + Send + Sync + 'static,
    {
        self.init = Some(Box::new(init));
        self
    }

    pub fn template(&self) -> &S {
        &self.template
    }

    pub fn steps(&self) -> &[Step<S>] {
        &self.steps
    }

    fn resolve_metrics(&self, registry: &MetricsRegistry) -> LoadResult<ScenarioMetrics> {
        let resolve = |steps: &[Step<S>]| {
            steps
                .iter()
                .map(|step| StepMetrics::resolve(step, registry))
                .collect::<LoadResult<Vec<_>>>()
        };
        Ok(ScenarioMetrics {
            setup: resolve(&self.setup_steps)?,
            steps: resolve(&self.steps)?,
        })
    }

    /// Run every step once against a fresh copy of the template.
    pub async fn run_once(&self, ctx: &VuContext) -> LoadResult<IterationReport> {
        let resolved;
        let metrics = match &self.metrics {
            Some(metrics) => metrics,
            None => {
                resolved = self.resolve_metrics(ctx.metrics())?;
                &resolved
            }
        };

        let mut state = self.template.clone();
        if let Some(init) = &self.init {
            init(&mut state, ctx);
        }

        let mut report = IterationReport::default();
        for (step, step_metrics) in self.steps.iter().zip(&metrics.steps) {
            let outcome = self.execute(step, step_metrics, &mut state).await;
            let passed = outcome.passed;
            report.steps.push(outcome);

            if !passed && step.blocking {
                tracing::debug!(
                    scenario = %self.name,
                    vu = ctx.vu(),
                    iteration = ctx.iteration(),
                    step = %step.name,
                    "blocking step failed, ending iteration"
                );
                report.aborted_at = Some(step.name.clone());
                break;
            }

            ctx.sleep(step.pause).await;
        }

        Ok(report)
    }

    /// Build, send, check and capture one step.
    async fn execute(&self, step: &Step<S>, metrics: &StepMetrics, state: &mut S) -> StepOutcome {
        let failed = |status: Option<u16>, attempts: u32| StepOutcome {
            step: step.name.clone(),
            passed: false,
            status,
            attempts,
        };

        let request = match (step.request)(&*state) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(step = %step.name, error = %e, "request could not be built");
                metrics.errors.add(true);
                return failed(None, 0);
            }
        };

        let client = &self.client;
        let http = &metrics.http;
        let outcome = self
            .backoff
            .execute(move || {
                let request = request.clone();
                async move {
                    let response = client.send(request).await;
                    http.record(&response);
                    response
                }
            })
            .await;

        let (response, attempts) = match outcome {
            RetryOutcome::Response { response, attempts } => (response, attempts),
            RetryOutcome::Exhausted { attempts } => {
                tracing::debug!(step = %step.name, attempts, "no response after retries");
                metrics.errors.add(true);
                return failed(None, attempts);
            }
        };

        metrics.latency.add_duration(response.duration);

        // Every check is evaluated and recorded, even after one fails.
        let mut passed = true;
        for (check, rate) in step.checks.iter().zip(&metrics.checks) {
            let ok = (check.predicate)(&*state, &response);
            rate.add(ok);
            if !ok {
                tracing::debug!(step = %step.name, check = %check.name, status = response.status, "check failed");
                passed = false;
            }
        }

        if passed {
            if let Some(capture) = &step.capture {
                if let Err(e) = capture(&mut *state, &response) {
                    tracing::debug!(step = %step.name, error = %e, "capture failed");
                    passed = false;
                }
            }
        }

        metrics.errors.add(!passed);
        StepOutcome {
            step: step.name.clone(),
            passed,
            status: Some(response.status),
            attempts,
        }
    }
}

#[async_trait]
impl<S> Scenario for StepScenario<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&mut self, registry: &MetricsRegistry) -> LoadResult<()> {
        let metrics = self.resolve_metrics(registry)?;

        let mut template = self.template.clone();
        for (step, step_metrics) in self.setup_steps.iter().zip(&metrics.setup) {
            let outcome = self.execute(step, step_metrics, &mut template).await;
            if !outcome.passed {
                let status = outcome
                    .status
                    .map_or_else(|| "no response".to_string(), |s| format!("status {s}"));
                tracing::error!(scenario = %self.name, step = %step.name, %status, "setup step failed");
                return Err(LoadError::setup(format!(
                    "step `{}` failed ({status})",
                    step.name
                )));
            }
        }

        self.template = template;
        self.metrics = Some(metrics);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.setup_steps.is_empty() || self.metrics.is_some()
    }

    async fn iteration(&self, ctx: &VuContext) -> LoadResult<()> {
        let report = self.run_once(ctx).await?;
        if let Some(step) = &report.aborted_at {
            tracing::debug!(vu = ctx.vu(), iteration = ctx.iteration(), %step, "iteration ended early");
        }
        Ok(())
    }
}
