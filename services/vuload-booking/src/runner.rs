//! Wiring from settings to a finished run

use crate::error::Result;
use crate::scenarios::{
    auth_scenario, crud_scenario, fetch_scenario, health_scenario, mixed_scenario,
    not_found_scenario, ApiTarget, ScenarioKind, StepOptions,
};
use crate::users::UserPool;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use vuload_core::{HttpClient, LoadTest, MetricValue, RunConfig, RunReport};
use vuload_http::ReqwestClient;

/// Process exit code when the run completed but a threshold failed.
pub const EXIT_THRESHOLDS_FAILED: i32 = 99;

/// Process exit code when the run could not start.
pub const EXIT_ERROR: i32 = 1;

/// Everything needed for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub scenario: ScenarioKind,
    pub target: ApiTarget,
    pub users: UserPool,
    pub config: RunConfig,
    /// Think time after each step
    pub pause: Duration,
    /// Page size of the `fetch` scenario
    pub fetch_limit: usize,
}

/// Run against the real API with a reqwest client.
pub async fn run(settings: &RunSettings) -> Result<RunReport> {
    let client = ReqwestClient::from_config(&settings.config.http)?;
    run_with_client(settings, Arc::new(client)).await
}

/// Run with the given HTTP client.
///
/// Configured thresholds replace the scenario defaults.
pub async fn run_with_client(
    settings: &RunSettings,
    client: Arc<dyn HttpClient>,
) -> Result<RunReport> {
    let mut test = LoadTest::from_config(&settings.config)?;
    if settings.config.thresholds.is_empty() {
        test = test.with_thresholds(settings.scenario.default_thresholds()?);
    }

    let options = StepOptions {
        pause: settings.pause,
        backoff: settings.config.backoff(),
    };

    tracing::info!(
        scenario = settings.scenario.name(),
        plan = %test.plan().description(),
        users = settings.users.len(),
        "starting load test"
    );

    let report = match settings.scenario {
        ScenarioKind::Crud => {
            let scenario = crud_scenario(client, &settings.target, settings.users.clone(), &options);
            test.run(scenario).await?
        }
        ScenarioKind::Fetch => {
            let credentials = settings.users.for_vu(0).clone();
            let scenario = fetch_scenario(
                client,
                &settings.target,
                credentials,
                settings.fetch_limit,
                &options,
            );
            test.run(scenario).await?
        }
        ScenarioKind::Health => {
            test.run(health_scenario(client, &settings.target, &options))
                .await?
        }
        ScenarioKind::Auth => test.run(auth_scenario(client, &settings.target, &options)).await?,
        ScenarioKind::NotFound => {
            test.run(not_found_scenario(client, &settings.target, &options))
                .await?
        }
        ScenarioKind::Mixed => {
            test.run(mixed_scenario(client, &settings.target, &options))
                .await?
        }
    };
    Ok(report)
}

/// 0 when every threshold held, [`EXIT_THRESHOLDS_FAILED`] when one did
/// not, [`EXIT_ERROR`] when the run never started.
pub fn exit_code(result: &Result<RunReport>) -> i32 {
    match result {
        Ok(report) if report.passed() => 0,
        Ok(_) => EXIT_THRESHOLDS_FAILED,
        Err(_) => EXIT_ERROR,
    }
}

/// Plain-text end-of-run summary.
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "scenario:     {} ({})", report.scenario, report.run_id);
    let _ = writeln!(
        out,
        "duration:     {:.1}s, peak {} VUs",
        report.elapsed.as_secs_f64(),
        report.peak_vus
    );
    let _ = writeln!(
        out,
        "iterations:   {} ({:.2}/s), {} failed",
        report.iterations,
        report.iterations_per_second(),
        report.failed_iterations
    );

    for (key, value) in report.metrics.iter().filter(|(key, _)| !key.is_tagged()) {
        match value {
            MetricValue::Counter { value } => {
                let _ = writeln!(out, "{key:<28} {value}");
            }
            MetricValue::Rate(rate) => {
                let _ = writeln!(
                    out,
                    "{key:<28} {:.2}% ({} of {})",
                    rate.rate * 100.0,
                    rate.passes,
                    rate.total()
                );
            }
            MetricValue::Trend(trend) => {
                let _ = writeln!(
                    out,
                    "{key:<28} avg={:.1} min={:.1} med={:.1} max={:.1} p(90)={:.1} p(95)={:.1}",
                    trend.avg, trend.min, trend.med, trend.max, trend.p90, trend.p95
                );
            }
        }
    }

    out.push_str("thresholds:\n");
    for result in &report.thresholds.results {
        let _ = writeln!(out, "  {result}");
    }
    let verdict = if report.passed() { "PASSED" } else { "FAILED" };
    let _ = writeln!(out, "result:       {verdict}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookingError;
    use chrono::Utc;
    use vuload_core::scheduler::ScheduleSummary;
    use vuload_core::threshold::{evaluate, Threshold};
    use vuload_core::MetricsRegistry;

    fn report(bound: &str) -> RunReport {
        let registry = MetricsRegistry::new();
        let trend = registry.trend("http_req_duration").unwrap();
        trend.add(120.0);
        trend.add(180.0);
        registry.rate("errors").unwrap().add(false);
        registry.freeze();
        let snapshot = registry.snapshot();
        let thresholds = evaluate(
            &[Threshold::parse("http_req_duration", bound).unwrap()],
            &snapshot,
        );
        RunReport::new(
            "booking-crud",
            Utc::now(),
            ScheduleSummary {
                elapsed: Duration::from_secs(2),
                iterations: 4,
                ..ScheduleSummary::default()
            },
            snapshot,
            thresholds,
        )
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Ok(report("avg<200"))), 0);
        assert_eq!(exit_code(&Ok(report("avg<100"))), EXIT_THRESHOLDS_FAILED);
        assert_eq!(
            exit_code(&Err(BookingError::InvalidArgument("bad".to_string()))),
            EXIT_ERROR
        );
    }

    #[test]
    fn test_summary_lists_metrics_and_thresholds() {
        let summary = render_summary(&report("avg<100"));

        assert!(summary.contains("iterations:   4 (2.00/s), 0 failed"));
        assert!(summary.contains("http_req_duration"));
        assert!(summary.contains("avg=150.0"));
        assert!(summary.contains("errors"));
        assert!(summary.contains("FAILED (actual 150.0000)"));
        assert!(summary.ends_with("result:       FAILED\n"));
    }
}
