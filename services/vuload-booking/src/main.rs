use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use vuload_booking::runner::{self, EXIT_ERROR};
use vuload_booking::{
    ApiTarget, BookingError, Credentials, Result, RunSettings, ScenarioKind, UserPool,
};
use vuload_core::{LoadError, RunConfig, StageConfig};

#[derive(Parser, Debug)]
#[command(name = "vuload-booking")]
#[command(about = "Staged load test against the flight booking API", long_about = None)]
#[command(version)]
struct Cli {
    /// Scenario to run. Without a config file, --vus or --duration it uses
    /// its own stage plan.
    #[arg(value_enum)]
    scenario: ScenarioKind,

    /// Run configuration file (TOML, YAML or JSON)
    #[arg(long, env = "VULOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the booking API
    #[arg(long, env = "BASE_URL", default_value = "http://localhost/api")]
    base_url: String,

    /// CSV file with `username,password` rows; VU i logs in as row i mod len.
    /// Takes precedence over --username/--password.
    #[arg(long)]
    users: Option<PathBuf>,

    /// Login used by every VU when no users file is given
    #[arg(long, env = "VULOAD_USERNAME", default_value = "admin")]
    username: String,

    #[arg(long, env = "VULOAD_PASSWORD", default_value = "password")]
    password: String,

    /// Fixed number of VUs; replaces configured stages
    #[arg(long)]
    vus: Option<u32>,

    /// Fixed run length such as `30s` or `1m30s`; replaces configured stages
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Think time after each step in milliseconds
    #[arg(long, default_value = "1000")]
    pause_ms: u64,

    /// Bookings requested per fetch iteration
    #[arg(long, default_value = "500")]
    limit: usize,

    /// Write the JSON run report to this path
    #[arg(long)]
    summary: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();

    let result = match settings(&cli) {
        Ok(settings) => runner::run(&settings).await,
        Err(e) => Err(e),
    };

    let mut code = runner::exit_code(&result);
    match &result {
        Ok(report) => {
            println!("\n{}", runner::render_summary(report));
            if let Some(path) = &cli.summary {
                match report.write_json(path) {
                    Ok(()) => info!("Run report written to {}", path.display()),
                    Err(e) => {
                        error!("Failed to write run report to {}: {}", path.display(), e);
                        code = EXIT_ERROR;
                    }
                }
            }
        }
        Err(e) => eprintln!("\nLoad test did not run: {e}"),
    }

    std::process::exit(code);
}

/// Configuration file and environment, then command-line overrides.
fn settings(cli: &Cli) -> Result<RunSettings> {
    let mut config = RunConfig::load_from(cli.config.as_deref()).map_err(LoadError::from)?;

    if cli.vus.is_some() || cli.duration.is_some() {
        config.stages.clear();
    } else if cli.config.is_none() && config.stages.is_empty() && !plan_in_environment() {
        config.stages = cli
            .scenario
            .default_plan()
            .stages()
            .iter()
            .map(|stage| StageConfig {
                duration: stage.duration,
                target: stage.target,
            })
            .collect();
    }
    if let Some(vus) = cli.vus {
        config.vus = vus;
    }
    if let Some(duration) = cli.duration {
        config.duration = duration;
    }
    config.validate().map_err(LoadError::from)?;

    if cli.limit == 0 {
        return Err(BookingError::InvalidArgument(
            "--limit must be > 0".to_string(),
        ));
    }

    let users = match &cli.users {
        Some(path) => UserPool::from_csv(path)?,
        None => UserPool::single(Credentials::new(&cli.username, &cli.password)),
    };

    info!("Target: {}", cli.base_url);
    info!("Scenario: {}", cli.scenario.name());

    Ok(RunSettings {
        scenario: cli.scenario,
        target: ApiTarget::new(&cli.base_url),
        users,
        config,
        pause: Duration::from_millis(cli.pause_ms),
        fetch_limit: cli.limit,
    })
}

/// The environment sets the run length or concurrency.
fn plan_in_environment() -> bool {
    ["VULOAD__VUS", "VULOAD__DURATION", "VULOAD__STAGES"]
        .iter()
        .any(|key| std::env::var_os(key).is_some())
}

/// Initialize logging
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}
