//! Environment overrides on top of a config file.
//!
//! Kept as a single test in its own binary: it mutates process environment.

use std::io::Write;
use std::time::Duration;
use vuload_core::{RunConfig, StagePlan};

#[test]
fn environment_overrides_file_values() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(
        br#"
name = "fetch"
vus = 5
duration = "1m"

[scheduler]
tick_ms = 250
"#,
    )
    .unwrap();

    std::env::set_var("VULOAD__VUS", "12");
    std::env::set_var("VULOAD__SCHEDULER__TICK_MS", "50");
    std::env::set_var("VULOAD__HTTP__TIMEOUT_MS", "2000");

    let config = RunConfig::load_from(Some(file.path())).unwrap();

    assert_eq!(config.name, "fetch");
    assert_eq!(config.stage_plan(), StagePlan::fixed(12, Duration::from_secs(60)));
    assert_eq!(config.scheduler.tick(), Duration::from_millis(50));
    assert_eq!(config.http.timeout(), Duration::from_secs(2));
    // Not overridden anywhere.
    assert_eq!(config.retry.max_attempts, 3);

    // An override that breaks validation is rejected.
    std::env::set_var("VULOAD__RETRY__MAX_ATTEMPTS", "0");
    assert!(RunConfig::load_from(Some(file.path())).is_err());

    for key in [
        "VULOAD__VUS",
        "VULOAD__SCHEDULER__TICK_MS",
        "VULOAD__HTTP__TIMEOUT_MS",
        "VULOAD__RETRY__MAX_ATTEMPTS",
    ] {
        std::env::remove_var(key);
    }
}
