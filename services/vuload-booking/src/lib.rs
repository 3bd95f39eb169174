//! Load client for the flight booking API, built on `vuload-core`.

pub mod booking;
pub mod error;
pub mod runner;
pub mod scenarios;
pub mod users;

pub use booking::{Booking, BOOKING_FIELDS};
pub use error::{BookingError, Result};
pub use runner::{exit_code, render_summary, run, run_with_client, RunSettings};
pub use scenarios::{ApiTarget, ScenarioKind, StepOptions};
pub use users::{Credentials, UserPool};
