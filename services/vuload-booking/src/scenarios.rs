//! Booking API scenarios
//!
//! | Kind      | Iteration                                                         |
//! |-----------|-------------------------------------------------------------------|
//! | `crud`    | login, create, update, list, get and delete a booking, logout     |
//! | `fetch`   | one large page of bookings; login happens once during setup       |
//! | `health`  | `/health`, `/` and `/check-tables`                                |
//! | `auth`    | register a fresh account, login, read the profile, logout         |
//! | `not-found` | an unknown route that must answer 404                           |
//! | `mixed`   | `crud` with a freshly registered account instead of the pool      |
//!
//! Register, login and create are blocking: nothing after them can run
//! without an account, a token or a booking id. Every other step is
//! recorded and the iteration goes on, so a failed profile read still logs
//! out.

use crate::booking::{Booking, BOOKING_FIELDS};
use crate::users::{Credentials, NewUser, UserPool};
use clap::ValueEnum;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use vuload_core::validator;
use vuload_core::{
    Backoff, HttpClient, HttpRequest, HttpResponse, JsonPath, LoadError, LoadResult, Stage,
    StagePlan, Step, StepScenario, Threshold,
};

/// `message` of `GET /` on a healthy server.
const RUNNING_MESSAGE: &str = "NIPA Travel API Server is running!";

/// `message` of `GET /check-tables` when the database answers.
const TABLES_MESSAGE: &str = "Database tables information";

/// `message` of any unknown route.
const NOT_FOUND_MESSAGE: &str = "Route not found";

/// Which scenario to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Create, update, read and delete a booking per iteration
    Crud,
    /// Fetch a large page of bookings per iteration
    Fetch,
    /// Probe the health, status and database endpoints
    Health,
    /// Register, login, read the profile and logout
    Auth,
    /// Request unknown routes and expect 404
    NotFound,
    /// Register a new account, then run the booking lifecycle with it
    Mixed,
}

impl ScenarioKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Crud => "booking-crud",
            Self::Fetch => "booking-fetch",
            Self::Health => "health-check",
            Self::Auth => "authentication",
            Self::NotFound => "not-found",
            Self::Mixed => "mixed-workload",
        }
    }

    /// Thresholds used when the configuration declares none.
    pub fn default_thresholds(&self) -> LoadResult<Vec<Threshold>> {
        let mut thresholds = vec![
            Threshold::parse("http_req_duration", "p(95)<500")?,
            Threshold::parse("http_req_duration", "p(99)<1000")?,
            Threshold::parse("errors", "rate<0.05")?,
        ];
        match self {
            Self::Fetch => thresholds.push(Threshold::parse("fetch_duration", "avg<800")?),
            Self::NotFound => thresholds.push(Threshold::parse("latency_404", "p(95)<500")?),
            _ => {}
        }
        Ok(thresholds)
    }

    /// Plan used when neither a config file nor the command line sets one.
    pub fn default_plan(&self) -> StagePlan {
        let secs = Duration::from_secs;
        match self {
            Self::Crud | Self::Fetch | Self::Auth | Self::Mixed => StagePlan::fixed(50, secs(60)),
            Self::Health | Self::NotFound => StagePlan::new(vec![
                Stage::new(secs(30), 10),
                Stage::new(secs(60), 10),
                Stage::new(secs(20), 0),
            ]),
        }
    }
}

/// Base URL of the booking API, e.g. `http://localhost/api`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTarget {
    base_url: String,
}

impl ApiTarget {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Step settings shared by every scenario.
#[derive(Debug, Clone)]
pub struct StepOptions {
    /// Think time after each step
    pub pause: Duration,
    pub backoff: Backoff,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            pause: Duration::from_secs(1),
            backoff: Backoff::default(),
        }
    }
}

/// State with a login session.
pub trait Session: Clone + Send + Sync + 'static {
    fn credentials(&self) -> &Credentials;
    fn token(&self) -> Option<&str>;
    fn set_token(&mut self, token: String);

    /// Account the `register` step creates, when the scenario registers.
    fn registration(&self) -> Option<&NewUser> {
        None
    }
}

/// Per-iteration state of the `crud` and `mixed` scenarios.
#[derive(Debug, Clone, Default)]
pub struct CrudState {
    pub credentials: Credentials,
    pub token: Option<String>,
    /// Account registered by `mixed`
    pub registration: Option<NewUser>,
    /// Body of the create request
    pub booking: Option<Booking>,
    /// Body of the update request
    pub update: Option<Booking>,
    /// Id assigned by the API on create
    pub booking_id: Option<String>,
}

impl Session for CrudState {
    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    fn registration(&self) -> Option<&NewUser> {
        self.registration.as_ref()
    }
}

/// State of the `fetch` scenario; the token comes from setup.
#[derive(Debug, Clone, Default)]
pub struct FetchState {
    pub credentials: Credentials,
    pub token: Option<String>,
}

impl Session for FetchState {
    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }
}

/// Per-iteration state of the `auth` scenario.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub user: NewUser,
    pub credentials: Credentials,
    pub token: Option<String>,
}

impl Session for AuthState {
    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    fn registration(&self) -> Option<&NewUser> {
        Some(&self.user)
    }
}

fn missing(what: &str) -> LoadError {
    LoadError::Request(format!("no {what} captured"))
}

fn bearer<S: Session>(state: &S) -> LoadResult<&str> {
    state.token().ok_or_else(|| missing("session token"))
}

fn booking_id(state: &CrudState) -> LoadResult<&str> {
    state.booking_id.as_deref().ok_or_else(|| missing("booking id"))
}

fn with_json<T: Serialize>(request: HttpRequest, body: &T) -> LoadResult<HttpRequest> {
    request
        .json(body)
        .map_err(|e| LoadError::Request(format!("failed to encode body: {e}")))
}

fn has_body(response: &HttpResponse) -> bool {
    !response.body.is_empty()
}

fn success(response: &HttpResponse) -> bool {
    response
        .json()
        .and_then(|body| body.bool_at("success"))
        .unwrap_or(false)
}

/// The JSON string at `path` equals `expected`.
fn text_is(response: &HttpResponse, path: &str, expected: &str) -> bool {
    response
        .json()
        .map(|body| body.str_at(path) == Ok(expected))
        .unwrap_or(false)
}

/// The booking in `data.booking` matches what was sent.
fn echoes(sent: Option<&Booking>, response: &HttpResponse) -> bool {
    let (Some(sent), Ok(body)) = (sent, response.json()) else {
        return false;
    };
    let expected = sent.to_record();
    let actual = body.object_at("data.booking").ok();
    if validator::equal(&expected, actual, &BOOKING_FIELDS) {
        return true;
    }
    if let Some(actual) = actual {
        for mismatch in validator::mismatches(&expected, actual, &BOOKING_FIELDS) {
            tracing::debug!(
                field = %mismatch.field,
                expected = ?mismatch.expected,
                actual = ?mismatch.actual,
                "booking field differs"
            );
        }
    }
    false
}

fn register_step<S: Session>(target: &ApiTarget, pause: Duration) -> Step<S> {
    let url = target.url("/auth/register");
    Step::new("register", move |s: &S| {
        let user = s.registration().ok_or_else(|| missing("registration"))?;
        with_json(HttpRequest::post(url.as_str()), user)
    })
    .blocking()
    .trend("register_latency")
    .check("register: status is 201", |_, r| r.status == 201)
    .check("register: has body", |_, r| has_body(r))
    .check("register: user id exists", |_, r| {
        r.json().map(|b| b.id_at("data.user.id").is_ok()).unwrap_or(false)
    })
    .pause(pause)
}

fn login_step<S: Session>(target: &ApiTarget, pause: Duration) -> Step<S> {
    let url = target.url("/auth/login");
    Step::new("login", move |s: &S| {
        with_json(HttpRequest::post(url.as_str()), s.credentials())
    })
    .blocking()
    .trend("login_latency")
    .check("login: status is 200", |_, r| r.status == 200)
    .check("login: has body", |_, r| has_body(r))
    .check("login: token exists", |_, r| {
        r.json().map(|b| b.str_at("data.token").is_ok()).unwrap_or(false)
    })
    .capture(|s: &mut S, r| {
        s.set_token(r.json()?.str_at("data.token")?.to_string());
        Ok(())
    })
    .pause(pause)
}

fn logout_step<S: Session>(target: &ApiTarget, pause: Duration) -> Step<S> {
    let url = target.url("/auth/logout");
    Step::new("logout", move |s: &S| {
        Ok(HttpRequest::post(url.as_str()).bearer(bearer(s)?))
    })
    .trend("logout_latency")
    .check("logout: status is 200", |_, r| r.status == 200)
    .pause(pause)
}

/// Create, update, list, get and delete, in that order.
fn booking_steps(target: &ApiTarget, pause: Duration) -> Vec<Step<CrudState>> {
    let bookings = target.url("/bookings");

    let create = {
        let url = bookings.clone();
        Step::new("create_booking", move |s: &CrudState| {
            let booking = s.booking.as_ref().ok_or_else(|| missing("booking payload"))?;
            with_json(HttpRequest::post(url.as_str()).bearer(bearer(s)?), booking)
        })
        .blocking()
        .trend("create_booking_latency")
        .check("create booking: status is 201", |_, r| r.status == 201)
        .check("create booking: has body", |_, r| has_body(r))
        .check("create booking: success", |_, r| success(r))
        .check("create booking: accuracy of data", |s, r| echoes(s.booking.as_ref(), r))
        .capture(|s: &mut CrudState, r| {
            s.booking_id = Some(r.json()?.id_at("data.booking.id")?);
            Ok(())
        })
        .pause(pause)
    };

    let update = {
        let url = bookings.clone();
        Step::new("update_booking", move |s: &CrudState| {
            let booking = s.update.as_ref().ok_or_else(|| missing("update payload"))?;
            let request = HttpRequest::put(format!("{url}/{}", booking_id(s)?)).bearer(bearer(s)?);
            with_json(request, booking)
        })
        .trend("update_booking_latency")
        .check("update booking: status is 200", |_, r| r.status == 200)
        .check("update booking: has body", |_, r| has_body(r))
        .check("update booking: success", |_, r| success(r))
        .check("update booking: accuracy of data", |s, r| echoes(s.update.as_ref(), r))
        .pause(pause)
    };

    let list = {
        let url = bookings.clone();
        Step::new("list_bookings", move |s: &CrudState| {
            Ok(HttpRequest::get(url.as_str()).bearer(bearer(s)?))
        })
        .trend("get_booking_latency")
        .check("list bookings: status is 200", |_, r| r.status == 200)
        .check("list bookings: has body", |_, r| has_body(r))
        .check("list bookings: success", |_, r| success(r))
        .pause(pause)
    };

    let get = {
        let url = bookings.clone();
        Step::new("get_booking", move |s: &CrudState| {
            Ok(HttpRequest::get(format!("{url}/{}", booking_id(s)?)).bearer(bearer(s)?))
        })
        .trend("get_booking_id_latency")
        .check("get booking: status is 200", |_, r| r.status == 200)
        .check("get booking: has body", |_, r| has_body(r))
        .check("get booking: accuracy of data", |s, r| {
            let id = r.json().and_then(|b| b.id_at("data.booking.id"));
            matches!((id, s.booking_id.as_deref()), (Ok(id), Some(expected)) if id == expected)
        })
        .pause(pause)
    };

    let delete = {
        let url = bookings;
        Step::new("delete_booking", move |s: &CrudState| {
            Ok(HttpRequest::delete(format!("{url}/{}", booking_id(s)?)).bearer(bearer(s)?))
        })
        .trend("delete_booking_latency")
        .check("delete booking: status is 200", |_, r| r.status == 200)
        .check("delete booking: has body", |_, r| has_body(r))
        .check("delete booking: success", |_, r| success(r))
        .check("delete booking: accuracy of data", |s, r| {
            let id = r.json().and_then(|b| b.id_at("data.deleted_booking_id"));
            matches!((id, s.booking_id.as_deref()), (Ok(id), Some(expected)) if id == expected)
        })
        .pause(pause)
    };

    vec![create, update, list, get, delete]
}

fn with_steps<S>(scenario: StepScenario<S>, steps: Vec<Step<S>>) -> StepScenario<S>
where
    S: Clone + Send + Sync + 'static,
{
    steps.into_iter().fold(scenario, StepScenario::step)
}

/// Full booking lifecycle per iteration, logged in from the user pool.
pub fn crud_scenario(
    client: Arc<dyn HttpClient>,
    target: &ApiTarget,
    users: UserPool,
    options: &StepOptions,
) -> StepScenario<CrudState> {
    let pause = options.pause;
    let scenario = StepScenario::new(ScenarioKind::Crud.name(), client, CrudState::default())
        .with_backoff(options.backoff)
        .init(move |s, ctx| {
            s.credentials = users.for_vu(ctx.vu()).clone();
            s.booking = Some(Booking::generate());
            s.update = Some(Booking::generate());
        })
        .step(login_step(target, pause));
    with_steps(scenario, booking_steps(target, pause)).step(logout_step(target, pause))
}

/// The booking lifecycle behind a registration of a fresh account.
pub fn mixed_scenario(
    client: Arc<dyn HttpClient>,
    target: &ApiTarget,
    options: &StepOptions,
) -> StepScenario<CrudState> {
    let pause = options.pause;
    let scenario = StepScenario::new(ScenarioKind::Mixed.name(), client, CrudState::default())
        .with_backoff(options.backoff)
        .init(|s, _| {
            let user = NewUser::generate();
            s.credentials = user.credentials();
            s.registration = Some(user);
            s.booking = Some(Booking::generate());
            s.update = Some(Booking::generate());
        })
        .step(register_step(target, pause))
        .step(login_step(target, pause));
    with_steps(scenario, booking_steps(target, pause)).step(logout_step(target, pause))
}

/// One login during setup, then `GET /bookings/all?limit=<limit>` per
/// iteration.
pub fn fetch_scenario(
    client: Arc<dyn HttpClient>,
    target: &ApiTarget,
    credentials: Credentials,
    limit: usize,
    options: &StepOptions,
) -> StepScenario<FetchState> {
    let url = target.url(&format!("/bookings/all?limit={limit}"));
    let at_least = format!("fetch: at least {limit} bookings");

    let fetch = Step::new("fetch_bookings", move |s: &FetchState| {
        Ok(HttpRequest::get(url.as_str()).bearer(bearer(s)?))
    })
    .trend("fetch_duration")
    .check("fetch: status is 200", |_, r| r.status == 200)
    .check(at_least, move |_, r| {
        r.json()
            .and_then(|b| b.array_at("data.bookings").map(Vec::len))
            .map_or(false, |count| count >= limit)
    })
    .pause(options.pause);

    let template = FetchState {
        credentials,
        token: None,
    };
    StepScenario::new(ScenarioKind::Fetch.name(), client, template)
        .with_backoff(options.backoff)
        .setup_step(login_step(target, Duration::ZERO))
        .step(fetch)
}

/// Register a fresh account, login, read the profile and logout.
pub fn auth_scenario(
    client: Arc<dyn HttpClient>,
    target: &ApiTarget,
    options: &StepOptions,
) -> StepScenario<AuthState> {
    let pause = options.pause;
    let profile_url = target.url("/auth/profile");

    let profile = Step::new("profile", move |s: &AuthState| {
        Ok(HttpRequest::get(profile_url.as_str()).bearer(bearer(s)?))
    })
    .trend("profile_latency")
    .check("profile: status is 200", |_, r| r.status == 200)
    .check("profile: user data present", |s, r| {
        text_is(r, "data.user.email", &s.user.email)
    })
    .pause(pause);

    StepScenario::new(ScenarioKind::Auth.name(), client, AuthState::default())
        .with_backoff(options.backoff)
        .init(|s, _| {
            s.user = NewUser::generate();
            s.credentials = s.user.credentials();
        })
        .step(register_step(target, pause))
        .step(login_step(target, pause))
        .step(profile)
        .step(logout_step(target, pause))
}

/// Health, server status and database checks; no session.
pub fn health_scenario(
    client: Arc<dyn HttpClient>,
    target: &ApiTarget,
    options: &StepOptions,
) -> StepScenario<()> {
    let pause = options.pause;
    let get = |name: &str, path: &str, trend: &str| {
        let url = target.url(path);
        Step::new(name, move |_: &()| Ok(HttpRequest::get(url.as_str())))
            .trend(trend)
            .pause(pause)
    };

    let health = get("health", "/health", "health_check_latency")
        .check("health: status is 200", |_, r| r.status == 200)
        .check("health: status is healthy", |_, r| text_is(r, "status", "healthy"));
    let system = get("system_status", "/", "system_status_latency")
        .check("system: status is 200", |_, r| r.status == 200)
        .check("system: server is running", |_, r| text_is(r, "message", RUNNING_MESSAGE));
    let database = get("database_check", "/check-tables", "database_check_latency")
        .check("database: status is 200", |_, r| r.status == 200)
        .check("database: tables listed", |_, r| text_is(r, "message", TABLES_MESSAGE));

    StepScenario::new(ScenarioKind::Health.name(), client, ())
        .with_backoff(options.backoff)
        .step(health)
        .step(system)
        .step(database)
}

/// Per-iteration state of the `not-found` scenario.
#[derive(Debug, Clone, Default)]
pub struct NotFoundState {
    /// Unknown route relative to the base URL, e.g. `/ghost-417`
    pub path: String,
}

/// `/<word>-<n>`, a route the API does not serve.
fn unknown_path<R: Rng + ?Sized>(rng: &mut R) -> String {
    const WORDS: [&str; 8] = ["foo", "bar", "baz", "test", "invalid", "missing", "ghost", "fake"];
    let word = WORDS.choose(rng).copied().unwrap_or("missing");
    format!("/{word}-{}", rng.gen_range(0..1000))
}

/// Unknown routes must answer 404 with the API's not-found message.
pub fn not_found_scenario(
    client: Arc<dyn HttpClient>,
    target: &ApiTarget,
    options: &StepOptions,
) -> StepScenario<NotFoundState> {
    let base = target.clone();
    let step = Step::new("not_found", move |s: &NotFoundState| {
        Ok(HttpRequest::get(base.url(&s.path)))
    })
    .trend("latency_404")
    .check("404: status is 404", |_, r| r.status == 404)
    .check("404: route not found", |_, r| text_is(r, "message", NOT_FOUND_MESSAGE))
    .pause(options.pause);

    StepScenario::new(ScenarioKind::NotFound.name(), client, NotFoundState::default())
        .with_backoff(options.backoff)
        .init(|s, _| s.path = unknown_path(&mut rand::thread_rng()))
        .step(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_joins_paths() {
        let target = ApiTarget::new("http://localhost/api/");

        assert_eq!(target.url("/auth/login"), "http://localhost/api/auth/login");
        assert_eq!(target.url("bookings/7"), "http://localhost/api/bookings/7");
    }

    #[test]
    fn test_default_thresholds() {
        let crud = ScenarioKind::Crud.default_thresholds().unwrap();
        let fetch = ScenarioKind::Fetch.default_thresholds().unwrap();

        assert_eq!(crud.len(), 3);
        assert_eq!(fetch.len(), 4);
        assert_eq!(fetch[3].metric.name(), "fetch_duration");
    }

    #[test]
    fn test_echo_requires_matching_booking() {
        let sent = Booking::generate();
        let mut echoed = sent.to_record();
        echoed.insert("id".to_string(), 42.into());
        let body = serde_json::json!({ "success": true, "data": { "booking": echoed } });
        let response = HttpResponse::new(201, body.to_string(), Duration::from_millis(3));

        assert!(echoes(Some(&sent), &response));
        assert!(!echoes(None, &response));

        let other = HttpResponse::new(201, "{\"data\":{}}", Duration::from_millis(3));
        assert!(!echoes(Some(&sent), &other));
    }

    struct Never;

    #[async_trait::async_trait]
    impl HttpClient for Never {
        async fn send(&self, _request: HttpRequest) -> HttpResponse {
            HttpResponse::transport_failure("unused", Duration::ZERO)
        }
    }

    fn names<S>(scenario: &StepScenario<S>) -> Vec<&str>
    where
        S: Clone + Send + Sync + 'static,
    {
        scenario.steps().iter().map(|s| s.name()).collect()
    }

    fn blocking<S>(scenario: &StepScenario<S>) -> Vec<bool>
    where
        S: Clone + Send + Sync + 'static,
    {
        scenario.steps().iter().map(|s| s.is_blocking()).collect()
    }

    #[test]
    fn test_crud_steps_in_order() {
        let scenario = crud_scenario(
            Arc::new(Never),
            &ApiTarget::new("http://localhost/api"),
            UserPool::single(Credentials::new("admin", "password")),
            &StepOptions::default(),
        );

        let names: Vec<&str> = scenario.steps().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            [
                "login",
                "create_booking",
                "update_booking",
                "list_bookings",
                "get_booking",
                "delete_booking",
                "logout"
            ]
        );
        assert!(scenario.steps()[0].is_blocking());
        assert!(scenario.steps()[1].is_blocking());
        assert!(!scenario.steps()[2].is_blocking());
    }

    #[test]
    fn test_auth_logout_does_not_depend_on_profile() {
        let target = ApiTarget::new("http://localhost/api");
        let scenario = auth_scenario(Arc::new(Never), &target, &StepOptions::default());

        assert_eq!(names(&scenario), ["register", "login", "profile", "logout"]);
        assert_eq!(blocking(&scenario), [true, true, false, false]);
    }

    #[test]
    fn test_mixed_registers_before_the_booking_lifecycle() {
        let target = ApiTarget::new("http://localhost/api");
        let scenario = mixed_scenario(Arc::new(Never), &target, &StepOptions::default());

        let steps = names(&scenario);
        assert_eq!(steps.len(), 8);
        assert_eq!(steps[..3], ["register", "login", "create_booking"]);
        assert_eq!(steps.last(), Some(&"logout"));
        assert_eq!(blocking(&scenario)[..4], [true, true, true, false]);
    }

    #[test]
    fn test_health_and_not_found_steps() {
        let target = ApiTarget::new("http://localhost/api");
        let options = StepOptions::default();

        let health = health_scenario(Arc::new(Never), &target, &options);
        assert_eq!(names(&health), ["health", "system_status", "database_check"]);
        assert!(health.steps().iter().all(|s| s.checks().len() == 2));

        let not_found = not_found_scenario(Arc::new(Never), &target, &options);
        assert_eq!(names(&not_found), ["not_found"]);
        assert_eq!(not_found.steps()[0].checks()[0].name(), "404: status is 404");
    }

    #[test]
    fn test_unknown_paths() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let path = unknown_path(&mut rng);
            let (word, number) = path[1..].rsplit_once('-').unwrap();
            assert!(path.starts_with('/'));
            assert!(!word.is_empty());
            assert!(number.parse::<u32>().unwrap() < 1000);
        }
    }

    #[test]
    fn test_default_plans() {
        assert_eq!(
            ScenarioKind::Crud.default_plan(),
            StagePlan::fixed(50, Duration::from_secs(60))
        );
        let health = ScenarioKind::Health.default_plan();
        assert_eq!(health.total_duration(), Duration::from_secs(110));
        assert_eq!(health.max_target(), 10);
        assert_eq!(ScenarioKind::NotFound.default_plan(), health);
        assert_eq!(
            ScenarioKind::NotFound.default_thresholds().unwrap()[3].metric.name(),
            "latency_404"
        );
    }
}
