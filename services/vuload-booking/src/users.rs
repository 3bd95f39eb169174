//! Login credentials for virtual users

use crate::error::{BookingError, Result};
use csv::ReaderBuilder;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}

impl NewUser {
    const PASSWORD: &'static str = "test1234";

    /// A throwaway account: `user_<8 random characters>@test.com`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let suffix: String = (0..8).map(|_| char::from(rng.sample(Alphanumeric))).collect();
        let username = format!("user_{suffix}");
        Self {
            email: format!("{username}@test.com"),
            username,
            password: Self::PASSWORD.to_string(),
            confirm_password: Self::PASSWORD.to_string(),
        }
    }

    pub fn generate() -> Self {
        Self::random(&mut rand::thread_rng())
    }

    /// Login for the account once registered.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }
}

/// Credentials shared by all VUs; VU `i` logs in as row `i mod len`.
#[derive(Debug, Clone)]
pub struct UserPool {
    users: Arc<[Credentials]>,
}

impl UserPool {
    pub fn single(credentials: Credentials) -> Self {
        Self {
            users: Arc::from(vec![credentials]),
        }
    }

    /// Read a `username,password` CSV with a header row.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let users = reader
            .deserialize::<Credentials>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if users.is_empty() {
            return Err(BookingError::NoUsers {
                path: path.display().to_string(),
            });
        }

        tracing::info!(users = users.len(), path = %path.display(), "loaded users");
        Ok(Self {
            users: Arc::from(users),
        })
    }

    pub fn for_vu(&self, vu: usize) -> &Credentials {
        &self.users[vu % self.users.len()]
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
