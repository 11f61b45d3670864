//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Sensitive values wrapped in secrecy::SecretString to prevent
//! log leaks.

pub mod secrets;

use crate::engine::LifecycleConfig;
use crate::error::{Error, Result};
use crate::gate::ScheduleGate;
use chrono::NaiveTime;
use secrecy::SecretString;
use std::time::Duration;

const DEFAULT_OPENS_AT: &str = "08:00";
const DEFAULT_CLOSES_AT: &str = "20:00";

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub requeue_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from explicit pairs instead of the process environment.
    pub fn from_vars<'a, I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let vars: Vec<(&str, &str)> = vars.into_iter().collect();
        Self::from_lookup(|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        })
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })?;

        let opens_at = lookup("SERVICE_OPENS_AT").unwrap_or_else(|| DEFAULT_OPENS_AT.to_string());
        let closes_at =
            lookup("SERVICE_CLOSES_AT").unwrap_or_else(|| DEFAULT_CLOSES_AT.to_string());

        let requeue_timeout = lookup("REQUEUE_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                    Error::Config(format!("REQUEUE_TIMEOUT_SECS must be whole seconds, got {raw:?}"))
                })
            })
            .transpose()?;

        Ok(Self {
            database_url: SecretString::from(database_url),
            otel_endpoint: lookup("OTEL_ENDPOINT"),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            opens_at: parse_time("SERVICE_OPENS_AT", &opens_at)?,
            closes_at: parse_time("SERVICE_CLOSES_AT", &closes_at)?,
            requeue_timeout,
        })
    }

    pub fn schedule(&self) -> ScheduleGate {
        ScheduleGate::new(self.opens_at, self.closes_at)
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            requeue_timeout: self.requeue_timeout,
        }
    }
}

fn parse_time(name: &str, raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|e| Error::Config(format!("{name} must be HH:MM, got {raw:?}: {e}")))
}
