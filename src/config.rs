// src/config.rs
use crate::barefoot::{CascadePlan, Credentials, MethodCandidate};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use url::{form_urlencoded, Url};

pub const DEFAULT_ENDPOINT: &str =
    "https://portals.barefoot.com/BarefootWebService/BarefootService.asmx";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub timeout: Duration,
    pub database_path: String,
    pub bind_addr: SocketAddr,
    pub bulk_methods: Vec<MethodCandidate>,
    pub alternative_methods: Vec<MethodCandidate>,
    pub probe_max_id: u32,
    pub probe_max_results: usize,
}

/// Comma list of method names, each optionally followed by a query string of
/// extra parameters: `GetLastUpdatedProperty?lastUpdated=2024-01-01`.
fn method_list(raw: &str) -> Vec<MethodCandidate> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|entry| {
            let (name, query) = entry.split_once('?').unwrap_or((entry, ""));
            form_urlencoded::parse(query.as_bytes())
                .fold(MethodCandidate::new(name.trim()), |candidate, (k, v)| {
                    candidate.with_param(k, v)
                })
        })
        .collect()
}

fn parsed<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let endpoint = get("BAREFOOT_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Url::parse(&endpoint).map_err(|e| ConfigError::Invalid {
            name: "BAREFOOT_ENDPOINT",
            reason: e.to_string(),
        })?;

        let credentials = Credentials {
            endpoint,
            username: required("BAREFOOT_USERNAME")?,
            password: required("BAREFOOT_PASSWORD")?,
            account: required("BAREFOOT_ACCOUNT")?,
        };

        let timeout_secs: u64 = match get("BAREFOOT_TIMEOUT_SECS") {
            Some(raw) => parsed("BAREFOOT_TIMEOUT_SECS", &raw)?,
            None => 30,
        };
        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => parsed("BIND_ADDR", &raw)?,
            None => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };
        let probe_max_id = match get("BAREFOOT_PROBE_MAX_ID") {
            Some(raw) => parsed("BAREFOOT_PROBE_MAX_ID", &raw)?,
            None => 20,
        };
        let probe_max_results = match get("BAREFOOT_PROBE_MAX_RESULTS") {
            Some(raw) => parsed("BAREFOOT_PROBE_MAX_RESULTS", &raw)?,
            None => 10,
        };

        Ok(Config {
            credentials,
            timeout: Duration::from_secs(timeout_secs),
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "barefoot.sqlite3".to_string()),
            bind_addr,
            bulk_methods: method_list(
                &get("BAREFOOT_BULK_METHODS").unwrap_or_else(|| "GetAllProperty".to_string()),
            ),
            alternative_methods: method_list(&get("BAREFOOT_ALTERNATIVE_METHODS").unwrap_or_else(
                || "GetProperty,GetPropertyExt,GetLastUpdatedProperty".to_string(),
            )),
            probe_max_id,
            probe_max_results,
        })
    }

    /// The cascade plan with the configured method lists and probe bounds.
    pub fn plan(&self) -> CascadePlan {
        let mut plan = CascadePlan::default();
        plan.bulk = self.bulk_methods.clone();
        plan.alternatives = self.alternative_methods.clone();
        plan.probe.max_id = self.probe_max_id;
        plan.probe.max_results = self.probe_max_results;
        plan
    }
}
