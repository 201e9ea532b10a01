use anyhow::{Context, Result, bail};
use std::time::Duration;

// -------------------------
// Service configuration
// -------------------------

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_REST_BASE: &str = "http://localhost:8000/api/v1";
const DEFAULT_POLL_MS: u64 = 1_000;
const DEFAULT_STREAM_CAP_SECS: u64 = 300;

/// Which control-plane backend to talk to, fixed once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneConfig {
    Rest { base_url: String, token: Option<String> },
    Supabase { base_url: String, service_key: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub control: ControlPlaneConfig,
    pub poll_interval: Duration,
    pub stream_cap: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Lookup is injected so the parsing logic is testable without touching
    /// process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = get("PERCH_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());

        let backend = get("PERCH_CONTROL").unwrap_or_else(|| "rest".to_string());
        let control = match backend.as_str() {
            "rest" => ControlPlaneConfig::Rest {
                base_url: get("PERCH_API_URL")
                    .unwrap_or_else(|| DEFAULT_REST_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                token: get("PERCH_API_TOKEN").filter(|t| !t.is_empty()),
            },
            "supabase" => ControlPlaneConfig::Supabase {
                base_url: get("PERCH_SUPABASE_URL")
                    .context("PERCH_CONTROL=supabase requires PERCH_SUPABASE_URL")?
                    .trim_end_matches('/')
                    .to_string(),
                service_key: get("PERCH_SUPABASE_KEY")
                    .context("PERCH_CONTROL=supabase requires PERCH_SUPABASE_KEY")?,
            },
            other => bail!("unknown PERCH_CONTROL backend: {other:?} (expected rest|supabase)"),
        };

        let poll_ms = match get("PERCH_POLL_MS") {
            Some(raw) => raw.parse::<u64>().context("PERCH_POLL_MS must be an integer")?,
            None => DEFAULT_POLL_MS,
        };
        let cap_secs = match get("PERCH_STREAM_CAP_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("PERCH_STREAM_CAP_SECS must be an integer")?,
            None => DEFAULT_STREAM_CAP_SECS,
        };

        Ok(Self {
            bind_addr,
            control,
            poll_interval: Duration::from_millis(poll_ms.max(100)),
            stream_cap: Duration::from_secs(cap_secs.max(1)),
        })
    }
}

// -------------------------
// Tests
// -------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_rest_backend() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND);
        assert_eq!(
            cfg.control,
            ControlPlaneConfig::Rest { base_url: DEFAULT_REST_BASE.into(), token: None }
        );
        assert_eq!(cfg.poll_interval, Duration::from_millis(1000));
        assert_eq!(cfg.stream_cap, Duration::from_secs(300));
    }

    #[test]
    fn supabase_backend_requires_url_and_key() {
        assert!(Config::from_lookup(lookup(&[("PERCH_CONTROL", "supabase")])).is_err());

        let cfg = Config::from_lookup(lookup(&[
            ("PERCH_CONTROL", "supabase"),
            ("PERCH_SUPABASE_URL", "https://abc.supabase.co/"),
            ("PERCH_SUPABASE_KEY", "service-key"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.control,
            ControlPlaneConfig::Supabase {
                base_url: "https://abc.supabase.co".into(),
                service_key: "service-key".into(),
            }
        );
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(Config::from_lookup(lookup(&[("PERCH_CONTROL", "graphql")])).is_err());
    }

    #[test]
    fn poll_interval_has_a_floor() {
        let cfg = Config::from_lookup(lookup(&[("PERCH_POLL_MS", "5")])).unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn blank_token_is_dropped() {
        let cfg = Config::from_lookup(lookup(&[("PERCH_API_TOKEN", "")])).unwrap();
        match cfg.control {
            ControlPlaneConfig::Rest { token, .. } => assert!(token.is_none()),
            other => panic!("unexpected backend: {other:?}"),
        }
    }
}
