//! Environment-driven service configuration, read once at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Service constants.
pub const APP_NAME: &str = "Orienta";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,orienta=debug"
}

/// Everything the binary needs from the environment. Invalid values fall
/// back to defaults with a warning; a typo in a limit must not keep the
/// service down.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// OpenAI-compatible chat-completions endpoint.
    pub model_base_url: String,
    pub model_api_key: String,
    pub primary_model: String,
    pub fallback_model: Option<String>,
    pub model_timeout: Duration,
    /// Additional attempts per model after the first.
    pub model_retries: u32,
    pub backoff_base: Duration,
    pub patient_per_minute: u32,
    pub ip_per_minute: u32,
    /// Presence selects the shared-store rate limiter.
    pub redis_url: Option<String>,
    pub safety_policy_path: PathBuf,
    pub age_policy_path: PathBuf,
    /// Optional JSONL audit destination; absent means tracing-only.
    pub audit_log_path: Option<PathBuf>,
    /// Optional encounter seed file for deployments without a live feed.
    pub encounters_path: Option<PathBuf>,
    pub pseudonym_salt: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_parsed("ORIENTA_BIND", SocketAddr::from(([0, 0, 0, 0], 8080))),
            model_base_url: env_string("ORIENTA_MODEL_BASE_URL", "https://api.openai.com/v1"),
            model_api_key: env_string("ORIENTA_MODEL_API_KEY", ""),
            primary_model: env_string("ORIENTA_MODEL", "gpt-4o-mini"),
            fallback_model: std::env::var("ORIENTA_FALLBACK_MODEL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            model_timeout: Duration::from_millis(env_parsed("ORIENTA_MODEL_TIMEOUT_MS", 15_000)),
            model_retries: env_parsed("ORIENTA_MODEL_RETRIES", 2),
            backoff_base: Duration::from_millis(env_parsed("ORIENTA_BACKOFF_BASE_MS", 250)),
            patient_per_minute: env_parsed("RL_PATIENT_PER_MIN", 12),
            ip_per_minute: env_parsed("RL_IP_PER_MIN", 60),
            redis_url: std::env::var("REDIS_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            safety_policy_path: env_parsed(
                "ORIENTA_SAFETY_POLICY",
                PathBuf::from("config/safety_policies.yaml"),
            ),
            age_policy_path: env_parsed(
                "ORIENTA_AGE_POLICY",
                PathBuf::from("config/consultation_age_policy.yaml"),
            ),
            audit_log_path: std::env::var("ORIENTA_AUDIT_LOG").ok().map(PathBuf::from),
            encounters_path: std::env::var("ORIENTA_ENCOUNTERS").ok().map(PathBuf::from),
            pseudonym_salt: env_string("PSEUDONYM_SALT", "change-me"),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parsed<T: std::str::FromStr + Clone>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Err(_) => default,
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "Unparseable value, using default");
                default
            }
        },
    }
}
