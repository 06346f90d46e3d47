//! pdk-config
//!
//! Environment-driven configuration for the PaperDesk services.
//!
//! All recognized variables are read once at startup into a typed [`Config`].
//! Secrets (the JWT signing key, the database URL) are carried in the struct
//! but excluded from [`Config::fingerprint`], which hashes the canonical JSON
//! of the non-secret subset so operators can compare deployed configs without
//! leaking credentials into logs.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const ENV_PORT: &str = "PDK_PORT";
pub const ENV_JWT_SECRET: &str = "PDK_JWT_SECRET";
pub const ENV_DATABASE_URL: &str = "PDK_DATABASE_URL";
pub const ENV_UPSTREAM_MARKET_URL: &str = "PDK_UPSTREAM_MARKET_URL";
pub const ENV_RUN_MODE: &str = "PDK_ENV";
pub const ENV_DEFAULT_SYMBOL: &str = "PDK_DEFAULT_SYMBOL";
pub const ENV_ENGINE_TICK_SECS: &str = "PDK_ENGINE_TICK_SECS";

/// Deployment mode.
///
/// `Development` permits the market-data provider to degrade to deterministic
/// synthetic data when the upstream source is unavailable. `Production`
/// surfaces upstream errors to callers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Development => "development",
            RunMode::Production => "production",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RunMode::Development),
            "production" | "prod" => Ok(RunMode::Production),
            other => Err(anyhow!(
                "invalid run mode '{}'. expected development | production",
                other
            )),
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, RunMode::Development)
    }
}

/// Fully resolved service configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP bind port.
    pub port: u16,
    /// HMAC key used to verify bearer tokens. Secret; never logged.
    pub jwt_secret: String,
    /// Postgres connection URL. Secret (may embed credentials); never logged.
    pub database_url: String,
    /// Base URL of the upstream chart API.
    pub upstream_market_url: String,
    pub run_mode: RunMode,
    /// Symbol the live engine falls back to when a start request names none.
    pub default_symbol: String,
    /// Live engine tick period in seconds.
    pub engine_tick_secs: u64,
}

impl Config {
    /// Read every recognized variable from the process environment.
    ///
    /// `PDK_JWT_SECRET` and `PDK_DATABASE_URL` are required; everything else
    /// has a default suitable for local development.
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var(ENV_PORT) {
            Ok(v) => v
                .parse::<u16>()
                .with_context(|| format!("{ENV_PORT} must be a port number, got '{v}'"))?,
            Err(_) => 3000,
        };

        let jwt_secret =
            std::env::var(ENV_JWT_SECRET).with_context(|| format!("missing env var {ENV_JWT_SECRET}"))?;
        if jwt_secret.trim().is_empty() {
            return Err(anyhow!("{ENV_JWT_SECRET} must not be empty"));
        }

        let database_url = std::env::var(ENV_DATABASE_URL)
            .with_context(|| format!("missing env var {ENV_DATABASE_URL}"))?;

        let upstream_market_url = std::env::var(ENV_UPSTREAM_MARKET_URL)
            .unwrap_or_else(|_| "https://query1.finance.yahoo.com/v8/finance".to_string());

        let run_mode = match std::env::var(ENV_RUN_MODE) {
            Ok(v) => RunMode::parse(&v)?,
            Err(_) => RunMode::Development,
        };

        let default_symbol = std::env::var(ENV_DEFAULT_SYMBOL)
            .ok()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "SPY".to_string());

        let engine_tick_secs = match std::env::var(ENV_ENGINE_TICK_SECS) {
            Ok(v) => {
                let n = v.parse::<u64>().with_context(|| {
                    format!("{ENV_ENGINE_TICK_SECS} must be an integer, got '{v}'")
                })?;
                if n == 0 {
                    return Err(anyhow!("{ENV_ENGINE_TICK_SECS} must be > 0"));
                }
                n
            }
            Err(_) => 60,
        };

        Ok(Config {
            port,
            jwt_secret,
            database_url,
            upstream_market_url,
            run_mode,
            default_symbol,
            engine_tick_secs,
        })
    }

    /// Hex SHA-256 over the canonical JSON of the non-secret subset.
    ///
    /// Stable across key ordering; secrets never enter the hashed payload.
    pub fn fingerprint(&self) -> String {
        let canonical = canonicalize_json(&self.public_json());

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The non-secret subset serialized for fingerprinting and startup logs.
    pub fn public_json(&self) -> Value {
        serde_json::json!({
            "port": self.port,
            "upstream_market_url": self.upstream_market_url,
            "run_mode": self.run_mode.as_str(),
            "default_symbol": self.default_symbol,
            "engine_tick_secs": self.engine_tick_secs,
        })
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting
/// compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}
