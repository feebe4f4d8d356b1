use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://academy.db";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

pub fn load_environment() -> Result<()> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<()> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)
        .with_context(|| format!("Failed to load environment file {}", path))?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// Service settings read from the process environment after the env files
/// have been applied. Rocket reads its own `ROCKET_*` settings separately.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub otlp_endpoint: Option<String>,
    pub otlp_headers: Vec<(String, String)>,
    pub deployment_environment: String,
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let otlp_headers = match std::env::var("OTEL_EXPORTER_OTLP_HEADERS") {
            Ok(raw) => parse_headers(&raw)?,
            Err(_) => Vec::new(),
        };

        let deployment_environment =
            std::env::var("DEPLOYMENT_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let sweep_interval = match std::env::var("SESSION_SWEEP_INTERVAL_SECS") {
            Ok(raw) => raw.trim().parse::<u64>().with_context(|| {
                format!("SESSION_SWEEP_INTERVAL_SECS must be a whole number, got '{}'", raw)
            })?,
            Err(_) => DEFAULT_SWEEP_INTERVAL_SECS,
        };

        if sweep_interval == 0 {
            anyhow::bail!("SESSION_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            database_url,
            otlp_endpoint,
            otlp_headers,
            deployment_environment,
            sweep_interval: Duration::from_secs(sweep_interval),
        })
    }
}

/// Parses `key=value,key2=value2` as used by `OTEL_EXPORTER_OTLP_HEADERS`.
fn parse_headers(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("Malformed OTLP header '{}', expected key=value", pair))?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
