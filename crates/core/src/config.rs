use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JtraceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub collector_http_addr: String,
    pub collector_grpc_addr: String,
    pub http_enabled: bool,
    pub grpc_enabled: bool,
    pub max_request_bytes: usize,
    pub consumer_timeout: Duration,
    pub exporter: String,
    pub forward_otlp_endpoint: Option<String>,
    pub forward_otlp_protocol: String,
    pub forward_otlp_compression: String,
    pub forward_otlp_headers: Vec<(String, String)>,
    pub forward_otlp_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collector_http_addr: "0.0.0.0:14268".to_string(),
            collector_grpc_addr: "0.0.0.0:14250".to_string(),
            http_enabled: true,
            grpc_enabled: true,
            max_request_bytes: 4 * 1024 * 1024,
            consumer_timeout: Duration::from_secs(10),
            exporter: "logging".to_string(),
            forward_otlp_endpoint: None,
            forward_otlp_protocol: "grpc".to_string(),
            forward_otlp_compression: "none".to_string(),
            forward_otlp_headers: Vec::new(),
            forward_otlp_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    collector_http_addr: Option<String>,
    collector_grpc_addr: Option<String>,
    http_enabled: Option<bool>,
    grpc_enabled: Option<bool>,
    max_request_bytes: Option<usize>,
    consumer_timeout: Option<String>,
    exporter: Option<String>,
    forward_otlp_endpoint: Option<String>,
    forward_otlp_protocol: Option<String>,
    forward_otlp_compression: Option<String>,
    forward_otlp_headers: Option<String>,
    forward_otlp_timeout: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("JTRACE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("jtrace/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| JtraceError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed = parse_file_overrides(&raw)
        .map_err(|e| JtraceError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn parse_file_overrides(raw: &str) -> std::result::Result<ConfigOverrides, toml::de::Error> {
    toml::from_str(raw)
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        collector_http_addr: env::var("JTRACE_COLLECTOR_HTTP_ADDR").ok(),
        collector_grpc_addr: env::var("JTRACE_COLLECTOR_GRPC_ADDR").ok(),
        http_enabled: env_parsed("JTRACE_HTTP_ENABLED")?,
        grpc_enabled: env_parsed("JTRACE_GRPC_ENABLED")?,
        max_request_bytes: env_parsed("JTRACE_MAX_REQUEST_BYTES")?,
        consumer_timeout: env::var("JTRACE_CONSUMER_TIMEOUT").ok(),
        exporter: env::var("JTRACE_EXPORTER").ok(),
        forward_otlp_endpoint: env::var("JTRACE_FORWARD_OTLP_ENDPOINT").ok(),
        forward_otlp_protocol: env::var("JTRACE_FORWARD_OTLP_PROTOCOL").ok(),
        forward_otlp_compression: env::var("JTRACE_FORWARD_OTLP_COMPRESSION").ok(),
        forward_otlp_headers: env::var("JTRACE_FORWARD_OTLP_HEADERS").ok(),
        forward_otlp_timeout: env::var("JTRACE_FORWARD_OTLP_TIMEOUT").ok(),
    })
}

fn env_parsed<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| JtraceError::Config(format!("bad {key} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.collector_http_addr {
        cfg.collector_http_addr = v;
    }
    if let Some(v) = overrides.collector_grpc_addr {
        cfg.collector_grpc_addr = v;
    }
    if let Some(v) = overrides.http_enabled {
        cfg.http_enabled = v;
    }
    if let Some(v) = overrides.grpc_enabled {
        cfg.grpc_enabled = v;
    }
    if let Some(v) = overrides.max_request_bytes {
        if v == 0 {
            return Err(JtraceError::Config(format!(
                "max_request_bytes in {source} must be positive"
            )));
        }
        cfg.max_request_bytes = v;
    }
    if let Some(v) = overrides.consumer_timeout {
        cfg.consumer_timeout = humantime::parse_duration(&v).map_err(|e| {
            JtraceError::Config(format!("bad consumer_timeout in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.exporter {
        cfg.exporter = v;
    }
    if let Some(v) = overrides.forward_otlp_endpoint {
        cfg.forward_otlp_endpoint = Some(v);
    }
    if let Some(v) = overrides.forward_otlp_protocol {
        cfg.forward_otlp_protocol = v;
    }
    if let Some(v) = overrides.forward_otlp_compression {
        cfg.forward_otlp_compression = v;
    }
    if let Some(v) = overrides.forward_otlp_headers {
        cfg.forward_otlp_headers = parse_otlp_headers(&v).map_err(|e| {
            JtraceError::Config(format!(
                "bad forward_otlp_headers in {source}: {e} (value={v})"
            ))
        })?;
    }
    if let Some(v) = overrides.forward_otlp_timeout {
        cfg.forward_otlp_timeout = humantime::parse_duration(&v).map_err(|e| {
            JtraceError::Config(format!(
                "bad forward_otlp_timeout in {source}: {e} (value={v})"
            ))
        })?;
    }
    Ok(())
}

fn parse_otlp_headers(raw: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(JtraceError::Config(
                "header entries must use key=value syntax".to_string(),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(JtraceError::Config("header key cannot be empty".to_string()));
        }
        out.push((key.to_string(), value.trim().to_string()));
    }
    Ok(out)
}
