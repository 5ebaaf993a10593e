use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::transforms::DEFAULT_MAX_DIMENSION;
use crate::pipeline::ParamPolicy;

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_dimension: u32,
    pub param_policy: ParamPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            read_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_dimension: DEFAULT_MAX_DIMENSION,
            param_policy: ParamPolicy::Lenient,
        }
    }
}

/// Shape of the optional TOML file named by `IMGPROC_CONFIG`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub read_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
    pub max_dimension: Option<u32>,
    pub strict_params: Option<bool>,
}

/// Raw environment values, unparsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub bind: Option<String>,
    pub read_timeout_secs: Option<String>,
    pub write_timeout_secs: Option<String>,
    pub max_dimension: Option<String>,
    pub strict_params: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            bind: env_value("IMGPROC_BIND"),
            read_timeout_secs: env_value("IMGPROC_READ_TIMEOUT_SECS"),
            write_timeout_secs: env_value("IMGPROC_WRITE_TIMEOUT_SECS"),
            max_dimension: env_value("IMGPROC_MAX_DIMENSION"),
            strict_params: env_value("IMGPROC_STRICT_PARAMS"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub fn resolve_service_config() -> Result<ServiceConfig, ConfigError> {
    let file = match env_value("IMGPROC_CONFIG") {
        Some(path) => load_file_config(Path::new(path.as_str()))?,
        None => FileConfig::default(),
    };
    select_service_config(&file, &EnvOverrides::from_env())
}

pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(raw.as_str()).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Defaults, then file values, then environment values.
pub fn select_service_config(
    file: &FileConfig,
    env: &EnvOverrides,
) -> Result<ServiceConfig, ConfigError> {
    let mut config = ServiceConfig::default();

    if let Some(bind) = env.bind.as_deref().or(file.bind.as_deref()) {
        config.bind = parse_bind(bind)?;
    }

    let read_secs = match env.read_timeout_secs.as_deref() {
        Some(raw) => Some(parse_number::<u64>("IMGPROC_READ_TIMEOUT_SECS", raw)?),
        None => file.read_timeout_secs,
    };
    if let Some(secs) = read_secs {
        config.read_timeout = positive_secs("read_timeout_secs", secs)?;
    }

    let write_secs = match env.write_timeout_secs.as_deref() {
        Some(raw) => Some(parse_number::<u64>("IMGPROC_WRITE_TIMEOUT_SECS", raw)?),
        None => file.write_timeout_secs,
    };
    if let Some(secs) = write_secs {
        config.write_timeout = positive_secs("write_timeout_secs", secs)?;
    }

    let max_dimension = match env.max_dimension.as_deref() {
        Some(raw) => Some(parse_number::<u32>("IMGPROC_MAX_DIMENSION", raw)?),
        None => file.max_dimension,
    };
    if let Some(max_dimension) = max_dimension {
        if max_dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_dimension",
                value: String::from("0"),
                reason: String::from("must be greater than zero"),
            });
        }
        config.max_dimension = max_dimension;
    }

    let strict = match env.strict_params.as_deref() {
        Some(raw) => Some(parse_flag("IMGPROC_STRICT_PARAMS", raw)?),
        None => file.strict_params,
    };
    if let Some(strict) = strict {
        config.param_policy = if strict {
            ParamPolicy::Strict
        } else {
            ParamPolicy::Lenient
        };
    }

    Ok(config)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bind(raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.trim()
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidValue {
            key: "bind",
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn positive_secs(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: String::from("0"),
            reason: String::from("timeout must be at least one second"),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: String::from("expected a boolean flag"),
        }),
    }
}
