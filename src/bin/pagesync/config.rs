use super::ThreadDumpArg;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings read from the config file; every field is optional.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub timeout_ms: Option<u64>,
    pub thread_dump: Option<ThreadDumpArg>,
    pub threads: Option<usize>,
    pub pages: Option<u64>,
    pub requests: Option<usize>,
    pub hold_ms: Option<u64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    settings: Settings,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit_given = explicit.is_some();
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            Some(config_path) if explicit_given => {
                return Err(ConfigError::Missing {
                    path: config_path.clone(),
                })
            }
            _ => RawConfig::default(),
        };
        let settings = convert(&data)?;
        Ok(Self { path, settings })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Renders effective values in the same layout the config file uses.
pub fn render(
    timeout_ms: u64,
    thread_dump: ThreadDumpArg,
    contend: &ContendSection,
) -> Result<String, ConfigError> {
    let raw = RawConfig {
        locks: LocksSection {
            timeout_ms: Some(timeout_ms),
            thread_dump: Some(thread_dump_to_string(thread_dump)),
        },
        contend: contend.clone(),
    };
    toml::to_string_pretty(&raw).map_err(|source| ConfigError::Serialize { source })
}

fn thread_dump_to_string(value: ThreadDumpArg) -> String {
    match value {
        ThreadDumpArg::None => "none",
        ThreadDumpArg::Holder => "holder",
        ThreadDumpArg::All => "all",
    }
    .to_string()
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn convert(raw: &RawConfig) -> Result<Settings, ConfigError> {
    let thread_dump = match raw.locks.thread_dump.as_deref() {
        Some(value) => Some(ThreadDumpArg::from_str(value, true).map_err(|_| {
            ConfigError::InvalidThreadDump {
                value: value.to_string(),
            }
        })?),
        None => None,
    };
    Ok(Settings {
        timeout_ms: raw.locks.timeout_ms,
        thread_dump,
        threads: raw.contend.threads,
        pages: raw.contend.pages,
        requests: raw.contend.requests,
        hold_ms: raw.contend.hold_ms,
        seed: raw.contend.seed,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    locks: LocksSection,
    #[serde(default)]
    contend: ContendSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct LocksSection {
    timeout_ms: Option<u64>,
    thread_dump: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContendSection {
    pub threads: Option<usize>,
    pub pages: Option<u64>,
    pub requests: Option<usize>,
    pub hold_ms: Option<u64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} does not exist")]
    Missing { path: PathBuf },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("thread_dump value '{value}' is invalid (expected none, holder or all)")]
    InvalidThreadDump { value: String },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("pagesync").join("pagesync.toml"))
}
