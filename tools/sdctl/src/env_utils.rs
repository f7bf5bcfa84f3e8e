use std::path::PathBuf;

use anyhow::{anyhow, Result};
use log::LevelFilter;

pub fn parse_env_level(name: &str, default: LevelFilter) -> Result<LevelFilter> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<LevelFilter>()
            .map_err(|_| anyhow!("{name} must be one of off|error|warn|info|debug|trace")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(anyhow!("{name} invalid: {err}")),
    }
}

pub fn parse_env_path(name: &str) -> Result<Option<PathBuf>> {
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(PathBuf::from(raw))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(anyhow!("{name} invalid: {err}")),
    }
}

/// Command-line value first, then the environment.
pub fn path_from_flag_or_env(flag: Option<PathBuf>, name: &str) -> Result<Option<PathBuf>> {
    match flag {
        Some(path) => Ok(Some(path)),
        None => parse_env_path(name),
    }
}
