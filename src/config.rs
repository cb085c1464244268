use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_OUT_DIR: &str = "out";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";
pub const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";

/// Where ledgers and transient caption files live, and how external tools
/// are invoked.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub out_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub tool_timeout: Duration,
    pub yt_dlp_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
}

impl RuntimeSettings {
    /// Resolves `file_name` inside the output directory.
    pub fn ledger_path(&self, file_name: &str) -> PathBuf {
        self.out_dir.join(file_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub out_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_runtime_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeSettings {
    build_runtime_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let out_dir = overrides
        .out_dir
        .or_else(|| lookup_value("HARVEST_OUT_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));
    let temp_dir = overrides
        .temp_dir
        .or_else(|| lookup_value("HARVEST_TEMP_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(env::temp_dir);
    let timeout_secs = overrides
        .timeout_secs
        .filter(|secs| *secs > 0)
        .or_else(|| {
            lookup_value("HARVEST_TIMEOUT_SECS", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
        })
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let yt_dlp_bin = lookup_value("YT_DLP_BIN", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_YT_DLP_BIN.to_string());
    let ffmpeg_bin = lookup_value("FFMPEG_BIN", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_FFMPEG_BIN.to_string());

    RuntimeSettings {
        out_dir,
        temp_dir,
        tool_timeout: Duration::from_secs(timeout_secs),
        yt_dlp_bin: PathBuf::from(yt_dlp_bin),
        ffmpeg_bin: PathBuf::from(ffmpeg_bin),
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

/// Parses a dotenv-style file. A missing file yields no variables.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
