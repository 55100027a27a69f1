use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};
use crate::normalizer::DecimalLocale;

pub const DB_FILE: &str = "sisdental.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Used by `import` when `--locale` is not given.
    #[serde(default)]
    pub decimal_locale: DecimalLocale,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            decimal_locale: DecimalLocale::default(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("sisdental")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("sisdental")
}

fn parse_settings(content: &str) -> Settings {
    serde_json::from_str(content).unwrap_or_default()
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        parse_settings(&content)
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ImportError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}

/// Database the commands operate on: `--db` when given, otherwise the file
/// inside the configured data directory.
pub fn db_path(db_override: Option<&str>) -> PathBuf {
    match db_override {
        Some(path) => PathBuf::from(shellexpand_path(path)),
        None => get_data_dir().join(DB_FILE),
    }
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
