use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::io::{ConnectionConfig, Parity, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};

const APP_DIR: &str = "kalesp";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no configuration directory on this platform")]
    NoConfigDir,
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Persisted console settings. Device state is never stored.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSettings {
    /// Serial device to open; the first enumerated port when unset
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub file_logging: bool,
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT.as_millis() as u64
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            file_logging: false,
            log_dir: None,
        }
    }
}

impl AppSettings {
    /// Connection parameters for `port` using the stored line settings
    pub fn connection_config(&self, port: impl Into<String>) -> ConnectionConfig {
        ConnectionConfig::new(port)
            .with_baud_rate(self.baud_rate)
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_line_settings(self.data_bits, self.stop_bits, self.parity)
    }

    /// Directory for log files: `log_dir` if set, else `<data_dir>/kalesp/logs`
    pub fn log_path(&self) -> Option<PathBuf> {
        match &self.log_dir {
            Some(dir) => Some(PathBuf::from(dir)),
            None => dirs::data_local_dir().map(|d| d.join(APP_DIR).join("logs")),
        }
    }
}

/// `<config_dir>/kalesp/settings.json`
pub fn settings_path() -> Result<PathBuf, SettingsError> {
    let app_dir = dirs::config_dir()
        .ok_or(SettingsError::NoConfigDir)?
        .join(APP_DIR);
    Ok(app_dir.join(SETTINGS_FILE))
}

/// Load settings from the platform config directory. A missing file means defaults.
pub fn load_settings() -> Result<AppSettings, SettingsError> {
    load_settings_from(&settings_path()?)
}

pub fn load_settings_from(path: &Path) -> Result<AppSettings, SettingsError> {
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            action: "read",
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    } else {
        // Only written on request (`kalesp_cli settings --init`)
        Ok(AppSettings::default())
    }
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
            action: "create",
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let content = serde_json::to_string_pretty(settings)?;

    std::fs::write(path, content).map_err(|source| SettingsError::Io {
        action: "write",
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kalesp-settings-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_missing_file_loads_defaults_without_writing() {
        let dir = scratch_dir("first");
        let path = dir.join(SETTINGS_FILE);

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings, AppSettings::default());
        assert!(!path.exists());
        assert!(!dir.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: AppSettings = serde_json::from_str(r#"{"port": "/dev/ttyUSB1", "parity": "even"}"#).unwrap();
        assert_eq!(settings.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.read_timeout_ms, 100);
        assert_eq!(settings.parity, Parity::Even);
        assert!(!settings.file_logging);
    }

    #[test]
    fn test_save_then_load() {
        let dir = scratch_dir("save");
        let path = dir.join("nested").join(SETTINGS_FILE);

        let settings = AppSettings {
            port: Some("COM4".into()),
            baud_rate: 9600,
            file_logging: true,
            ..AppSettings::default()
        };
        save_settings_to(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path).unwrap(), settings);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = scratch_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load_settings_from(&path), Err(SettingsError::Parse(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_connection_config_from_settings() {
        let settings = AppSettings {
            baud_rate: 57_600,
            read_timeout_ms: 50,
            parity: Parity::Odd,
            ..AppSettings::default()
        };
        let config = settings.connection_config("/dev/ttyACM0");
        assert_eq!(config.port(), "/dev/ttyACM0");
        assert_eq!(config.baud_rate(), 57_600);
        assert_eq!(config.read_timeout(), Duration::from_millis(50));
        assert_eq!(config.line_summary(), "57600 8O1");
    }
}
