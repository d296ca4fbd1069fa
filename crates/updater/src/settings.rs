use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use updater_platform::AppPaths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterSettings {
    #[serde(default = "default_process_wait_timeout")]
    pub process_wait_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default)]
    pub ui: UiPreference,
}

/// How progress is shown while an update runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum UiPreference {
    /// Console progress when attached to a terminal, otherwise none.
    #[default]
    Auto,
    Console,
    None,
}

fn default_true() -> bool {
    true
}

fn default_process_wait_timeout() -> u64 {
    30
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            process_wait_timeout_secs: default_process_wait_timeout(),
            debug_logging: true,
            max_log_size_bytes: default_max_log_size_bytes(),
            ui: UiPreference::Auto,
        }
    }
}

impl UpdaterSettings {
    pub fn load() -> Self {
        let Ok(paths) = AppPaths::new() else {
            return Self::default();
        };
        Self::load_from(&paths.settings_file())
    }

    pub fn load_from(settings_path: &Path) -> Self {
        if !settings_path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(settings_path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn process_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.process_wait_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{UiPreference, UpdaterSettings};

    #[test]
    fn defaults_match_documented_values() {
        let settings = UpdaterSettings::default();

        assert_eq!(settings.process_wait_timeout_secs, 30);
        assert!(settings.debug_logging);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.ui, UiPreference::Auto);
        assert_eq!(settings.process_wait_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "process_wait_timeout_secs": 5, "ui": "none" }"#)
            .expect("settings file should be written");

        let settings = UpdaterSettings::load_from(&path);

        assert_eq!(settings.process_wait_timeout_secs, 5);
        assert_eq!(settings.ui, UiPreference::None);
        assert!(settings.debug_logging);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn missing_or_invalid_file_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("settings.json");

        assert_eq!(
            UpdaterSettings::load_from(&path).process_wait_timeout_secs,
            30
        );

        std::fs::write(&path, "not json").expect("settings file should be written");
        assert_eq!(UpdaterSettings::load_from(&path).ui, UiPreference::Auto);
    }
}
