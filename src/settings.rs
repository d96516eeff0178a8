use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::observation::idle::{DEFAULT_IDLE_THRESHOLD_SECS, DEFAULT_POLL_INTERVAL_SECS};

pub const SETTINGS_PATH_ENV: &str = "CHRONOS_SETTINGS";
pub const DEFAULT_SETTINGS_FILE: &str = "chronos-settings.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObserverSettings {
    pub idle_threshold_secs: u64,
    pub idle_poll_interval_secs: u64,
    pub tick_interval_ms: u64,
    pub default_subject: String,
    pub subjects: Vec<String>,
    pub report_dir: PathBuf,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            idle_threshold_secs: DEFAULT_IDLE_THRESHOLD_SECS,
            idle_poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            tick_interval_ms: 1000,
            default_subject: "國文".into(),
            subjects: ["國文", "英文", "數學", "自然", "社會", "體育", "藝術", "數位應用"]
                .into_iter()
                .map(String::from)
                .collect(),
            report_dir: PathBuf::from("reports"),
        }
    }
}

impl ObserverSettings {
    // Zero intervals would make tokio::time::interval panic.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_interval_secs.max(1))
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ObserverSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings in {}: {err}", path.display());
                ObserverSettings::default()
            })
        } else {
            ObserverSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path from `CHRONOS_SETTINGS`, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
    }

    pub fn get(&self) -> ObserverSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: ObserverSettings) -> Result<()> {
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &ObserverSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, ObserverSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObserverSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("absent.json")).unwrap();
        let settings = store.get();
        assert_eq!(settings, ObserverSettings::default());
        assert_eq!(settings.idle_threshold_secs, 300);
        assert_eq!(settings.idle_poll_interval_secs, 10);
        assert_eq!(settings.subjects.len(), 8);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "idle_threshold_secs": 120, "default_subject": "數學" }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().get();
        assert_eq!(settings.idle_threshold_secs, 120);
        assert_eq!(settings.default_subject, "數學");
        assert_eq!(settings.tick_interval_ms, 1000);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(SettingsStore::new(path).unwrap().get(), ObserverSettings::default());
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.get();
        settings.report_dir = dir.path().join("out");
        settings.tick_interval_ms = 250;
        store.update(settings.clone()).unwrap();
        assert_eq!(store.get(), settings);

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.get(), settings);
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let settings = ObserverSettings {
            tick_interval_ms: 0,
            idle_poll_interval_secs: 0,
            ..ObserverSettings::default()
        };
        assert_eq!(settings.tick_interval(), Duration::from_millis(1));
        assert_eq!(settings.idle_poll_interval(), Duration::from_secs(1));
    }
}
