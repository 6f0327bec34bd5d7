use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::models::Coordinates;

const API_URL_ENV: &str = "ATTENDANCE_API_URL";
const DEBUG_ENV: &str = "ATTENDANCE_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub poll_interval_ms: u64,
    pub poll_jitter_ms: u64,
    pub cache_watch_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub photo_jpeg_quality: u8,
    /// Prefilled in the instructor's "start session" form.
    pub default_classroom_location: Coordinates,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".into(),
            poll_interval_ms: 5_000,
            poll_jitter_ms: 250,
            cache_watch_interval_ms: 1_000,
            request_timeout_ms: 10_000,
            photo_jpeg_quality: 80,
            default_classroom_location: Coordinates {
                latitude: 26.2389,
                longitude: 73.0243,
            },
        }
    }
}

impl ClientSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    pub fn poll_jitter(&self) -> Duration {
        Duration::from_millis(self.poll_jitter_ms)
    }

    pub fn cache_watch_interval(&self) -> Duration {
        Duration::from_millis(self.cache_watch_interval_ms.max(50))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(500))
    }

    /// Applies `ATTENDANCE_API_URL` and `ATTENDANCE_DEBUG` on top of the file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(DEBUG_ENV).ok(),
        )
    }

    fn with_overrides(mut self, api_url: Option<String>, debug: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|url| !url.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        let debug_mode = debug
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.poll_interval_ms = 1_000;
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ClientSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            ClientSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, ClientSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, ClientSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stored settings only; callers apply env overrides when wiring clients.
    pub fn client(&self) -> ClientSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: ClientSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &ClientSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_or_corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.client(), ClientSettings::default());

        fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.client().poll_interval_ms, 5_000);
    }

    #[test]
    fn updates_persist_and_partial_files_fill_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.client();
        settings.api_base_url = "https://attendance.campus.edu".into();
        store.update(settings.clone()).unwrap();
        assert_eq!(SettingsStore::new(path.clone()).unwrap().client(), settings);

        fs::write(&path, r#"{"poll_interval_ms": 2000}"#).unwrap();
        let partial = SettingsStore::new(path).unwrap().client();
        assert_eq!(partial.poll_interval_ms, 2_000);
        assert_eq!(partial.photo_jpeg_quality, 80);
    }

    #[test]
    fn env_overrides_replace_url_and_shorten_polling() {
        let settings = ClientSettings::default()
            .with_overrides(Some("http://10.0.0.5:8000".into()), Some("true".into()));
        assert_eq!(settings.api_base_url, "http://10.0.0.5:8000");
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));

        let untouched = ClientSettings::default().with_overrides(Some("  ".into()), Some("0".into()));
        assert_eq!(untouched, ClientSettings::default());
    }
}
