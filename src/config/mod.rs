mod types;

pub use types::*;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

/// Load settings from a TOML file.
///
/// A missing file yields defaults; a malformed file yields defaults with a
/// logged warning. Settings never block startup.
pub fn load_settings(path: &Path) -> Settings {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
        Err(e) => {
            tracing::warn!("failed to read settings file {:?}: {}", path, e);
            return Settings::default();
        }
    };

    match toml::from_str(&content) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("failed to parse settings file {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Save settings to a TOML file, creating the parent directory if needed.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let content = toml::to_string_pretty(settings).context("Failed to serialize settings")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
    }

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write settings file: {:?}", path))?;

    Ok(())
}

/// Process-wide settings store.
///
/// Loaded once at startup; mutated only from the presentation side. Jobs read
/// the output directory and preferred encoder through this at job start.
pub struct SettingsStore {
    path: PathBuf,
    inner: RwLock<Settings>,
}

impl SettingsStore {
    /// Open the store backed by the given file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = load_settings(&path);
        tracing::debug!("loaded settings from {:?}: {:?}", path, settings);
        Self {
            path,
            inner: RwLock::new(settings),
        }
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> Settings {
        self.inner.read().clone()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.inner.read().output_dir.clone()
    }

    pub fn preferred_encoder(&self) -> String {
        self.inner.read().encoder.clone()
    }

    pub fn show_startup_notice(&self) -> bool {
        self.inner.read().show_startup_notice
    }

    /// Apply a mutation and persist the result.
    pub fn update(&self, mutate: impl FnOnce(&mut Settings)) -> Result<()> {
        {
            let mut settings = self.inner.write();
            mutate(&mut settings);
        }
        self.save()
    }

    /// Persist the current settings, e.g. at shutdown.
    pub fn save(&self) -> Result<()> {
        let settings = self.get();
        save_settings(&self.path, &settings)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
