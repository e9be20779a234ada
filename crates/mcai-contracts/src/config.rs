use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::McaiError;
use crate::presets::{default_catalog, DEFAULT_PRESET};

/// Persisted layout: `{"activePreset": "...", "presets": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub active_preset: String,
    pub presets: Vec<String>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            active_preset: DEFAULT_PRESET.to_string(),
            presets: default_catalog(),
        }
    }
}

impl ConfigSnapshot {
    pub fn contains(&self, label: &str) -> bool {
        self.presets.iter().any(|preset| preset == label)
    }
}

/// File-backed active preset + catalog.
///
/// Clones share state. Readers take a snapshot; writers replace the file
/// with write-then-rename, so a reader never sees a half-written record.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    inner: Arc<ConfigStoreInner>,
}

#[derive(Debug)]
struct ConfigStoreInner {
    path: PathBuf,
    state: RwLock<ConfigSnapshot>,
}

impl ConfigStore {
    /// Loads `path`, seeding it with the default catalog when missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, McaiError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let loaded = read_snapshot(&path).map_err(|err| config_error(&path, &err))?;
            if !loaded.contains(&loaded.active_preset) {
                return Err(McaiError::Config {
                    path: path.display().to_string(),
                    detail: format!(
                        "active preset '{}' is not in the catalog",
                        loaded.active_preset
                    ),
                });
            }
            loaded
        } else {
            let seeded = ConfigSnapshot::default();
            write_snapshot_atomic(&path, &seeded).map_err(|err| config_error(&path, &err))?;
            seeded
        };
        Ok(Self {
            inner: Arc::new(ConfigStoreInner {
                path,
                state: RwLock::new(snapshot),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        match self.inner.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn active_preset(&self) -> String {
        self.snapshot().active_preset
    }

    /// Persists a new active preset. The label must already be in the catalog;
    /// on any failure the stored value is left unchanged.
    pub fn set_active(&self, label: &str) -> Result<ConfigSnapshot, McaiError> {
        if label.trim().is_empty() {
            return Err(McaiError::MissingField("preset"));
        }
        let mut guard = match self.inner.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !guard.contains(label) {
            return Err(McaiError::InvalidPreset(label.to_string()));
        }
        let mut next = guard.clone();
        next.active_preset = label.to_string();
        write_snapshot_atomic(&self.inner.path, &next)
            .map_err(|err| config_error(&self.inner.path, &err))?;
        *guard = next.clone();
        Ok(next)
    }
}

fn read_snapshot(path: &Path) -> anyhow::Result<ConfigSnapshot> {
    let raw = std::fs::read_to_string(path).context("read failed")?;
    let snapshot: ConfigSnapshot = serde_json::from_str(&raw).context("invalid JSON layout")?;
    Ok(snapshot)
}

fn write_snapshot_atomic(path: &Path, snapshot: &ConfigSnapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, serde_json::to_string_pretty(snapshot)?)
        .with_context(|| format!("write {} failed", tmp.display()))?;
    std::fs::rename(&tmp, path).context("rename over config failed")?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".tmp");
    PathBuf::from(raw)
}

fn config_error(path: &Path, err: &anyhow::Error) -> McaiError {
    McaiError::Config {
        path: path.display().to_string(),
        detail: format!("{err:#}"),
    }
}
