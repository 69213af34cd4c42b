/// Backup configuration
///
/// Stored as TOML in ~/.config/volback/config.toml. The loaded value is
/// immutable during a run and passed explicitly to the components that
/// need it; retention fallback lives in one place, `resolve_retention`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Keep-count used when `default_max_backups` itself is invalid.
pub const MIN_KEEP: u32 = 1;

/// Keep-count a fresh configuration starts with.
pub const DEFAULT_MAX_BACKUPS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub backup_directory: PathBuf,
    pub default_max_backups: u32,
    #[serde(default)]
    pub volumes: Vec<VolumePolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePolicy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backups: Option<u32>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_directory: PathBuf::from("./volume-backups"),
            default_max_backups: DEFAULT_MAX_BACKUPS,
            volumes: Vec::new(),
        }
    }
}

impl BackupConfig {
    /// Config file path, ~/.config/volback/config.toml.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine the user config directory")?
            .join("volback");
        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }

    /// Keep-count for a volume: explicit valid override, else the valid
    /// default, else `MIN_KEEP`. Always >= 1.
    pub fn resolve_retention(&self, volume: &str) -> u32 {
        let fallback = if self.default_max_backups >= 1 {
            self.default_max_backups
        } else {
            MIN_KEEP
        };

        self.volumes
            .iter()
            .find(|v| v.name == volume)
            .and_then(|v| v.max_backups)
            .filter(|&keep| keep >= 1)
            .unwrap_or(fallback)
    }

    /// Volume names for unattended backup. Empty means nothing to do.
    pub fn configured_volumes(&self) -> Vec<&str> {
        self.volumes.iter().map(|v| v.name.as_str()).collect()
    }

    /// Insert or update a per-volume retention override.
    pub fn set_policy(&mut self, name: &str, max_backups: Option<u32>) {
        if let Some(existing) = self.volumes.iter_mut().find(|v| v.name == name) {
            existing.max_backups = max_backups;
        } else {
            self.volumes.push(VolumePolicy {
                name: name.to_string(),
                max_backups,
            });
        }
    }
}
