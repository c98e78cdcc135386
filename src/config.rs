//! Engine configuration (config.json).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithm::motion_planner::MotionConfig;
use crate::algorithm::tracking::TrackingConfig;
use crate::control::control_loop::ControlConfig;
use crate::device::transport::DeviceAddress;

const CONFIG_DIR_NAME: &str = "PointerFollow";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FollowConfig {
    pub tracking: TrackingConfig,
    pub motion: MotionConfig,
    pub control: ControlConfig,
    pub device: DeviceAddress,
}

impl FollowConfig {
    /// Reads a config file; missing sections and fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("load: config read from {}", path.display());
        Ok(config.normalized())
    }

    /// Like [`load`](Self::load) but falls back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("load: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("save: config written to {}", path.display());
        Ok(())
    }

    /// Repairs values that would break an invariant downstream.
    pub fn normalized(self) -> Self {
        Self {
            tracking: self.tracking.normalized(),
            motion: self.motion.normalized(),
            control: self.control.normalized(),
            device: self.device,
        }
    }
}

/// `<config dir>/PointerFollow/config.json`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
