#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident map engine.
//!
//! Groups incidents by rounded coordinates, places one styled marker per
//! location, recolors renderer-managed clusters by the most important
//! incident they contain, resolves marker and cluster clicks into a
//! selection or a drill-down list, and runs the focus/highlight animation.
//!
//! The engine draws nothing itself. It drives a [`MapRenderer`] and a
//! [`FrameScheduler`] supplied by the host; [`memory`] has in-memory
//! implementations of both.

pub mod drill_down;
pub mod highlight;
pub mod index;
pub mod memory;
pub mod normalize;
pub mod ports;
pub mod session;
pub mod style;
pub mod view;

use std::path::{Path, PathBuf};

use incident_map_map_models::MapConfig;

pub use drill_down::Interaction;
pub use highlight::{FocusOutcome, HighlightAnimator};
pub use index::{LocationBucket, LocationIndex};
pub use memory::{InMemoryRenderer, ManualScheduler};
pub use ports::{FrameScheduler, MapRenderer, RenderError, Wakeup};
pub use session::MapSession;
pub use view::MapView;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV_VAR: &str = "INCIDENT_MAP_CONFIG";

/// Errors that can occur while running the map engine.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The renderer failed.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// The config file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    ConfigIo {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`MapConfig`].
    #[error("Invalid config {}: {source}", path.display())]
    ConfigParse {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },
}

/// Reads a [`MapConfig`] from a TOML file.
///
/// # Errors
///
/// * If the file cannot be read
/// * If the file is not a valid config
pub fn load_config(path: &Path) -> Result<MapConfig, MapError> {
    let text = std::fs::read_to_string(path).map_err(|source| MapError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::de::from_str(&text).map_err(|source| MapError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Loaded map config from {}", path.display());
    Ok(config)
}

/// Resolves the config: `path` if given, else the file named by
/// [`CONFIG_ENV_VAR`], else the defaults.
///
/// # Errors
///
/// * If the chosen file cannot be read or parsed
pub fn resolve_config(path: Option<&Path>) -> Result<MapConfig, MapError> {
    if let Some(path) = path {
        return load_config(path);
    }
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) if !path.is_empty() => load_config(Path::new(&path)),
        _ => Ok(MapConfig::default()),
    }
}
