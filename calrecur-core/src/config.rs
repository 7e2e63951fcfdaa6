//! calrecur configuration.
//!
//! Loaded from `~/.config/calrecur/config.toml`, with `CALRECUR_*`
//! environment variables taking precedence.

use std::path::{Path, PathBuf};

use chrono::Duration;
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::time::zone_named;

static DEFAULT_SEARCH_HORIZON: &str = "100years";
const DEFAULT_MAX_INSTANCES: usize = 50_000;

fn default_search_horizon() -> String {
    DEFAULT_SEARCH_HORIZON.to_string()
}

fn default_max_instances() -> usize {
    DEFAULT_MAX_INSTANCES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Zone all occurrences are computed in; the system zone when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    /// How far searches look ahead of and behind their target
    #[serde(default = "default_search_horizon")]
    pub search_horizon: String,

    /// Cap on instances generated per search
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            time_zone: None,
            search_horizon: default_search_horizon(),
            max_instances: default_max_instances(),
        }
    }
}

impl Settings {
    pub fn config_path() -> CoreResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CoreError::Config("Could not determine config directory".into()))?
            .join("calrecur");

        Ok(config_dir.join("config.toml"))
    }

    /// Load settings, writing a commented default config file first if
    /// there is none.
    pub fn load() -> CoreResult<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            Self::create_default_config(&path)?;
        }
        Self::load_from(&path)
    }

    /// Load settings from `path` (which may be missing) and the environment.
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("CALRECUR").try_parsing(true))
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        // Surface a bad horizon at load time rather than on first search
        settings.horizon()?;
        Ok(settings)
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CoreResult<()> {
        let contents = format!(
            "\
# calrecur configuration

# Time zone occurrences are shown in (defaults to the system zone):
# time_zone = \"Europe/Helsinki\"

# How far to search for the next or previous occurrence:
# search_horizon = \"{}\"

# Maximum number of instances generated per search:
# max_instances = {}
",
            DEFAULT_SEARCH_HORIZON, DEFAULT_MAX_INSTANCES
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Config(format!("Could not create config directory: {e}")))?;
        }

        std::fs::write(path, contents).map_err(|e| CoreError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// The canonical zone: the configured one, else the system zone, else UTC.
    pub fn canonical_zone(&self) -> Tz {
        let name = match &self.time_zone {
            Some(name) => name.clone(),
            None => match iana_time_zone::get_timezone() {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(error = %e, "could not detect system time zone, using UTC");
                    return Tz::UTC;
                }
            },
        };
        zone_named(&name).unwrap_or_else(|| {
            tracing::warn!(zone = %name, "cannot find time zone, using UTC");
            Tz::UTC
        })
    }

    pub fn horizon(&self) -> CoreResult<Duration> {
        let std_duration = humantime::parse_duration(&self.search_horizon)
            .map_err(|e| CoreError::Config(format!("Invalid search_horizon '{}': {}", self.search_horizon, e)))?;
        Duration::from_std(std_duration)
            .map_err(|e| CoreError::Config(format!("search_horizon out of range: {e}")))
    }
}
