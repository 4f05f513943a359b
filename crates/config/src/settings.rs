// Change-tracking settings
// Loaded from ~/.config/redline/track.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackSettings {
    // Recording
    /// Author stamped on new records when the caller does not supply one.
    #[serde(rename = "track.author")]
    pub author: String,

    /// Rows per bucket of the content slot table.
    #[serde(rename = "track.contentRowsPerSlot")]
    pub content_rows_per_slot: u32,

    /// Remember untracked cell values destroyed by deletes and moves so a
    /// reject can restore them.
    #[serde(rename = "track.generateDeletedContents")]
    pub generate_deleted_contents: bool,

    // Merge
    #[serde(rename = "merge.copyResolvedStates")]
    pub merge_copy_resolved_states: bool,

    // Descriptions
    #[serde(rename = "describe.maxValueLength")]
    pub describe_max_value_length: usize,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            author: String::new(),
            content_rows_per_slot: 64,
            generate_deleted_contents: true,
            merge_copy_resolved_states: true,
            describe_max_value_length: 32,
        }
    }
}

impl TrackSettings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("redline")
            .join("track.json")
    }

    /// Load settings from the default path, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}; using default tracking settings", e);
                Self::default()
            }
        }
    }

    /// Load settings from `path`. Lines starting with `//` are comments.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut settings: Self = serde_json::from_str(&cleaned)?;
        settings.content_rows_per_slot = settings.content_rows_per_slot.max(1);
        Ok(settings)
    }

    /// Save current settings to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
