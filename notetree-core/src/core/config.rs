//! Engine configuration persistence.
//!
//! Tunables for the ordering engine live in a small JSON file so an operator
//! can raise the traversal cap or the busy timeout without a rebuild.

use crate::{NoteTreeError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default cap on subtree depth for deletion.
pub const DEFAULT_MAX_SUBTREE_DEPTH: usize = 50;

/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Runtime settings for a [`NoteTree`](super::tree::NoteTree).
///
/// Missing keys fall back to their defaults, so a partial file such as
/// `{"maxSubtreeDepth": 200}` is valid.
///
/// # Examples
///
/// ```rust
/// use notetree_core::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{"maxSubtreeDepth": 8}"#).unwrap();
/// assert_eq!(config.max_subtree_depth, 8);
/// assert!(config.repair_on_move);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Maximum number of levels below a root that subtree deletion will follow.
    pub max_subtree_depth: usize,
    /// How long a writer waits for a competing transaction before failing.
    pub busy_timeout_ms: u64,
    /// Whether moves renumber a group holding duplicate sequences instead of
    /// failing. Gaps are closed regardless.
    pub repair_on_move: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_subtree_depth: DEFAULT_MAX_SUBTREE_DEPTH,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            repair_on_move: true,
        }
    }
}

impl EngineConfig {
    /// Loads settings from `path`; returns defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::Io`] if the file exists but cannot be read,
    /// [`NoteTreeError::Json`] if it is not valid JSON, or
    /// [`NoteTreeError::InvalidConfig`] if a value is out of range.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = match fs::read_to_string(path.as_ref()) {
            Ok(content) => serde_json::from_str::<Self>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "event=config_load module=config status=default path={}",
                    path.as_ref().display()
                );
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Saves settings to `path`, creating parent directories as needed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Rejects settings the engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.max_subtree_depth == 0 {
            return Err(NoteTreeError::InvalidConfig(
                "maxSubtreeDepth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The busy timeout as a [`Duration`].
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load(dir.path().join("engine.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_subtree_depth, 50);
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("engine.json");
        let config = EngineConfig {
            max_subtree_depth: 12,
            busy_timeout_ms: 250,
            repair_on_move: false,
        };
        config.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("maxSubtreeDepth"));
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{"maxSubtreeDepth": 0}"#).unwrap();
        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, NoteTreeError::InvalidConfig(_)));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(NoteTreeError::Json(_))
        ));
    }
}
