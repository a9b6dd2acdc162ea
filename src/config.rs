use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML format: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings file, e.g. `pyarcade.toml`. Every field is optional.
///
/// ```toml
/// [runtime]
/// default_fps = 30
/// max_frames = 600
///
/// [random]
/// seed = 42
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub random: RandomConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Frame rate used by `game.start` when none is given.
    pub default_fps: f64,
    /// Stop the runtime after this many presented frames (headless runs).
    pub max_frames: Option<u64>,
    /// Make `game.update()` sleep out the rest of the frame interval.
    pub pace_updates: bool,
    /// Surface size used when `game.init` is called without one.
    pub width: u32,
    pub height: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_fps: default_fps(),
            max_frames: None,
            pace_updates: false,
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RandomConfig {
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    pub max_call_depth: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_call_depth: default_max_call_depth(),
        }
    }
}

fn default_fps() -> f64 {
    60.0
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_max_call_depth() -> usize {
    200
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.runtime.default_fps, 60.0);
        assert_eq!(config.sandbox.max_call_depth, 200);
    }

    #[test]
    fn sections_override_individual_fields() {
        let config = Config::from_toml("[runtime]\nmax_frames = 120\n\n[random]\nseed = 9\n")
            .expect("parse");
        assert_eq!(config.runtime.max_frames, Some(120));
        assert_eq!(config.runtime.width, 800);
        assert_eq!(config.random.seed, Some(9));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml("[runtime]\nfsp = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[sandbox]\nmax_call_depth = 50").expect("write");
        let config = Config::from_file(file.path()).expect("load");
        assert_eq!(config.sandbox.max_call_depth, 50);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::from_file(Path::new("/nonexistent/pyarcade.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pyarcade.toml"));
    }
}
