use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use facetag_core::{DEFAULT_EMBEDDING_DIM, DEFAULT_TOLERANCE, MIN_ENROLL_SAMPLES};

/// CLI configuration: defaults, then an optional TOML file, then `FACETAG_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub tolerance: f32,
    /// Length of every embedding the encoder produces.
    pub embedding_dim: usize,
    /// Accepted samples needed for a successful enrollment.
    pub min_enroll_samples: usize,
    /// Seconds between processing passes in `watch` mode.
    pub watch_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: data_dir().join("facetag.db"),
            tolerance: DEFAULT_TOLERANCE,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            min_enroll_samples: MIN_ENROLL_SAMPLES,
            watch_interval_secs: 30,
        }
    }
}

impl Config {
    /// Load the config file named by `explicit` or `FACETAG_CONFIG`, falling back
    /// to `$XDG_CONFIG_HOME/facetag/config.toml` if it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("FACETAG_CONFIG").ok().map(PathBuf::from));

        let mut config = match named {
            Some(path) => {
                if !path.exists() {
                    bail!("config file not found: {}", path.display());
                }
                Self::from_file(&path)?
            }
            None => {
                let path = config_dir().join("config.toml");
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would silently disable matching.
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            bail!("tolerance must be a finite number >= 0, got {}", self.tolerance);
        }
        if self.embedding_dim == 0 {
            bail!("embedding_dim must be at least 1");
        }
        Ok(())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FACETAG_*` overrides. Values that fail to parse are ignored.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("FACETAG_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        self.tolerance = parsed(&var, "FACETAG_TOLERANCE", self.tolerance);
        self.embedding_dim = parsed(&var, "FACETAG_EMBEDDING_DIM", self.embedding_dim);
        self.min_enroll_samples = parsed(&var, "FACETAG_MIN_ENROLL_SAMPLES", self.min_enroll_samples);
        self.watch_interval_secs = parsed(&var, "FACETAG_WATCH_INTERVAL_SECS", self.watch_interval_secs);
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(current)
}

fn home() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".local/share"))
        .join("facetag")
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".config"))
        .join("facetag")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.embedding_dim, 128);
        assert_eq!(config.min_enroll_samples, 3);
        assert!(config.db_path.ends_with("facetag/facetag.db"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("tolerance = 0.45\ndb_path = \"/var/lib/facetag/db.sqlite\"\n").unwrap();
        assert_eq!(config.tolerance, 0.45);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/facetag/db.sqlite"));
        assert_eq!(config.embedding_dim, 128);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("tolerence = 0.5\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FACETAG_TOLERANCE", "0.5"),
            ("FACETAG_EMBEDDING_DIM", "512"),
            ("FACETAG_MIN_ENROLL_SAMPLES", "not-a-number"),
            ("FACETAG_DB_PATH", "/tmp/x.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.embedding_dim, 512);
        assert_eq!(config.min_enroll_samples, 3);
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_invalid_tolerance_rejected() {
        for bad in ["NaN", "inf", "-0.1"] {
            let mut config = Config::default();
            config.apply_overrides(|key| (key == "FACETAG_TOLERANCE").then(|| bad.to_string()));
            assert!(config.validate().is_err(), "accepted tolerance {bad}");
        }

        let config = Config::from_toml("tolerance = -1.0\n").unwrap();
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_missing_explicit_file() {
        assert!(Config::load(Some(Path::new("/nonexistent/facetag.toml"))).is_err());
    }
}
