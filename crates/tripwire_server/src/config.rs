//! Config file loading.

use std::path::{Path, PathBuf};
use tripwire_runtime::{ConfigError, RouterConfig};

/// Errors loading a config file
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// File could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// I/O error
        source: std::io::Error,
    },
    /// File is not a valid config document
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Decode error
        source: serde_json::Error,
    },
    /// Values are out of range
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Read a JSON router config. Missing keys take their defaults.
///
/// # Errors
///
/// Returns error if the file cannot be read, parsed, or validated
pub fn load(path: &Path) -> Result<RouterConfig, ConfigFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RouterConfig =
        serde_json::from_str(&text).map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tripwire_runtime::EvictionPolicy;

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_loaded_tools": 12, "eviction_policy": "hybrid"}}"#).unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.max_loaded_tools, 12);
        assert_eq!(config.eviction_policy, EvictionPolicy::Hybrid);
        assert_eq!(config.default_timeout_ms, 30_000);
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(&dir.path().join("missing.json")),
            Err(ConfigFileError::Read { .. })
        ));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "max_loaded_tools = 3").unwrap();
        assert!(matches!(load(&garbage), Err(ConfigFileError::Parse { .. })));

        let zero = dir.path().join("zero.json");
        std::fs::write(&zero, r#"{"max_loaded_tools": 0}"#).unwrap();
        assert!(matches!(
            load(&zero),
            Err(ConfigFileError::Invalid(ConfigError::ZeroCapacity))
        ));
    }
}
