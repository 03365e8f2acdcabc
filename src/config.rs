use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings applied each time the backing file is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdbConfig {
    /// SQLite `PRAGMA synchronous` level: off, normal, full, or extra
    pub synchronous: String,
    /// How long to wait on a locked database file before failing
    pub busy_timeout_ms: u64,
    /// Prepared statement cache capacity
    pub cache_statements: usize,
}

impl Default for OdbConfig {
    fn default() -> Self {
        Self {
            synchronous: "normal".to_string(),
            busy_timeout_ms: 5000,
            cache_statements: 32,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("odb.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<OdbConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: OdbConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &OdbConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (pass force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Create the directory that will hold the database file
pub fn ensure_db_dir(db_path: &Path) -> crate::Result<()> {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(std::fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(Some(&dir.path().join("odb.toml"))).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odb.toml");
        let config = OdbConfig {
            synchronous: "full".to_string(),
            ..OdbConfig::default()
        };

        write_config(&path, &config, false).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), Some(config.clone()));

        // Refuses to clobber without force
        assert!(write_config(&path, &config, false).is_err());
        assert!(write_config(&path, &config, true).is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: OdbConfig = toml::from_str("busy_timeout_ms = 250").unwrap();
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.synchronous, "normal");
        assert_eq!(config.cache_statements, 32);
    }

    #[test]
    fn test_ensure_db_dir_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("store.odb");
        ensure_db_dir(&db_path).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
