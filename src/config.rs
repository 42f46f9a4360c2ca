use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "dag_memory.db";
pub const DEFAULT_EXPORT_DIR: &str = "dags";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Contents of `dagmem.toml`. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DagmemConfig {
    pub database: Option<String>,
    pub export_dir: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub strict: Option<bool>,
}

/// Fully resolved settings, fixed for the life of the process
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database: PathBuf,
    pub export_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub strict: bool,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// `Some(false)` turns off a `strict = true` from the file
    pub strict: Option<bool>,
}

impl DagmemConfig {
    /// Config written by `dagmem init`
    pub fn with_defaults() -> Self {
        Self {
            database: Some(DEFAULT_DATABASE.to_string()),
            export_dir: Some(DEFAULT_EXPORT_DIR.to_string()),
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT),
            strict: Some(false),
        }
    }

    pub fn resolve(&self, overrides: Overrides) -> Settings {
        Settings {
            database: overrides
                .database
                .or_else(|| self.database.as_ref().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            export_dir: overrides
                .export_dir
                .or_else(|| self.export_dir.as_ref().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR)),
            host: overrides
                .host
                .or_else(|| self.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(self.port).unwrap_or(DEFAULT_PORT),
            strict: overrides.strict.or(self.strict).unwrap_or(false),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("dagmem.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<DagmemConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: DagmemConfig = toml::from_str(&contents)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(Some(config))
}

/// Write `config` as TOML, refusing to replace an existing file unless `force`
pub fn write_config(path: &Path, config: &DagmemConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    ensure_parent_dir(path)?;
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents).with_context(|| format!("failed to write config {}", path.display()))?;
    Ok(())
}

/// Create the directory that will hold `path` (database file, config file)
pub fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = DagmemConfig::default().resolve(Overrides::default());
        assert_eq!(settings.database, PathBuf::from("dag_memory.db"));
        assert_eq!(settings.export_dir, PathBuf::from("dags"));
        assert_eq!(settings.port, 8000);
        assert!(!settings.strict);
    }

    #[test]
    fn test_overrides_win() {
        let config = DagmemConfig {
            database: Some("file.db".to_string()),
            port: Some(9000),
            strict: Some(true),
            ..Default::default()
        };
        let settings = config.resolve(Overrides {
            database: Some(PathBuf::from("cli.db")),
            ..Default::default()
        });

        assert_eq!(settings.database, PathBuf::from("cli.db"));
        assert_eq!(settings.port, 9000);
        assert!(settings.strict);
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dagmem.toml");

        write_config(&path, &DagmemConfig::with_defaults(), false).unwrap();
        assert!(write_config(&path, &DagmemConfig::default(), false).is_err());

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded, DagmemConfig::with_defaults());
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_ensure_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state").join("dag_memory.db");
        ensure_parent_dir(&db).unwrap();
        ensure_parent_dir(Path::new("dag_memory.db")).unwrap();
        assert!(dir.path().join("state").is_dir());
    }

    #[test]
    fn test_cli_can_disable_strict_from_file() {
        let config = DagmemConfig {
            strict: Some(true),
            ..Default::default()
        };

        let off = config.resolve(Overrides {
            strict: Some(false),
            ..Default::default()
        });
        assert!(!off.strict);
        assert!(config.resolve(Overrides::default()).strict);
    }

    #[test]
    fn test_invalid_config_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dagmem.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err}").contains("dagmem.toml"), "{err}");
    }

    #[test]
    fn test_write_config_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc").join("dagmem.toml");

        write_config(&path, &DagmemConfig::with_defaults(), false).unwrap();
        assert!(path.is_file());
    }
}
