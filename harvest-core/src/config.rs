//! YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.harvest/
//!   config.yaml      (this file — mode 0600)
//!   xml/             (default working directory, one artifact per id)
//!   state/           (record journal, content store, run log)
//! ```
//!
//! Relative paths in the file resolve against the directory holding it, so
//! the defaults land next to `config.yaml`.
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `load_from(path)` / `save_to(path, …)` — explicit file (CLI `--config`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{config_io_err, ConfigError};

/// Largest `retmax` E-utilities accepts for a search page.
pub const MAX_PAGE_SIZE: usize = 100_000;

/// Largest number of ids sent in one content fetch.
pub const MAX_BATCH_SIZE: usize = 500;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Remote corpus query and transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub database: String,
    /// Search expression selecting the tracked corpus subset.
    pub query: String,
    pub rettype: String,
    /// Element wrapping one document in a fetch response.
    pub article_element: String,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            database: "pubmed".to_string(),
            query: "pubstatusaheadofprint".to_string(),
            rettype: "medline".to_string(),
            article_element: "PubmedArticle".to_string(),
            timeout_secs: 120,
            api_key: None,
        }
    }
}

/// Exponential backoff bounds for transient remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_secs: u64,
    pub ceiling_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: 30,
            ceiling_secs: 3600,
        }
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub remote: RemoteConfig,
    pub page_size: usize,
    pub batch_size: usize,
    /// Staged record mutations buffered before an automatic flush.
    pub write_buffer: usize,
    pub backoff: BackoffConfig,
    pub work_dir: PathBuf,
    pub state_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<PathBuf>,
    pub artifact_extension: String,
    /// Regex applied to archive artifacts; capture group 1 (or the whole
    /// match) is the document id.
    pub dedupe_pattern: String,
    pub process: String,
    pub owner: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            page_size: 1000,
            batch_size: 50,
            write_buffer: 100,
            backoff: BackoffConfig::default(),
            work_dir: PathBuf::from("xml"),
            state_dir: PathBuf::from("state"),
            archive_dir: None,
            artifact_extension: ".xml".to_string(),
            dedupe_pattern: r"<PMID[^>]*>(\d+)</PMID>".to_string(),
            process: "aheadofprint".to_string(),
            owner: std::env::var("USER").unwrap_or_else(|_| "harvest".to_string()),
        }
    }
}

/// Absolute locations derived from a config and the directory it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub work_dir: PathBuf,
    pub state_dir: PathBuf,
    pub archive_dir: Option<PathBuf>,
}

impl ResolvedPaths {
    pub fn records_path(&self) -> PathBuf {
        self.state_dir.join("records.jsonl")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.state_dir.join("content")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.state_dir.join("runs")
    }
}

impl HarvestConfig {
    /// Check every numeric field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(invalid(
                "page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE}, got {}", self.page_size),
            ));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(invalid(
                "batch_size",
                format!("must be between 1 and {MAX_BATCH_SIZE}, got {}", self.batch_size),
            ));
        }
        if self.write_buffer == 0 {
            return Err(invalid("write_buffer", "must be at least 1".to_string()));
        }
        if self.backoff.base_secs == 0 {
            return Err(invalid("backoff.base_secs", "must be at least 1".to_string()));
        }
        if self.backoff.base_secs > self.backoff.ceiling_secs {
            return Err(invalid(
                "backoff.ceiling_secs",
                format!(
                    "must not be below base_secs ({} < {})",
                    self.backoff.ceiling_secs, self.backoff.base_secs
                ),
            ));
        }
        if self.remote.query.trim().is_empty() {
            return Err(invalid("remote.query", "must not be empty".to_string()));
        }
        Ok(())
    }

    /// Resolve relative paths against `base` (normally the config directory).
    pub fn resolve_paths(&self, base: &Path) -> ResolvedPaths {
        ResolvedPaths {
            work_dir: base.join(&self.work_dir),
            state_dir: base.join(&self.state_dir),
            archive_dir: self.archive_dir.as_ref().map(|dir| base.join(dir)),
        }
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.harvest/`
pub fn harvest_root(home: &Path) -> PathBuf {
    home.join(".harvest")
}

/// `<home>/.harvest/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    harvest_root(home).join("config.yaml")
}

/// `dirs::home_dir()` or [`ConfigError::HomeNotFound`].
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load and validate the config at an explicit path.
pub fn load_from(path: &Path) -> Result<HarvestConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| config_io_err(path, e))?;
    let config: HarvestConfig = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load `<home>/.harvest/config.yaml`.
pub fn load_at(home: &Path) -> Result<HarvestConfig, ConfigError> {
    load_from(&config_path_at(home))
}

/// Atomically save `config` to `path`.
///
/// Write flow: serialize → `<name>.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_to(path: &Path, config: &HarvestConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| config_io_err(dir, e))?;
    }
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| config_io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(config_io_err(path, e));
    }
    Ok(())
}

/// `save_to` at `<home>/.harvest/config.yaml`.
pub fn save_at(home: &Path, config: &HarvestConfig) -> Result<(), ConfigError> {
    save_to(&config_path_at(home), config)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| config_io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        HarvestConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: HarvestConfig =
            serde_yaml::from_str("batch_size: 20\nremote:\n  query: cancer\n").unwrap();
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.remote.query, "cancer");
        assert_eq!(config.remote.database, "pubmed");
        assert_eq!(config.page_size, 1000);
    }

    #[rstest]
    #[case::page_zero("page_size: 0", "page_size")]
    #[case::page_too_big("page_size: 100001", "page_size")]
    #[case::batch_zero("batch_size: 0", "batch_size")]
    #[case::batch_too_big("batch_size: 501", "batch_size")]
    #[case::buffer_zero("write_buffer: 0", "write_buffer")]
    #[case::base_zero("backoff:\n  base_secs: 0", "backoff.base_secs")]
    #[case::ceiling_below_base("backoff:\n  base_secs: 60\n  ceiling_secs: 30", "backoff.ceiling_secs")]
    fn out_of_range_fields_are_rejected(#[case] yaml: &str, #[case] field: &str) {
        let config: HarvestConfig = serde_yaml::from_str(yaml).unwrap();
        match config.validate() {
            Err(ConfigError::Invalid { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected invalid {field}, got {other:?}"),
        }
    }

    #[test]
    fn save_then_load_roundtrip() {
        let home = TempDir::new().unwrap();
        let mut config = HarvestConfig::default();
        config.archive_dir = Some(PathBuf::from("/bases/aheadofprint"));
        save_at(home.path(), &config).unwrap();

        let loaded = load_at(home.path()).unwrap();
        assert_eq!(loaded, config);
        assert!(!home.path().join(".harvest").join("config.yaml.tmp").exists());
    }

    #[test]
    fn load_missing_returns_not_found() {
        let home = TempDir::new().unwrap();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(err.to_string().contains("harvest init"));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let config = HarvestConfig {
            archive_dir: Some(PathBuf::from("done")),
            ..HarvestConfig::default()
        };
        let paths = config.resolve_paths(Path::new("/srv/harvest"));
        assert_eq!(paths.work_dir, PathBuf::from("/srv/harvest/xml"));
        assert_eq!(paths.records_path(), PathBuf::from("/srv/harvest/state/records.jsonl"));
        assert_eq!(paths.archive_dir, Some(PathBuf::from("/srv/harvest/done")));

        let absolute = HarvestConfig {
            work_dir: PathBuf::from("/data/xml"),
            ..HarvestConfig::default()
        };
        assert_eq!(
            absolute.resolve_paths(Path::new("/srv/harvest")).work_dir,
            PathBuf::from("/data/xml")
        );
    }
}
