use crate::error::{ConfigError, InvalidModeError};
use crate::SearchMode;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_PATH_VAR: &str = "PDF_RESEARCH_CONFIG";
pub const PDF_DIR_VAR: &str = "PDF_RESEARCH_DIR";
pub const STORAGE_DIR_VAR: &str = "PDF_RESEARCH_STORAGE";

const APP_DIR: &str = "pdf-research";
const CONFIG_FILE: &str = "config.json";
const FALLBACK_STORAGE: &str = "rag_storage";

/// Persisted defaults. Empty path strings mean "not set".
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub pdf_dir: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub storage_dir: String,
    pub auto_index: bool,
    #[serde_as(deserialize_as = "DefaultOnError")]
    pub search_mode: SearchMode,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            pdf_dir: String::new(),
            storage_dir: String::new(),
            auto_index: true,
            search_mode: SearchMode::Hybrid,
        }
    }
}

impl Configuration {
    pub fn pdf_dir(&self) -> Option<PathBuf> {
        non_empty_path(&self.pdf_dir)
    }

    pub fn storage_dir(&self) -> Option<PathBuf> {
        non_empty_path(&self.storage_dir)
    }

    pub fn remember_paths(&mut self, pdf_dir: &Path, storage_dir: &Path) {
        self.pdf_dir = pdf_dir.to_string_lossy().into_owned();
        self.storage_dir = storage_dir.to_string_lossy().into_owned();
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$PDF_RESEARCH_CONFIG`, else `<config dir>/pdf-research/config.json`.
    pub fn default_location() -> Self {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE)))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fallback_storage_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(|parent| parent.join(FALLBACK_STORAGE))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_STORAGE))
    }

    pub fn load(&self) -> Configuration {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no configuration saved yet");
                return Configuration::default();
            }
            Err(error) => {
                warn!(path = %self.path.display(), %error, "unable to read configuration");
                return Configuration::default();
            }
        };

        match serde_json::from_str::<Configuration>(&raw) {
            Ok(config) => config,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "configuration is malformed, using defaults");
                Configuration::default()
            }
        }
    }

    pub fn save(&self, config: &Configuration) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let serialized = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, serialized).map_err(io_error)?;
        debug!(path = %self.path.display(), "configuration saved");
        Ok(())
    }
}

/// Path defaults taken from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    pub pdf_dir: Option<PathBuf>,
    pub storage_dir: Option<PathBuf>,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .and_then(|value| non_empty_path(&value))
        };
        Self {
            pdf_dir: read(PDF_DIR_VAR),
            storage_dir: read(STORAGE_DIR_VAR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub pdf_dir: Option<PathBuf>,
    pub storage_dir: PathBuf,
}

/// CLI argument, then persisted value, then environment, then `fallback_storage`.
pub fn resolve_paths(
    cli_pdf_dir: Option<&Path>,
    cli_storage_dir: Option<&Path>,
    config: &Configuration,
    env: &EnvDefaults,
    fallback_storage: &Path,
) -> ResolvedPaths {
    let pdf_dir = cli_pdf_dir
        .map(Path::to_path_buf)
        .or_else(|| config.pdf_dir())
        .or_else(|| env.pdf_dir.clone())
        .map(|path| absolutize(&path));

    let storage_dir = cli_storage_dir
        .map(Path::to_path_buf)
        .or_else(|| config.storage_dir())
        .or_else(|| env.storage_dir.clone())
        .unwrap_or_else(|| fallback_storage.to_path_buf());

    ResolvedPaths {
        pdf_dir,
        storage_dir: absolutize(&storage_dir),
    }
}

pub fn resolve_mode(
    cli_mode: Option<&str>,
    config: &Configuration,
) -> Result<SearchMode, InvalidModeError> {
    match cli_mode {
        Some(mode) => mode.parse(),
        None => Ok(config.search_mode),
    }
}

pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_document_loads_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path().join("config.json"));

        let config = store.load();
        assert_eq!(config, Configuration::default());
        assert!(config.auto_index);
        assert_eq!(config.search_mode, SearchMode::Hybrid);
        assert_eq!(store.fallback_storage_dir(), dir.path().join("rag_storage"));
    }

    #[test]
    fn save_overwrites_the_whole_document() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ConfigStore::new(dir.path().join("nested").join("config.json"));
        fs::create_dir_all(dir.path().join("nested"))?;
        fs::write(store.path(), r#"{"pdf_dir": "/old", "legacy_key": 1}"#)?;

        let mut config = store.load();
        config.search_mode = SearchMode::Local;
        config.storage_dir = "/data/store".to_string();
        store.save(&config)?;

        let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(store.path())?)?;
        assert_eq!(
            saved,
            serde_json::json!({
                "pdf_dir": "/old",
                "storage_dir": "/data/store",
                "auto_index": true,
                "search_mode": "local",
            })
        );
        assert_eq!(store.load(), config);
        Ok(())
    }

    #[test]
    fn bad_fields_fall_back_individually() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = ConfigStore::new(dir.path().join("config.json"));
        fs::write(
            store.path(),
            r#"{"pdf_dir": "/papers", "storage_dir": 7, "auto_index": false, "search_mode": "turbo"}"#,
        )?;

        let config = store.load();
        assert_eq!(config.pdf_dir, "/papers");
        assert_eq!(config.storage_dir, "");
        assert!(!config.auto_index);
        assert_eq!(config.search_mode, SearchMode::Hybrid);

        fs::write(store.path(), "[]")?;
        assert_eq!(store.load(), Configuration::default());
        Ok(())
    }

    #[test]
    fn precedence_is_cli_then_config_then_env_then_fallback() {
        let fallback = Path::new("/fallback/rag_storage");
        let env = EnvDefaults {
            pdf_dir: Some(PathBuf::from("/env/pdfs")),
            storage_dir: Some(PathBuf::from("/env/store")),
        };
        let mut config = Configuration::default();

        let resolved = resolve_paths(None, None, &config, &EnvDefaults::default(), fallback);
        assert_eq!(resolved.pdf_dir, None);
        assert_eq!(resolved.storage_dir, fallback);

        let resolved = resolve_paths(None, None, &config, &env, fallback);
        assert_eq!(resolved.pdf_dir, Some(PathBuf::from("/env/pdfs")));
        assert_eq!(resolved.storage_dir, PathBuf::from("/env/store"));

        config.remember_paths(Path::new("/cfg/pdfs"), Path::new("/cfg/store"));
        let resolved = resolve_paths(None, None, &config, &env, fallback);
        assert_eq!(resolved.pdf_dir, Some(PathBuf::from("/cfg/pdfs")));
        assert_eq!(resolved.storage_dir, PathBuf::from("/cfg/store"));

        let resolved = resolve_paths(
            Some(Path::new("/cli/pdfs")),
            Some(Path::new("/cli/store")),
            &config,
            &env,
            fallback,
        );
        assert_eq!(resolved.pdf_dir, Some(PathBuf::from("/cli/pdfs")));
        assert_eq!(resolved.storage_dir, PathBuf::from("/cli/store"));
    }

    #[test]
    fn relative_paths_are_made_absolute() {
        let resolved = resolve_paths(
            Some(Path::new("papers")),
            None,
            &Configuration::default(),
            &EnvDefaults::default(),
            Path::new("store"),
        );
        assert!(resolved.pdf_dir.is_some_and(|path| path.is_absolute()));
        assert!(resolved.storage_dir.is_absolute());
    }

    #[test]
    fn cli_mode_overrides_config_and_is_validated() {
        let config = Configuration {
            search_mode: SearchMode::Global,
            ..Default::default()
        };
        assert_eq!(resolve_mode(None, &config).ok(), Some(SearchMode::Global));
        assert_eq!(resolve_mode(Some("naive"), &config).ok(), Some(SearchMode::Naive));
        assert!(resolve_mode(Some("bogus"), &config).is_err());
    }
}
