use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::store::DEFAULT_STAGING_DIR;

pub const CONFIG_FILE: &str = "ena-quant.json";
pub const INDEX_ENV: &str = "ENA_QUANT_INDEX";

pub const DEFAULT_CATALOG_URL: &str = "https://www.ebi.ac.uk/ena/portal/api";
pub const DEFAULT_LIMIT: u32 = 1000;
pub const DEFAULT_SALMON: &str = "salmon";
pub const DEFAULT_INDEX: &str = "gencode_index";
pub const DEFAULT_LIBRARY_TYPE: &str = "A";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub staging_dir: Option<String>,
    #[serde(default)]
    pub salmon: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub library_type: Option<String>,
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub strict_file_count: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub root: Utf8PathBuf,
    pub staging_dir: Utf8PathBuf,
    pub salmon: String,
    pub index: Utf8PathBuf,
    pub library_type: String,
    pub threads: Option<u32>,
    pub limit: u32,
    pub catalog_url: String,
    pub strict_file_count: bool,
    pub timeout_secs: u64,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        // An empty config only ever yields defaults.
        ConfigLoader::resolve_config(Config::default(), None)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// `--config` path first, then `ena-quant.json` in the working directory, then
    /// the per-user config directory. No file at all means defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };

        let config = match config_path {
            Some(config_path) => {
                tracing::debug!("loading config from {}", config_path.display());
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
                Self::parse(&content)?
            }
            None => Config::default(),
        };

        let index_override = std::env::var(INDEX_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        Ok(Self::resolve_config(config, index_override))
    }

    pub fn parse(content: &str) -> Result<Config, PipelineError> {
        serde_json::from_str(content).map_err(|err| PipelineError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config, index_override: Option<String>) -> ResolvedConfig {
        let root = Utf8PathBuf::from(config.root.unwrap_or_else(|| ".".to_string()));
        let staging = Utf8PathBuf::from(
            config
                .staging_dir
                .unwrap_or_else(|| DEFAULT_STAGING_DIR.to_string()),
        );
        let staging_dir = if staging.is_absolute() {
            staging
        } else {
            root.join(staging)
        };
        let index = index_override
            .or(config.index)
            .unwrap_or_else(|| DEFAULT_INDEX.to_string());

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            root,
            staging_dir,
            salmon: config.salmon.unwrap_or_else(|| DEFAULT_SALMON.to_string()),
            index: Utf8PathBuf::from(index.trim()),
            library_type: config
                .library_type
                .unwrap_or_else(|| DEFAULT_LIBRARY_TYPE.to_string()),
            threads: config.threads.filter(|threads| *threads > 0),
            limit: config.limit.filter(|limit| *limit > 0).unwrap_or(DEFAULT_LIMIT),
            catalog_url: config
                .catalog_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            strict_file_count: config.strict_file_count.unwrap_or(true),
            timeout_secs: config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        ProjectDirs::from("", "", "ena-quant")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .filter(|path| path.is_file())
    }
}
