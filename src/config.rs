use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite file written by the scanner. Opened read-only.
    pub db_path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: "catalog.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub ledger_db_path: String,
    /// Live virtual tree. Rebuilds stage next to it and swap in.
    pub mount_root: PathBuf,
    /// Stable per-file link targets. Must live outside `mount_root`.
    pub placeholder_root: PathBuf,
    pub create_links: bool,
    pub max_links_per_directory: usize,
    pub storage_root_depth: usize,
    pub axes: Vec<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            ledger_db_path: "catalog_view.db".to_string(),
            mount_root: PathBuf::from("./mnt/catalog"),
            placeholder_root: PathBuf::from("./mnt/.placeholders"),
            create_links: true,
            max_links_per_directory: 1000,
            storage_root_depth: 2,
            axes: ["type", "size", "date", "duplicates", "storage_roots"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub path: PathBuf,
    pub writer_heap_bytes: usize,
    pub query_cache_capacity: usize,
    pub facet_scan_limit: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./index"),
            writer_heap_bytes: 50_000_000,
            query_cache_capacity: 256,
            facet_scan_limit: 1000,
        }
    }
}

/// Load `Config.toml` (optional) layered under `PROJECTOR__SECTION__KEY`
/// environment overrides.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("PROJECTOR")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
