use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::SyncError;

const DEFAULT_CONFIG_FILE: &str = "migrate";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub paths: Paths,
    pub sanity: SanitySettings,
    pub http: HttpSettings,
}

/// Input and output files, resolved against `work_dir`.
#[derive(Debug, Clone, Deserialize)]
pub struct Paths {
    pub work_dir: PathBuf,
    pub authors_csv: PathBuf,
    pub posts_csv: PathBuf,
    pub authors_ndjson: PathBuf,
    pub posts_ndjson: PathBuf,
    pub scraped_data: PathBuf,
    pub image_mapping: PathBuf,
    pub author_image_mapping: PathBuf,
    pub image_asset_mapping: PathBuf,
    pub author_image_asset_mapping: PathBuf,
}

impl Paths {
    pub fn resolve(&self, file: &Path) -> PathBuf {
        self.work_dir.join(file)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SanitySettings {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    /// Directory holding `sanity.cli.ts`; the CLI runs from here.
    pub project_dir: PathBuf,
    pub cli: String,
    pub delete_batch: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Defaults, then `migrate.toml` (or `file`) if present, then `MIGRATE_*`
    /// environment variables (`MIGRATE_SANITY__DATASET=staging`).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .set_default("paths.work_dir", ".")?
            .set_default("paths.authors_csv", "authors.csv")?
            .set_default("paths.posts_csv", "posts.csv")?
            .set_default("paths.authors_ndjson", "authors.ndjson")?
            .set_default("paths.posts_ndjson", "posts.ndjson")?
            .set_default("paths.scraped_data", "scraped_data.json")?
            .set_default("paths.image_mapping", "image_mapping.json")?
            .set_default("paths.author_image_mapping", "author_image_mapping.json")?
            .set_default("paths.image_asset_mapping", "image_asset_mapping.json")?
            .set_default(
                "paths.author_image_asset_mapping",
                "author_image_asset_mapping.json",
            )?
            .set_default("sanity.project_id", "4n33m7o6")?
            .set_default("sanity.dataset", "production")?
            .set_default("sanity.api_version", "2024-05-01")?
            .set_default("sanity.project_dir", "sanity")?
            .set_default("sanity.cli", "sanity")?
            .set_default("sanity.delete_batch", 100)?
            .set_default("http.timeout_secs", 10)?
            .set_default("http.user_agent", USER_AGENT)?
            .set_default("http.accept_invalid_certs", false)?
            .add_source(file_source)
            .add_source(
                Environment::with_prefix("MIGRATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build settings")?
            .try_deserialize()
            .context("Invalid settings")
    }
}

/// Write token for the Sanity project.
pub fn api_token() -> Result<String, SyncError> {
    std::env::var("SANITY_API_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or(SyncError::MissingToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_script_layout() {
        let s = Settings::load(None).unwrap();
        assert_eq!(s.paths.authors_csv, PathBuf::from("authors.csv"));
        assert_eq!(s.paths.resolve(&s.paths.posts_ndjson), PathBuf::from("./posts.ndjson"));
        assert_eq!(s.sanity.dataset, "production");
        assert_eq!(s.sanity.delete_batch, 100);
        assert_eq!(s.http.timeout(), Duration::from_secs(10));
        assert!(!s.http.accept_invalid_certs);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[sanity]\ndataset = \"staging\"\n\n[http]\ntimeout_secs = 3\n",
        )
        .unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.sanity.dataset, "staging");
        assert_eq!(s.http.timeout_secs, 3);
        assert_eq!(s.sanity.api_version, "2024-05-01");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/migrate.toml"))).is_err());
    }
}
