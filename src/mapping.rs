use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Record id → value, as stored in the JSON side files between steps.
pub type IdMap<V> = BTreeMap<String, V>;

/// Metadata scraped from a post's website.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ScrapedPage {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.image_url.is_none()
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        [
            ("title", self.title.is_some()),
            ("description", self.description.is_some()),
            ("image_url", self.image_url.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }
}

/// Load a side file, treating a missing file as an empty mapping.
pub fn load_optional<V: DeserializeOwned>(path: &Path) -> Result<IdMap<V>> {
    if !path.exists() {
        info!("{} not found, continuing without it", path.display());
        return Ok(IdMap::new());
    }
    load(path)
}

pub fn load<V: DeserializeOwned>(path: &Path) -> Result<IdMap<V>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let map = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    info!("Loaded {}", path.display());
    Ok(map)
}

pub fn save<V: Serialize>(path: &Path, map: &IdMap<V>) -> Result<()> {
    let json = serde_json::to_string_pretty(map)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
