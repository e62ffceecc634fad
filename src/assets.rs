use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::mapping::{IdMap, ScrapedPage};
use crate::scraper::Fetcher;
use crate::settings::SanitySettings;

/// Uploads image bytes to the Sanity assets endpoint.
pub struct AssetUploader<'a> {
    fetcher: &'a Fetcher,
    endpoint: String,
    token: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    document: AssetDocument,
}

#[derive(Deserialize)]
struct AssetDocument {
    #[serde(rename = "_id")]
    id: String,
}

/// Counters for one upload pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    pub uploaded: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl<'a> AssetUploader<'a> {
    pub fn new(fetcher: &'a Fetcher, sanity: &SanitySettings, token: String) -> Self {
        Self {
            fetcher,
            endpoint: images_endpoint(sanity),
            token,
        }
    }

    /// Upload one image and return the asset document id.
    pub async fn upload(&self, bytes: Vec<u8>, content_type: Option<&str>) -> Result<String> {
        let response = self
            .fetcher
            .client()
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header(
                reqwest::header::CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("asset upload returned {}: {}", status, body));
        }
        let parsed: UploadResponse = response
            .json()
            .await
            .context("Unexpected asset upload response")?;
        Ok(parsed.document.id)
    }

    /// Download each image URL and upload it, keyed by record id.
    pub async fn mirror(&self, sources: &IdMap<String>) -> (IdMap<String>, UploadStats) {
        let mut assets = IdMap::new();
        let mut stats = UploadStats::default();

        for (id, url) in sources {
            info!("Processing image for {} from {}", id, url);
            match self.mirror_one(url).await {
                Ok(asset_id) => {
                    info!("Uploaded {} as {}", url, asset_id);
                    assets.insert(id.clone(), asset_id);
                    stats.uploaded += 1;
                }
                Err(e) => {
                    warn!("Error mirroring image for {} from {}: {:#}", id, url, e);
                    stats.errors += 1;
                }
            }
        }
        (assets, stats)
    }

    async fn mirror_one(&self, url: &str) -> Result<String> {
        let download = self
            .fetcher
            .download(url)
            .await
            .with_context(|| format!("download {}", url))?;
        self.upload(download.bytes, download.content_type.as_deref())
            .await
    }
}

fn images_endpoint(sanity: &SanitySettings) -> String {
    format!(
        "https://{}.api.sanity.io/v{}/assets/images/{}",
        sanity.project_id, sanity.api_version, sanity.dataset
    )
}

/// Post id → og:image URL for the posts whose scrape found one.
pub fn post_image_sources(scraped: &IdMap<ScrapedPage>) -> (IdMap<String>, usize) {
    let mut skipped = 0;
    let sources = scraped
        .iter()
        .filter_map(|(id, page)| match &page.image_url {
            Some(url) => Some((id.clone(), url.clone())),
            None => {
                info!("Skipping {}: no image_url in scraped data", id);
                skipped += 1;
                None
            }
        })
        .collect();
    (sources, skipped)
}
