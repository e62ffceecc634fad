use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::assets::{post_image_sources, AssetUploader, UploadStats};
use crate::convert::{convert_authors, convert_posts, dangling_author_refs};
use crate::mapping::{self, IdMap, ScrapedPage};
use crate::reconcile::{DocType, GeneratedIds};
use crate::records::{read_authors, read_posts};
use crate::scraper::{self, Fetcher, ScrapeStats};
use crate::settings::Settings;

/// Output of a completed conversion pass for both namespaces.
#[derive(Debug)]
pub struct Generated {
    pub authors: GeneratedIds,
    pub posts: GeneratedIds,
    pub authors_file: PathBuf,
    pub posts_file: PathBuf,
}

impl Generated {
    pub fn ids(&self, doc_type: DocType) -> &GeneratedIds {
        match doc_type {
            DocType::Author => &self.authors,
            DocType::Post => &self.posts,
        }
    }

    pub fn file(&self, doc_type: DocType) -> &PathBuf {
        match doc_type {
            DocType::Author => &self.authors_file,
            DocType::Post => &self.posts_file,
        }
    }
}

/// authors.csv → author_image_mapping.json
pub fn author_images(settings: &Settings) -> Result<usize> {
    let p = &settings.paths;
    let authors = read_authors(&p.resolve(&p.authors_csv))?;
    let map = scraper::collect_author_images(&authors);
    mapping::save(&p.resolve(&p.author_image_mapping), &map)?;
    info!("Found image URLs for {} of {} authors", map.len(), authors.len());
    Ok(map.len())
}

/// posts.csv → scraped_data.json
pub async fn scrape(settings: &Settings, fetcher: &Fetcher) -> Result<ScrapeStats> {
    let p = &settings.paths;
    let posts = read_posts(&p.resolve(&p.posts_csv))?;
    let (pages, stats) = scraper::scrape_posts(fetcher, &posts).await?;
    mapping::save(&p.resolve(&p.scraped_data), &pages)?;
    Ok(stats)
}

/// posts.csv → image_mapping.json
pub async fn og_images(settings: &Settings, fetcher: &Fetcher) -> Result<ScrapeStats> {
    let p = &settings.paths;
    let posts = read_posts(&p.resolve(&p.posts_csv))?;
    let (images, stats) = scraper::collect_og_images(fetcher, &posts).await?;
    mapping::save(&p.resolve(&p.image_mapping), &images)?;
    Ok(stats)
}

/// Mirror post og:images and author images into Sanity assets.
pub async fn upload_images(
    settings: &Settings,
    fetcher: &Fetcher,
    token: String,
) -> Result<(UploadStats, UploadStats)> {
    let p = &settings.paths;
    let uploader = AssetUploader::new(fetcher, &settings.sanity, token);

    let scraped: IdMap<ScrapedPage> = mapping::load(&p.resolve(&p.scraped_data))?;
    let (sources, skipped) = post_image_sources(&scraped);
    let (post_assets, mut post_stats) = uploader.mirror(&sources).await;
    post_stats.skipped = skipped;
    mapping::save(&p.resolve(&p.image_asset_mapping), &post_assets)?;

    let author_sources: IdMap<String> = mapping::load_optional(&p.resolve(&p.author_image_mapping))?;
    let (author_assets, author_stats) = uploader.mirror(&author_sources).await;
    mapping::save(&p.resolve(&p.author_image_asset_mapping), &author_assets)?;

    Ok((post_stats, author_stats))
}

/// CSV + side files → authors.ndjson, posts.ndjson.
pub fn convert(settings: &Settings, published_at: &str) -> Result<Generated> {
    let p = &settings.paths;
    let authors_file = p.resolve(&p.authors_ndjson);
    let posts_file = p.resolve(&p.posts_ndjson);

    let author_rows = read_authors(&p.resolve(&p.authors_csv))?;
    let author_assets = mapping::load_optional(&p.resolve(&p.author_image_asset_mapping))?;
    let authors = convert_authors(&author_rows, &author_assets, &authors_file)?;

    let post_rows = read_posts(&p.resolve(&p.posts_csv))?;
    let scraped = mapping::load_optional(&p.resolve(&p.scraped_data))?;
    let post_assets = mapping::load_optional(&p.resolve(&p.image_asset_mapping))?;
    let posts = convert_posts(&post_rows, &scraped, &post_assets, published_at, &posts_file)?;

    for (post_id, author) in dangling_author_refs(&post_rows, &authors) {
        warn!("Post {} references missing author {}", post_id, author);
    }

    Ok(Generated {
        authors,
        posts,
        authors_file,
        posts_file,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Settings rooted in `dir`, with the two CSV exports written there.
    pub fn workspace(dir: &std::path::Path, authors: &str, posts: &str) -> Settings {
        std::fs::write(dir.join("authors.csv"), authors).unwrap();
        std::fs::write(dir.join("posts.csv"), posts).unwrap();
        let mut settings = Settings::load(None).unwrap();
        settings.paths.work_dir = dir.to_path_buf();
        settings
    }
}
