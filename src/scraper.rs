use std::sync::OnceLock;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::mapping::{IdMap, ScrapedPage};
use crate::records::{http_url, AuthorRow, PostRow};
use crate::settings::HttpSettings;

/// Counters returned after a scraping pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeStats {
    pub total: usize,
    pub found: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Thin HTTP client shared by scraping and asset downloads.
pub struct Fetcher {
    client: reqwest::Client,
}

/// Downloaded body plus its declared content type.
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl Fetcher {
    pub fn new(http: &HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(http.timeout())
            .danger_accept_invalid_certs(http.accept_invalid_certs)
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch a page as text, replacing invalid UTF-8.
    pub async fn get_html(&self, url: &str) -> Result<String> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn download(&self, url: &str) -> Result<Download> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        Ok(Download {
            bytes,
            content_type,
        })
    }
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap())
}

fn description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<meta\s+name="description"\s+content="([^"]+)""#).unwrap()
    })
}

fn og_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<meta\s+(?:property="og:image"|name="og:image")\s+content="([^"]+)""#)
            .unwrap()
    })
}

/// Pull title, meta description and og:image out of raw HTML.
pub fn extract_metadata(html: &str) -> ScrapedPage {
    let capture = |re: &Regex| {
        re.captures(html)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|s| !s.is_empty())
    };

    ScrapedPage {
        title: capture(title_re()),
        description: capture(description_re()),
        image_url: capture(og_image_re()),
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

/// Scrape each post's website for metadata, one request at a time.
pub async fn scrape_posts(
    fetcher: &Fetcher,
    posts: &[PostRow],
) -> Result<(IdMap<ScrapedPage>, ScrapeStats)> {
    let mut out = IdMap::new();
    let mut stats = ScrapeStats {
        total: posts.len(),
        ..Default::default()
    };
    let pb = progress_bar(posts.len())?;

    for post in posts {
        pb.inc(1);
        let Some(url) = http_url(post.website_url.as_deref()) else {
            debug!("Skipping {}: no valid Website URL", post.id);
            stats.skipped += 1;
            continue;
        };

        match fetcher.get_html(url).await {
            Ok(html) => {
                let page = extract_metadata(&html);
                if page.is_empty() {
                    debug!("No metadata found for {} at {}", post.id, url);
                } else {
                    debug!("Found {} for {}", page.field_names().join(", "), post.id);
                    stats.found += 1;
                    out.insert(post.id.clone(), page);
                }
            }
            Err(e) => {
                warn!("Error scraping {} for {}: {}", url, post.id, e);
                stats.errors += 1;
            }
        }
    }

    pb.finish_and_clear();
    info!(
        "Scraped {} posts ({} with data, {} skipped, {} errors)",
        stats.total, stats.found, stats.skipped, stats.errors
    );
    Ok((out, stats))
}

/// Collect only the og:image URL of each post's website.
pub async fn collect_og_images(
    fetcher: &Fetcher,
    posts: &[PostRow],
) -> Result<(IdMap<String>, ScrapeStats)> {
    let (pages, stats) = scrape_posts(fetcher, posts).await?;
    let images: IdMap<String> = pages
        .into_iter()
        .filter_map(|(id, page)| page.image_url.map(|url| (id, url)))
        .collect();
    let stats = ScrapeStats {
        found: images.len(),
        ..stats
    };
    Ok((images, stats))
}

/// Author images are direct links in the CSV, no fetching involved.
pub fn collect_author_images(authors: &[AuthorRow]) -> IdMap<String> {
    authors
        .iter()
        .filter_map(|a| match http_url(a.image_url.as_deref()) {
            Some(url) => Some((a.document_id(), url.to_string())),
            None => {
                debug!("Skipping {}: no valid Image URL", a.document_id());
                None
            }
        })
        .collect()
}
