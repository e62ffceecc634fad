use std::collections::BTreeSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::mapping::{IdMap, ScrapedPage};
use crate::reconcile::{DocType, GeneratedIds};
use crate::records::{AuthorRow, PostRow};
use crate::slug::slugify;

// ── Document shapes ──

#[derive(Debug, Serialize)]
pub struct SlugField {
    #[serde(rename = "_type")]
    kind: &'static str,
    pub current: String,
}

impl SlugField {
    fn from_title(title: &str) -> Self {
        Self {
            kind: "slug",
            current: slugify(title),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Span {
    #[serde(rename = "_type")]
    kind: &'static str,
    pub text: String,
}

/// One portable-text paragraph.
#[derive(Debug, Serialize)]
pub struct Block {
    #[serde(rename = "_type")]
    kind: &'static str,
    style: &'static str,
    pub children: Vec<Span>,
}

impl Block {
    fn paragraph(text: &str) -> Vec<Block> {
        vec![Block {
            kind: "block",
            style: "normal",
            children: vec![Span {
                kind: "span",
                text: text.to_string(),
            }],
        }]
    }
}

#[derive(Debug, Serialize)]
pub struct Reference {
    #[serde(rename = "_type")]
    kind: &'static str,
    #[serde(rename = "_ref")]
    pub target: String,
}

impl Reference {
    fn to(target: String) -> Self {
        Self {
            kind: "reference",
            target,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageField {
    #[serde(rename = "_type")]
    kind: &'static str,
    pub asset: Reference,
}

impl ImageField {
    fn asset(asset_id: &str) -> Self {
        Self {
            kind: "image",
            asset: Reference::to(asset_id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthorDoc {
    #[serde(rename = "_type")]
    kind: &'static str,
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub slug: SlugField,
    pub bio: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageField>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDoc {
    #[serde(rename = "_type")]
    kind: &'static str,
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub slug: SlugField,
    pub author: Reference,
    pub body: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    pub published_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_image: Option<ImageField>,
}

pub trait SanityDocument: Serialize {
    fn id(&self) -> &str;
}

impl SanityDocument for AuthorDoc {
    fn id(&self) -> &str {
        &self.id
    }
}

impl SanityDocument for PostDoc {
    fn id(&self) -> &str {
        &self.id
    }
}

// ── Building ──

pub fn build_author(row: &AuthorRow, image_asset: Option<&String>) -> AuthorDoc {
    AuthorDoc {
        kind: "author",
        id: row.document_id(),
        name: row.name.clone(),
        slug: SlugField::from_title(&row.name),
        bio: Block::paragraph(&row.bio),
        image: image_asset.map(|a| ImageField::asset(a)),
    }
}

/// Title and body after scraped metadata has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedPost {
    pub title: String,
    pub body: String,
}

/// Scraped title and description take precedence over the CSV values.
pub fn merge_post(row: &PostRow, scraped: Option<&ScrapedPage>) -> MergedPost {
    let base = MergedPost {
        title: row.title.clone(),
        body: row.body.clone(),
    };
    let Some(page) = scraped else {
        return base;
    };

    MergedPost {
        title: page.title.clone().unwrap_or(base.title),
        body: page.description.clone().unwrap_or(base.body),
    }
}

pub fn build_post(
    row: &PostRow,
    scraped: Option<&ScrapedPage>,
    image_asset: Option<&String>,
    published_at: &str,
) -> PostDoc {
    let merged = merge_post(row, scraped);
    if merged.title != row.title {
        debug!("Overriding title for {} with scraped data", row.id);
    }
    if merged.body != row.body {
        debug!("Overriding body for {} with scraped data", row.id);
    }

    PostDoc {
        kind: "post",
        id: row.id.clone(),
        slug: SlugField::from_title(&merged.title),
        title: merged.title,
        author: Reference::to(row.author_ref()),
        body: Block::paragraph(&merged.body),
        website_url: row
            .website_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string),
        published_at: published_at.to_string(),
        main_image: image_asset.map(|a| ImageField::asset(a)),
    }
}

// ── Output ──

/// Writes documents line by line into a temp file next to the target and
/// moves it into place on [`NdjsonSink::finish`].
pub struct NdjsonSink {
    doc_type: DocType,
    target: PathBuf,
    out: BufWriter<NamedTempFile>,
    ids: BTreeSet<String>,
    written: usize,
}

impl NdjsonSink {
    pub fn create(doc_type: DocType, target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        Ok(Self {
            doc_type,
            target: target.to_path_buf(),
            out: BufWriter::new(tmp),
            ids: BTreeSet::new(),
            written: 0,
        })
    }

    pub fn write<D: SanityDocument>(&mut self, doc: &D) -> Result<()> {
        if !self.ids.insert(doc.id().to_string()) {
            warn!("Duplicate {} id {}, later record wins on import", self.doc_type, doc.id());
        }
        serde_json::to_writer(&mut self.out, doc)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Commit the file; the returned ids describe exactly what was written.
    pub fn finish(self) -> Result<GeneratedIds> {
        let tmp = self.out.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.target)
            .with_context(|| format!("Failed to write {}", self.target.display()))?;
        info!(
            "{} created ({} {} documents)",
            self.target.display(),
            self.written,
            self.doc_type
        );
        Ok(GeneratedIds::new(self.doc_type, self.ids))
    }
}

pub fn convert_authors(
    rows: &[AuthorRow],
    image_assets: &IdMap<String>,
    target: &Path,
) -> Result<GeneratedIds> {
    let mut sink = NdjsonSink::create(DocType::Author, target)?;
    for row in rows {
        let id = row.document_id();
        let image = image_assets.get(&id);
        if image.is_some() {
            debug!("Added image for {}", id);
        }
        sink.write(&build_author(row, image))?;
    }
    sink.finish()
}

pub fn convert_posts(
    rows: &[PostRow],
    scraped: &IdMap<ScrapedPage>,
    image_assets: &IdMap<String>,
    published_at: &str,
    target: &Path,
) -> Result<GeneratedIds> {
    let mut sink = NdjsonSink::create(DocType::Post, target)?;
    for row in rows {
        let doc = build_post(
            row,
            scraped.get(&row.id),
            image_assets.get(&row.id),
            published_at,
        );
        sink.write(&doc)?;
    }
    sink.finish()
}

/// Posts whose author reference has no generated author document.
pub fn dangling_author_refs(posts: &[PostRow], authors: &GeneratedIds) -> Vec<(String, String)> {
    posts
        .iter()
        .map(|p| (p.id.clone(), p.author_ref()))
        .filter(|(_, author)| !authors.contains(author))
        .collect()
}
