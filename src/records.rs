use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(rename = "Image URL", default)]
    pub image_url: Option<String>,
}

impl AuthorRow {
    pub fn document_id(&self) -> String {
        author_document_id(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub author_id: String,
    #[serde(rename = "Website URL", default)]
    pub website_url: Option<String>,
}

impl PostRow {
    pub fn author_ref(&self) -> String {
        author_document_id(&self.author_id)
    }
}

fn author_document_id(raw: &str) -> String {
    format!("author-{}", raw.trim())
}

pub fn read_authors(path: &Path) -> Result<Vec<AuthorRow>> {
    read_rows(path)
}

pub fn read_posts(path: &Path) -> Result<Vec<PostRow>> {
    read_rows(path)
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("{}: bad record {}", path.display(), i + 1)))
        .collect()
}

/// Only absolute http(s) links are worth fetching.
pub fn http_url(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|u| u.starts_with("http"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_authors_with_optional_image_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authors.csv");
        std::fs::write(
            &path,
            "id,name,bio,Image URL\n7,Jane Doe,Writes things,https://img.example/jane.png\n8,Bo,,\n",
        )
        .unwrap();

        let rows = read_authors(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].document_id(), "author-7");
        assert_eq!(rows[0].image_url.as_deref(), Some("https://img.example/jane.png"));
        assert_eq!(rows[1].bio, "");
        assert_eq!(http_url(rows[1].image_url.as_deref()), None);
    }

    #[test]
    fn reads_posts_without_website_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.csv");
        std::fs::write(&path, "id,title,body,author_id\n42,Hello,\"Body, with comma\",7\n").unwrap();

        let rows = read_posts(&path).unwrap();
        assert_eq!(rows[0].id, "42");
        assert_eq!(rows[0].body, "Body, with comma");
        assert_eq!(rows[0].author_ref(), "author-7");
        assert!(rows[0].website_url.is_none());
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.csv");
        std::fs::write(&path, "id,title\n1,Only title\n").unwrap();
        assert!(read_posts(&path).is_err());
    }

    #[test]
    fn only_http_links_are_fetched() {
        assert_eq!(http_url(Some(" https://a.example ")), Some("https://a.example"));
        assert_eq!(http_url(Some("ftp://a.example")), None);
        assert_eq!(http_url(Some("")), None);
        assert_eq!(http_url(None), None);
    }
}
