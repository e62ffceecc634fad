use std::collections::BTreeSet;
use std::fmt;

use crate::error::SyncError;

/// Document-type namespace. Ids are unique within one namespace only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocType {
    Author,
    Post,
}

impl DocType {
    pub const ALL: [DocType; 2] = [DocType::Author, DocType::Post];

    pub fn as_str(self) -> &'static str {
        match self {
            DocType::Author => "author",
            DocType::Post => "post",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ids present in the store for one namespace, taken from a live query that
/// succeeded and parsed cleanly.
#[derive(Debug, Clone)]
pub struct KnownIds {
    doc_type: DocType,
    ids: BTreeSet<String>,
}

impl KnownIds {
    pub fn new(doc_type: DocType, ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            doc_type,
            ids: ids.into_iter().collect(),
        }
    }

    pub fn doc_type(&self) -> DocType {
        self.doc_type
    }

    pub fn ids(&self) -> &BTreeSet<String> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Ids written by a conversion pass whose output file was fully committed.
#[derive(Debug, Clone)]
pub struct GeneratedIds {
    doc_type: DocType,
    ids: BTreeSet<String>,
}

impl GeneratedIds {
    pub(crate) fn new(doc_type: DocType, ids: BTreeSet<String>) -> Self {
        Self { doc_type, ids }
    }

    pub fn doc_type(&self) -> DocType {
        self.doc_type
    }

    pub fn ids(&self) -> &BTreeSet<String> {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Ids that are known to the store but absent from the generated set.
pub fn reconcile(known: &BTreeSet<String>, generated: &BTreeSet<String>) -> BTreeSet<String> {
    known.difference(generated).cloned().collect()
}

/// Deletions for one namespace, computed before anything is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    pub doc_type: DocType,
    pub ids: Vec<String>,
}

impl DeletionPlan {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Validate both snapshots and compute the deletion plan.
///
/// An empty generated set against a non-empty store usually means the
/// conversion read nothing, so it is refused unless `allow_empty` is set.
pub fn plan_deletions(
    known: &KnownIds,
    generated: &GeneratedIds,
    allow_empty: bool,
) -> Result<DeletionPlan, SyncError> {
    if known.doc_type() != generated.doc_type() {
        return Err(SyncError::NamespaceMismatch {
            known: known.doc_type(),
            generated: generated.doc_type(),
        });
    }
    if generated.is_empty() && !known.is_empty() && !allow_empty {
        return Err(SyncError::EmptyGenerated {
            doc_type: generated.doc_type(),
            known: known.len(),
        });
    }

    let ids = reconcile(known.ids(), generated.ids()).into_iter().collect();
    Ok(DeletionPlan {
        doc_type: known.doc_type(),
        ids,
    })
}
