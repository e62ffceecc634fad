use anyhow::Context;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::reconcile::{plan_deletions, DeletionPlan, DocType};
use crate::steps::Generated;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Compute and report the plan without touching the store.
    pub dry_run: bool,
    /// Permit deleting every document of a namespace when nothing was generated.
    pub allow_empty: bool,
}

/// What happened to one namespace.
#[derive(Debug)]
pub struct NamespaceOutcome {
    pub doc_type: DocType,
    pub generated: usize,
    pub plan: Result<DeletionPlan, SyncError>,
    pub deleted: bool,
}

#[derive(Debug)]
pub struct SyncReport {
    pub imported: bool,
    pub outcomes: Vec<NamespaceOutcome>,
    /// Import or delete error that stopped the run.
    pub failed: Option<anyhow::Error>,
}

impl SyncReport {
    /// Namespaces for which no deletion plan could be made.
    pub fn blocked(&self) -> Vec<&NamespaceOutcome> {
        self.outcomes.iter().filter(|o| o.plan.is_err()).collect()
    }

    pub fn print(&self) {
        for o in &self.outcomes {
            match &o.plan {
                Ok(plan) if plan.is_empty() => {
                    println!("{}: {} generated, nothing to delete", o.doc_type, o.generated)
                }
                Ok(plan) => {
                    let verb = match (o.deleted, &self.failed) {
                        (true, _) => "deleted",
                        (false, Some(_)) => "did not delete",
                        (false, None) => "would delete",
                    };
                    println!(
                        "{}: {} generated, {} {}: {}",
                        o.doc_type,
                        o.generated,
                        verb,
                        plan.ids.len(),
                        plan.ids.join(" ")
                    );
                }
                Err(e) => println!("{}: deletions skipped ({})", o.doc_type, e),
            }
        }
        if let Some(e) = &self.failed {
            println!("Stopped: {:#}", e);
        }
    }
}

/// Differential update: snapshot the store, import the generated files, then
/// remove documents that the conversion no longer produces.
///
/// Plans are computed from the pre-import snapshot and before any deletion.
/// A namespace whose snapshot failed still gets imported but never deleted from.
/// A failed import stops the run before any deletion; the error is carried in
/// the report so the per-namespace outcomes can still be shown.
pub async fn sync<S: DocumentStore>(
    store: &S,
    generated: &Generated,
    opts: SyncOptions,
) -> SyncReport {
    let mut outcomes = Vec::new();
    for doc_type in DocType::ALL {
        let ids = generated.ids(doc_type);
        let plan = match store.existing_ids(doc_type).await {
            Ok(known) => plan_deletions(&known, ids, opts.allow_empty),
            Err(source) => Err(SyncError::KnownUnavailable { doc_type, source }),
        };
        if let Err(e) = &plan {
            warn!("No deletions for {}: {}", doc_type, e);
        }
        outcomes.push(NamespaceOutcome {
            doc_type,
            generated: ids.len(),
            plan,
            deleted: false,
        });
    }

    if opts.dry_run {
        info!("Dry run, store left untouched");
        return SyncReport {
            imported: false,
            outcomes,
            failed: None,
        };
    }

    for doc_type in DocType::ALL {
        let file = generated.file(doc_type);
        let imported = store
            .import(file)
            .await
            .with_context(|| format!("Import of {} failed, no deletions issued", file.display()));
        if let Err(e) = imported {
            return SyncReport {
                imported: false,
                outcomes,
                failed: Some(e),
            };
        }
    }

    let mut failed = None;
    for outcome in &mut outcomes {
        let Ok(plan) = &outcome.plan else { continue };
        if plan.is_empty() {
            info!("No {} documents to delete", outcome.doc_type);
            continue;
        }
        info!("Deleting {} {} documents", plan.ids.len(), outcome.doc_type);
        let deleted = store
            .delete(plan)
            .await
            .with_context(|| format!("Deleting {} documents failed", outcome.doc_type));
        if let Err(e) = deleted {
            failed = Some(e);
            break;
        }
        outcome.deleted = true;
    }

    SyncReport {
        imported: true,
        outcomes,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{convert_authors, convert_posts};
    use crate::mapping::IdMap;
    use crate::records::{AuthorRow, PostRow};
    use crate::store::memory::MemoryStore;

    fn generated(dir: &std::path::Path, author_ids: &[&str], post_ids: &[&str]) -> Generated {
        let authors: Vec<AuthorRow> = author_ids
            .iter()
            .map(|id| AuthorRow {
                id: id.to_string(),
                name: format!("Author {}", id),
                bio: String::new(),
                image_url: None,
            })
            .collect();
        let posts: Vec<PostRow> = post_ids
            .iter()
            .map(|id| PostRow {
                id: id.to_string(),
                title: format!("Post {}", id),
                body: String::new(),
                author_id: author_ids.first().unwrap_or(&"1").to_string(),
                website_url: None,
            })
            .collect();

        let authors_file = dir.join("authors.ndjson");
        let posts_file = dir.join("posts.ndjson");
        Generated {
            authors: convert_authors(&authors, &IdMap::new(), &authors_file).unwrap(),
            posts: convert_posts(&posts, &IdMap::new(), &IdMap::new(), "now", &posts_file).unwrap(),
            authors_file,
            posts_file,
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::with(DocType::Author, &["author-1", "author-2"]);
        store
            .docs
            .borrow_mut()
            .insert(DocType::Post, ["10", "11", "12"].map(String::from).into());
        store
    }

    #[tokio::test]
    async fn imports_then_deletes_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let out = generated(dir.path(), &["1", "3"], &["10", "12", "13"]);
        let store = seeded();

        let report = sync(&store, &out, SyncOptions::default()).await;
        assert!(report.imported);
        assert!(report.failed.is_none());
        assert!(report.blocked().is_empty());
        assert_eq!(store.imports.borrow().len(), 2);
        assert_eq!(
            *store.deletes.borrow(),
            vec![
                (DocType::Author, vec!["author-2".to_string()]),
                (DocType::Post, vec!["11".to_string()])
            ]
        );
        assert_eq!(
            store.ids(DocType::Author),
            ["author-1", "author-3"].map(String::from).into()
        );
        assert_eq!(store.ids(DocType::Post), ["10", "12", "13"].map(String::from).into());
    }

    #[tokio::test]
    async fn dry_run_leaves_store_alone() {
        let dir = tempfile::tempdir().unwrap();
        let out = generated(dir.path(), &["1"], &["10"]);
        let store = seeded();

        let opts = SyncOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = sync(&store, &out, opts).await;
        assert!(!report.imported);
        assert!(store.imports.borrow().is_empty());
        assert!(store.deletes.borrow().is_empty());

        let post_plan = report.outcomes[1].plan.as_ref().unwrap();
        assert_eq!(post_plan.ids, vec!["11".to_string(), "12".to_string()]);
    }

    #[tokio::test]
    async fn failed_query_blocks_only_that_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let out = generated(dir.path(), &["1"], &["10"]);
        let mut store = seeded();
        store.failing_queries.insert(DocType::Post);

        let report = sync(&store, &out, SyncOptions::default()).await;
        let blocked = report.blocked();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].doc_type, DocType::Post);
        assert!(matches!(
            blocked[0].plan,
            Err(SyncError::KnownUnavailable { doc_type: DocType::Post, .. })
        ));

        // Posts still imported, none deleted; authors reconciled normally.
        assert_eq!(store.deletes.borrow().len(), 1);
        assert_eq!(
            store.deletes.borrow()[0],
            (DocType::Author, vec!["author-2".to_string()])
        );
        assert_eq!(store.ids(DocType::Post), ["10", "11", "12"].map(String::from).into());
    }

    #[tokio::test]
    async fn empty_generation_refuses_to_wipe_store() {
        let dir = tempfile::tempdir().unwrap();
        let out = generated(dir.path(), &["1", "2"], &[]);
        let store = seeded();

        let report = sync(&store, &out, SyncOptions::default()).await;
        assert!(matches!(
            report.outcomes[1].plan,
            Err(SyncError::EmptyGenerated { known: 3, .. })
        ));
        assert_eq!(store.ids(DocType::Post).len(), 3);
        assert!(store.deletes.borrow().is_empty());
    }

    #[tokio::test]
    async fn failed_import_keeps_outcomes_and_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = generated(dir.path(), &["1"], &["10"]);
        let mut store = seeded();
        store.failing_queries.insert(DocType::Author);
        store.failing_imports = true;

        let report = sync(&store, &out, SyncOptions::default()).await;
        assert!(!report.imported);
        assert!(report.failed.is_some());
        assert!(store.deletes.borrow().is_empty());

        // Both namespaces are still reported, including the blocked one.
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.blocked().len(), 1);
        assert_eq!(report.blocked()[0].doc_type, DocType::Author);
        assert!(!report.outcomes[1].deleted);
    }
}
