use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::reconcile::{DeletionPlan, DocType, KnownIds};
use crate::settings::SanitySettings;

/// What the migration needs from the content backend.
pub trait DocumentStore {
    /// Live list of ids stored under `doc_type`. Any failure is an error,
    /// never an empty list.
    async fn existing_ids(&self, doc_type: DocType) -> Result<KnownIds, StoreError>;

    /// Create or replace every document in an NDJSON file.
    async fn import(&self, ndjson: &Path) -> Result<(), StoreError>;

    /// Remove the planned documents of one namespace.
    async fn delete(&self, plan: &DeletionPlan) -> Result<(), StoreError>;
}

/// Drives the `sanity` command line tool from the studio directory.
pub struct SanityCli {
    program: String,
    base_args: Vec<String>,
    project_dir: PathBuf,
    dataset: String,
    delete_batch: usize,
}

impl SanityCli {
    /// `cli` may carry a launcher prefix, e.g. `npx sanity`.
    pub fn new(settings: &SanitySettings) -> Self {
        let mut words = settings.cli.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_else(|| "sanity".to_string());
        Self {
            program,
            base_args: words.collect(),
            project_dir: settings.project_dir.clone(),
            dataset: settings.dataset.clone(),
            delete_batch: settings.delete_batch.max(1),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String, StoreError> {
        let command = std::iter::once(&self.program)
            .chain(&self.base_args)
            .chain(args)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        info!("Running: {}", command);

        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .current_dir(&self.project_dir)
            .output()
            .await
            .map_err(|source| StoreError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(StoreError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("{}", stdout.trim());
        Ok(stdout)
    }
}

impl DocumentStore for SanityCli {
    async fn existing_ids(&self, doc_type: DocType) -> Result<KnownIds, StoreError> {
        let args = vec![
            "documents".to_string(),
            "query".to_string(),
            id_query(doc_type),
            "--dataset".to_string(),
            self.dataset.clone(),
        ];
        let stdout = self.run(&args).await?;
        let ids = parse_query_output(&stdout)?;
        info!("Found {} existing {} documents", ids.len(), doc_type);
        Ok(KnownIds::new(doc_type, ids))
    }

    async fn import(&self, ndjson: &Path) -> Result<(), StoreError> {
        // The CLI runs from the studio directory, so relative paths would break.
        let file = std::fs::canonicalize(ndjson).map_err(|source| StoreError::File {
            path: ndjson.to_path_buf(),
            source,
        })?;
        let args = vec![
            "dataset".to_string(),
            "import".to_string(),
            file.display().to_string(),
            self.dataset.clone(),
            "--replace".to_string(),
        ];
        self.run(&args).await.map(|_| ())
    }

    async fn delete(&self, plan: &DeletionPlan) -> Result<(), StoreError> {
        debug!("Deleting {} {} documents in batches of {}", plan.ids.len(), plan.doc_type, self.delete_batch);
        for chunk in plan.ids.chunks(self.delete_batch) {
            let mut args = vec!["documents".to_string(), "delete".to_string()];
            args.extend(chunk.iter().cloned());
            args.push("--dataset".to_string());
            args.push(self.dataset.clone());
            self.run(&args).await?;
        }
        Ok(())
    }
}

/// GROQ query returning the ids of every document of one type.
pub fn id_query(doc_type: DocType) -> String {
    format!("*[_type == \"{}\"]._id", doc_type.as_str())
}

/// The CLI may print warnings ahead of the JSON array; skip to the first `[`.
pub fn parse_query_output(stdout: &str) -> Result<Vec<String>, StoreError> {
    let start = stdout.find('[').ok_or_else(|| {
        StoreError::MalformedOutput(format!("no JSON array in output: {:?}", truncate(stdout)))
    })?;
    serde_json::from_str::<Vec<String>>(stdout[start..].trim())
        .map_err(|e| StoreError::MalformedOutput(e.to_string()))
}

fn truncate(s: &str) -> String {
    s.chars().take(200).collect()
}

#[cfg(test)]
pub mod memory {
    use std::cell::RefCell;
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    /// In-process store for exercising the sync flow.
    #[derive(Default)]
    pub struct MemoryStore {
        pub docs: RefCell<BTreeMap<DocType, BTreeSet<String>>>,
        pub failing_queries: BTreeSet<DocType>,
        pub failing_imports: bool,
        pub imports: RefCell<Vec<PathBuf>>,
        pub deletes: RefCell<Vec<(DocType, Vec<String>)>>,
    }

    impl MemoryStore {
        pub fn with(doc_type: DocType, ids: &[&str]) -> Self {
            let store = Self::default();
            store
                .docs
                .borrow_mut()
                .insert(doc_type, ids.iter().map(|s| s.to_string()).collect());
            store
        }

        pub fn ids(&self, doc_type: DocType) -> BTreeSet<String> {
            self.docs.borrow().get(&doc_type).cloned().unwrap_or_default()
        }
    }

    impl DocumentStore for MemoryStore {
        async fn existing_ids(&self, doc_type: DocType) -> Result<KnownIds, StoreError> {
            if self.failing_queries.contains(&doc_type) {
                return Err(StoreError::MalformedOutput("query failed".into()));
            }
            Ok(KnownIds::new(doc_type, self.ids(doc_type)))
        }

        async fn import(&self, ndjson: &Path) -> Result<(), StoreError> {
            if self.failing_imports {
                return Err(StoreError::CommandFailed {
                    command: format!("import {}", ndjson.display()),
                    status: "exit status: 1".into(),
                    stderr: "import failed".into(),
                });
            }
            let raw = std::fs::read_to_string(ndjson).map_err(|source| StoreError::File {
                path: ndjson.to_path_buf(),
                source,
            })?;
            let mut docs = self.docs.borrow_mut();
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                let v: serde_json::Value = serde_json::from_str(line)
                    .map_err(|e| StoreError::MalformedOutput(e.to_string()))?;
                let doc_type = match v["_type"].as_str() {
                    Some("author") => DocType::Author,
                    Some("post") => DocType::Post,
                    other => return Err(StoreError::MalformedOutput(format!("{:?}", other))),
                };
                let id = v["_id"].as_str().unwrap_or_default().to_string();
                docs.entry(doc_type).or_default().insert(id);
            }
            self.imports.borrow_mut().push(ndjson.to_path_buf());
            Ok(())
        }

        /// Only touches the plan's namespace; an id that is not stored there
        /// is an error, so a plan built for the wrong type cannot pass silently.
        async fn delete(&self, plan: &DeletionPlan) -> Result<(), StoreError> {
            let mut docs = self.docs.borrow_mut();
            let set = docs.entry(plan.doc_type).or_default();
            if let Some(id) = plan.ids.iter().find(|id| !set.contains(*id)) {
                return Err(StoreError::MalformedOutput(format!(
                    "{} is not a {} document",
                    id, plan.doc_type
                )));
            }
            for id in &plan.ids {
                set.remove(id);
            }
            self.deletes
                .borrow_mut()
                .push((plan.doc_type, plan.ids.clone()));
            Ok(())
        }
    }
}
