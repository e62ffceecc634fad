use thiserror::Error;

use crate::reconcile::DocType;

/// Failures talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("could not parse id list from store output: {0}")]
    MalformedOutput(String),
    #[error("cannot read {}: {source}", .path.display())]
    File {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Conditions under which no deletion plan may be produced.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("existing {doc_type} ids unavailable: {source}")]
    KnownUnavailable {
        doc_type: DocType,
        #[source]
        source: StoreError,
    },
    #[error("cannot reconcile {known} ids against generated {generated} ids")]
    NamespaceMismatch { known: DocType, generated: DocType },
    #[error(
        "generated {doc_type} set is empty but the store holds {known} documents; \
         rerun with --allow-empty if every {doc_type} should be deleted"
    )]
    EmptyGenerated { doc_type: DocType, known: usize },
    #[error("SANITY_API_TOKEN environment variable is not set")]
    MissingToken,
}
