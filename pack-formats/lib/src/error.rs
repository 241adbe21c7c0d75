//! Error types for the pack format pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// A network fetch that did not produce usable content.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("{url} -> {status}")]
    Status { url: String, status: u16 },

    /// The request never produced a response body.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not the expected JSON document.
    #[error("unexpected document at {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to resolve the pack formats of a single catalog entry.
///
/// These never abort a run; the scheduler logs them and moves on.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Descriptor or archive fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The archive bytes are not a readable container.
    #[error("unreadable archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The archive has no `version.json` entry.
    #[error("version.json not found")]
    MissingMetadata,

    /// `version.json` exists but does not carry a known `pack_version` shape.
    #[error("unrecognized version.json: {0}")]
    Schema(#[from] serde_json::Error),

    /// A major/minor pair could not be collapsed into a number.
    #[error("invalid pack number: {0}")]
    InvalidNumber(String),

    /// Reading the metadata entry out of the archive failed.
    #[error("failed to read version.json: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the mapping store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The mapping file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mapping file is not a valid mapping document.
    #[error("mapping file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Writing the temporary file failed.
    #[error("failed to write mapping: {0}")]
    Write(#[from] std::io::Error),

    /// Renaming the temporary file over the target failed.
    #[error("failed to replace mapping file: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// Serializing the mapping failed.
    #[error("failed to serialize mapping: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Fatal planning errors. Nothing has been fetched when these occur.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The configured cutoff id is not in the catalog.
    #[error("Reference version {0} not found in the manifest.")]
    UnknownCutoff(String),

    /// The cutoff entry carries neither `releaseTime` nor `time`.
    #[error("Reference version {0} has no release time.")]
    UndatedCutoff(String),
}

/// Fatal errors that abort an update run.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The catalog itself could not be fetched.
    #[error("failed to fetch catalog: {0}")]
    Catalog(#[from] FetchError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors raised while publishing the mapping as a pull request.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Transport-level HTTP failure.
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The GitHub API rejected a request.
    #[error("GitHub API error during {action}: {status} {body}")]
    Status {
        action: &'static str,
        status: u16,
        body: String,
    },

    /// The repository is not in `owner/repo` form.
    #[error("invalid repository '{0}', expected owner/repo")]
    InvalidRepository(String),

    /// The flushed mapping file could not be read back.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A GraphQL mutation returned errors.
    #[error("GitHub GraphQL error: {0}")]
    GraphQl(String),
}

/// Errors raised while writing action outputs.
#[derive(Debug, Error)]
#[error("failed to write action output to {path}: {source}")]
pub struct OutputError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Errors raised while arming the lifecycle hooks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Hooks were already armed in this process.
    #[error("shutdown hooks are already armed")]
    AlreadyArmed,
}
