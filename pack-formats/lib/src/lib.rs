//! Incremental discovery of datapack and resourcepack formats.
//!
//! For every released version in the launcher catalog, this library fetches
//! the version's client archive, reads the `pack_version` out of its embedded
//! `version.json`, and records the result in a durable mapping file that is
//! safe to resume after interruption.
//!
//! ## Pipeline
//!
//! - [`Supervisor`] - flush-on-exit hooks, armed before anything mutates
//! - [`MappingStore`] - the key to formats table and its atomic flush
//! - [`planner::plan`] - which catalog entries still need resolving
//! - [`scheduler::run`] - bounded-concurrency resolution with per-entry isolation
//! - [`HttpResolver`] - descriptor, archive and metadata fetch for one entry
//! - [`pipeline::update`] - the whole run end to end
//!
//! ## Publishing
//!
//! - [`GitHubPublisher`] - upserts the mapping on a branch and opens or reuses a PR
//! - [`template::render`] - commit message templating
//! - [`ActionOutputs`] - GitHub Actions step outputs

pub mod catalog;
mod error;
pub mod fetch;
pub mod lifecycle;
pub mod outputs;
pub mod pipeline;
pub mod planner;
pub mod publish;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod template;
mod types;

pub use error::{
    FetchError, LifecycleError, OutputError, PlanError, PublishError, ResolveError, StoreError,
    UpdateError,
};
pub use lifecycle::{Supervisor, TerminationCause};
pub use outputs::ActionOutputs;
pub use pipeline::{UpdateOptions, UpdateReport, update};
pub use publish::{GitHubPublisher, PublishOutcome, PublishRequest, Publisher};
pub use resolver::{ArtifactResolver, BoxFuture, HttpResolver, PackVersion, extract_pack_formats};
pub use store::{FlushOutcome, MappingStore};
pub use types::{
    Catalog, CatalogEntry, Descriptor, Download, Downloads, Mapping, PackFormats, PackNumber,
};
