//! One update run: catalog, plan, resolve, flush.

use std::collections::HashMap;

use reqwest::Client;
use tracing::info;

use crate::catalog::{MANIFEST_URL, fetch_catalog};
use crate::error::UpdateError;
use crate::planner::{DEFAULT_CUTOFF, plan};
use crate::resolver::ArtifactResolver;
use crate::scheduler::{self, effective_concurrency};
use crate::store::MappingStore;

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub manifest_url: String,
    /// Id of the oldest catalog entry worth resolving.
    pub cutoff: String,
    /// Explicit concurrency; `None` or zero picks one from the host.
    pub concurrency: Option<usize>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            manifest_url: MANIFEST_URL.to_string(),
            cutoff: DEFAULT_CUTOFF.to_string(),
            concurrency: None,
        }
    }
}

/// Summary handed to outputs and the publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Keys added by this run, in catalog order.
    pub added: Vec<String>,
    /// Ids of entries that failed to resolve.
    pub failed: Vec<String>,
}

impl UpdateReport {
    /// Whether the mapping file changed.
    pub fn did_update(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Runs one update against `store` and flushes it.
///
/// Per-entry failures are logged and reported but do not fail the run.
///
/// ## Errors
///
/// - [`UpdateError::Catalog`] if the catalog cannot be fetched
/// - [`UpdateError::Plan`] if the cutoff is not in the catalog; nothing is
///   resolved and the store is left untouched
/// - [`UpdateError::Store`] if the final flush fails
pub async fn update<R>(
    client: &Client,
    resolver: &R,
    store: &MappingStore,
    options: &UpdateOptions,
) -> Result<UpdateReport, UpdateError>
where
    R: ArtifactResolver + ?Sized,
{
    let catalog = fetch_catalog(client, &options.manifest_url).await?;
    let pending = plan(&catalog, store, &options.cutoff)?;

    let limit = effective_concurrency(options.concurrency);
    info!("Running with concurrency = {limit}");
    info!("{} versions to resolve", pending.len());

    let position: HashMap<&str, usize> = catalog
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.id.as_str(), i))
        .collect();

    let run = scheduler::run(pending, limit, resolver, store).await;
    store.flush()?;

    let mut added = run.added;
    added.sort_by_key(|id| position.get(id.as_str()).copied().unwrap_or(usize::MAX));
    let failed = run.failed.into_iter().map(|f| f.id).collect();

    info!("Added {} versions", added.len());
    Ok(UpdateReport { added, failed })
}
