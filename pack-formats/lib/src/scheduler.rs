//! Bounded-concurrency driver for artifact resolution.
//!
//! Every planned entry becomes one resolution future. At most `limit` of them
//! are polled at a time; results are merged into the store by the single
//! consumer loop as they complete, so completion order (not catalog order)
//! determines the order of [`RunReport::added`].

use futures::stream::{self, StreamExt};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::{error, info};

use crate::error::ResolveError;
use crate::planner::PendingSet;
use crate::resolver::ArtifactResolver;
use crate::store::MappingStore;

/// Approximate memory held per in-flight resolution (one client archive).
pub const EST_MEM_PER_JOB: u64 = 80 * 1024 * 1024;

/// Upper bound on automatic concurrency.
pub const MAX_CONCURRENCY: usize = 8;

/// Concurrency limit for a host with `logical_cpus` cores and `total_memory` bytes.
///
/// The smallest of the core count, the number of archives that fit in
/// memory, and [`MAX_CONCURRENCY`], but never below one.
///
/// ## Examples
///
/// ```
/// use pack_formats_lib::scheduler::concurrency_bound;
///
/// assert_eq!(concurrency_bound(16, 64 * 1024 * 1024 * 1024), 8);
/// assert_eq!(concurrency_bound(2, 64 * 1024 * 1024 * 1024), 2);
/// assert_eq!(concurrency_bound(16, 200 * 1024 * 1024), 2);
/// assert_eq!(concurrency_bound(0, 0), 1);
/// ```
#[must_use]
pub fn concurrency_bound(logical_cpus: usize, total_memory: u64) -> usize {
    let memory_bound = usize::try_from(total_memory / EST_MEM_PER_JOB).unwrap_or(usize::MAX);
    MAX_CONCURRENCY.min(logical_cpus).min(memory_bound).max(1)
}

/// Concurrency limit derived from the current host.
pub fn auto_concurrency() -> usize {
    let sys = System::new_with_specifics(
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );
    concurrency_bound(sys.cpus().len(), sys.total_memory())
}

/// A configured positive limit, or the host-derived one.
pub fn effective_concurrency(configured: Option<usize>) -> usize {
    match configured {
        Some(limit) if limit > 0 => limit,
        _ => auto_concurrency(),
    }
}

/// An entry whose resolution failed.
#[derive(Debug)]
pub struct FailedEntry {
    pub id: String,
    pub error: ResolveError,
}

/// Outcome of one scheduler run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Keys added to the store, in completion order.
    pub added: Vec<String>,
    /// Entries that failed and were left out of the store.
    pub failed: Vec<FailedEntry>,
}

/// Resolves every pending entry with at most `limit` in flight.
///
/// Failures are logged and collected; they never cancel sibling work and
/// there are no retries. Returns once every entry has either succeeded or
/// failed.
pub async fn run<R>(
    pending: PendingSet,
    limit: usize,
    resolver: &R,
    store: &MappingStore,
) -> RunReport
where
    R: ArtifactResolver + ?Sized,
{
    let limit = limit.max(1);
    let mut results = stream::iter(pending)
        .map(|entry| async move {
            let result = resolver.resolve(&entry).await;
            (entry, result)
        })
        .buffer_unordered(limit);

    let mut report = RunReport::default();
    while let Some((entry, result)) = results.next().await {
        match result {
            Ok(formats) => {
                if store.put(entry.id.clone(), formats) {
                    info!(
                        "{}: data={}, res={}",
                        entry.id, formats.datapack, formats.resourcepack
                    );
                    report.added.push(entry.id);
                }
            }
            Err(e) => {
                error!("Failed to process {}: {e}", entry.id);
                report.failed.push(FailedEntry {
                    id: entry.id,
                    error: e,
                });
            }
        }
    }

    report
}
