//! Selection of catalog entries that still need resolving.

use tracing::debug;

use crate::error::PlanError;
use crate::store::MappingStore;
use crate::types::CatalogEntry;

/// Default cutoff: the first snapshot whose client archive ships `version.json`.
pub const DEFAULT_CUTOFF: &str = "18w47a";

/// Entries planned for one run, in catalog order.
pub type PendingSet = Vec<CatalogEntry>;

/// Computes the entries to resolve this run.
///
/// Entries already in the mapping are skipped, as are entries released
/// strictly before the cutoff entry (their archives predate `version.json`).
/// Entries carrying no timestamp at all cannot be placed before the cutoff
/// and are kept. Catalog order is preserved.
///
/// ## Errors
///
/// - [`PlanError::UnknownCutoff`] if no entry has the id `cutoff`
/// - [`PlanError::UndatedCutoff`] if the cutoff entry has no timestamp
pub fn plan(
    catalog: &[CatalogEntry],
    mapping: &MappingStore,
    cutoff: &str,
) -> Result<PendingSet, PlanError> {
    let reference = catalog
        .iter()
        .find(|entry| entry.id == cutoff)
        .ok_or_else(|| PlanError::UnknownCutoff(cutoff.to_string()))?;
    let reference_time = reference
        .released_at()
        .ok_or_else(|| PlanError::UndatedCutoff(cutoff.to_string()))?;

    debug!("Reference version: {} ({reference_time})", reference.id);

    let pending: PendingSet = catalog
        .iter()
        .filter(|entry| !mapping.has(&entry.id))
        .filter(|entry| match entry.released_at() {
            Some(released) if released < reference_time => {
                debug!(
                    "Skipping {} ({released}) as it doesn't have a version json inside.",
                    entry.id
                );
                false
            }
            _ => true,
        })
        .cloned()
        .collect();

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PackFormats;
    use chrono::{TimeZone, Utc};

    fn entry(id: &str, day: u32) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            url: format!("https://example.invalid/{id}.json"),
            release_time: Some(Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap()),
            time: None,
        }
    }

    fn ids(pending: &PendingSet) -> Vec<&str> {
        pending.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn cutoff_excludes_strictly_older_entries() {
        // Upstream lists newest first.
        let catalog = vec![entry("t3", 3), entry("t2", 2), entry("t1", 1)];
        let store = MappingStore::empty("unused.json");

        let pending = plan(&catalog, &store, "t2").unwrap();
        assert_eq!(ids(&pending), ["t3", "t2"]);
    }

    #[test]
    fn known_entries_are_skipped_regardless_of_time() {
        let catalog = vec![entry("t3", 3), entry("t2", 2), entry("t1", 1)];
        let store = MappingStore::empty("unused.json");
        store.put("t3", PackFormats::new(1u64, 1u64));
        store.put("t1", PackFormats::new(1u64, 1u64));

        let pending = plan(&catalog, &store, "t1").unwrap();
        assert_eq!(ids(&pending), ["t2"]);
    }

    #[test]
    fn unknown_cutoff_is_fatal() {
        let catalog = vec![entry("t1", 1)];
        let store = MappingStore::empty("unused.json");

        assert_eq!(
            plan(&catalog, &store, "nope"),
            Err(PlanError::UnknownCutoff("nope".to_string()))
        );
    }

    #[test]
    fn undated_cutoff_is_fatal() {
        let mut cutoff = entry("t1", 1);
        cutoff.release_time = None;
        let store = MappingStore::empty("unused.json");

        assert_eq!(
            plan(&[cutoff], &store, "t1"),
            Err(PlanError::UndatedCutoff("t1".to_string()))
        );
    }

    #[test]
    fn falls_back_to_time_field() {
        let mut old = entry("old", 1);
        old.time = old.release_time.take();
        let catalog = vec![entry("new", 5), old];
        let store = MappingStore::empty("unused.json");

        let pending = plan(&catalog, &store, "new").unwrap();
        assert_eq!(ids(&pending), ["new"]);
    }

    #[test]
    fn undated_entries_are_kept() {
        let mut undated = entry("undated", 1);
        undated.release_time = None;
        let catalog = vec![entry("t2", 2), undated];
        let store = MappingStore::empty("unused.json");

        let pending = plan(&catalog, &store, "t2").unwrap();
        assert_eq!(ids(&pending), ["t2", "undated"]);
    }
}
