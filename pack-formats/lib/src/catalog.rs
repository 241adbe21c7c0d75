//! The version catalog (launcher version manifest).

use reqwest::Client;
use tracing::info;

use crate::error::FetchError;
use crate::fetch::fetch_json;
use crate::types::{Catalog, CatalogEntry};

/// Default catalog location.
pub const MANIFEST_URL: &str = "https://launchermeta.mojang.com/mc/game/version_manifest.json";

/// Fetches the catalog once and returns its entries in catalog order.
///
/// ## Errors
///
/// Returns a [`FetchError`] if the manifest cannot be fetched or decoded.
pub async fn fetch_catalog(client: &Client, url: &str) -> Result<Vec<CatalogEntry>, FetchError> {
    let catalog: Catalog = fetch_json(client, url).await?;
    info!("Catalog lists {} versions", catalog.versions.len());
    Ok(catalog.versions)
}
