//! Resolution of one catalog entry into its pack formats.
//!
//! Each entry is resolved in three steps: fetch the descriptor, fetch the
//! client archive it points to, then read `version.json` out of the archive
//! and decode its `pack_version` field.

use std::future::Future;
use std::io::{Cursor, Read};
use std::pin::Pin;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::ResolveError;
use crate::fetch::{fetch_bytes, fetch_json};
use crate::types::{CatalogEntry, Descriptor, PackFormats, PackNumber};

/// Name of the metadata entry inside the client archive.
pub const METADATA_ENTRY: &str = "version.json";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Anything that can turn a catalog entry into pack formats.
///
/// The scheduler is generic over this so tests can drive it without a
/// network.
pub trait ArtifactResolver: Send + Sync {
    /// Resolves the pack formats of `entry`.
    ///
    /// Failures are returned, never panicked, so that one entry cannot take
    /// down its siblings.
    fn resolve<'a>(
        &'a self,
        entry: &'a CatalogEntry,
    ) -> BoxFuture<'a, Result<PackFormats, ResolveError>>;
}

/// The `pack_version` field of `version.json`.
///
/// The upstream schema moved from a flat number, to separate data and
/// resource numbers, to major/minor pairs for each. Any other shape is a
/// decode error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PackVersion {
    /// `"pack_version": 5`
    Flat(PackNumber),
    /// `"pack_version": { "data": 10, "resource": 9 }`
    Split {
        data: PackNumber,
        resource: PackNumber,
    },
    /// `"pack_version": { "data_major": 88, "data_minor": 0, ... }`
    MajorMinor {
        data_major: u64,
        data_minor: u64,
        resource_major: u64,
        resource_minor: u64,
    },
}

impl PackVersion {
    /// Collapses the shape into a datapack/resourcepack pair.
    ///
    /// ## Errors
    ///
    /// Returns [`ResolveError::InvalidNumber`] if a major/minor pair does not
    /// form a finite decimal.
    ///
    /// ## Examples
    ///
    /// ```
    /// use pack_formats_lib::{PackFormats, PackNumber, PackVersion};
    ///
    /// let version = PackVersion::MajorMinor {
    ///     data_major: 5,
    ///     data_minor: 2,
    ///     resource_major: 6,
    ///     resource_minor: 0,
    /// };
    /// let formats = version.into_formats().unwrap();
    /// assert_eq!(formats.datapack, PackNumber::Decimal(5.2));
    /// assert_eq!(formats.resourcepack, PackNumber::Integer(6));
    /// ```
    pub fn into_formats(self) -> Result<PackFormats, ResolveError> {
        match self {
            PackVersion::Flat(n) => Ok(PackFormats {
                datapack: n,
                resourcepack: n,
            }),
            PackVersion::Split { data, resource } => Ok(PackFormats {
                datapack: data,
                resourcepack: resource,
            }),
            PackVersion::MajorMinor {
                data_major,
                data_minor,
                resource_major,
                resource_minor,
            } => Ok(PackFormats {
                datapack: normalize(data_major, data_minor)?,
                resourcepack: normalize(resource_major, resource_minor)?,
            }),
        }
    }
}

/// `major` alone when `minor` is zero, otherwise the decimal `major.minor`.
fn normalize(major: u64, minor: u64) -> Result<PackNumber, ResolveError> {
    if minor == 0 {
        return Ok(PackNumber::Integer(major));
    }
    let text = format!("{major}.{minor}");
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(PackNumber::Decimal(value)),
        _ => Err(ResolveError::InvalidNumber(text)),
    }
}

#[derive(Debug, Deserialize)]
struct VersionMetadata {
    pack_version: PackVersion,
}

/// Reads the pack formats out of a client archive held in memory.
///
/// ## Errors
///
/// - [`ResolveError::Archive`] if the bytes are not a zip archive
/// - [`ResolveError::MissingMetadata`] if `version.json` is absent
/// - [`ResolveError::Schema`] if `pack_version` has an unknown shape
pub fn extract_pack_formats(archive: &[u8]) -> Result<PackFormats, ResolveError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut entry = match zip.by_name(METADATA_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(ResolveError::MissingMetadata),
        Err(e) => return Err(e.into()),
    };

    let mut raw = String::new();
    entry.read_to_string(&mut raw)?;
    debug!("{METADATA_ENTRY}: {raw}");

    let metadata: VersionMetadata = serde_json::from_str(&raw)?;
    metadata.pack_version.into_formats()
}

/// Resolves entries against the live descriptor and archive URLs.
#[derive(Debug, Clone)]
pub struct HttpResolver {
    client: Client,
}

impl HttpResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn resolve_entry(&self, entry: &CatalogEntry) -> Result<PackFormats, ResolveError> {
        let descriptor: Descriptor = fetch_json(&self.client, &entry.url).await?;
        let archive = fetch_bytes(&self.client, &descriptor.downloads.client.url).await?;
        debug!("{}: fetched {} byte archive", entry.id, archive.len());

        // The archive is dropped as soon as the metadata has been read.
        extract_pack_formats(&archive)
    }
}

impl ArtifactResolver for HttpResolver {
    fn resolve<'a>(
        &'a self,
        entry: &'a CatalogEntry,
    ) -> BoxFuture<'a, Result<PackFormats, ResolveError>> {
        Box::pin(self.resolve_entry(entry))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    /// Builds an in-memory zip with the given `(name, content)` entries.
    pub fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn client_jar(pack_version: &str) -> Vec<u8> {
        let metadata = format!(r#"{{"id":"test","pack_version":{pack_version}}}"#);
        zip_with(&[
            ("net/minecraft/client/Main.class", "\u{00ca}\u{00fe}"),
            ("version.json", &metadata),
        ])
    }
}
