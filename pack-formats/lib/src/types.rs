//! Core data types for the pack format pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Key to pack formats table, in the order keys were first recorded.
pub type Mapping = IndexMap<String, PackFormats>;

/// A single pack format identifier.
///
/// Older archives carry flat integers. Newer ones carry a major/minor pair
/// which is collapsed into a decimal number (`major.minor`) so that each
/// identifier stays a single comparable value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackNumber {
    /// A whole pack format, e.g. `48`.
    Integer(u64),
    /// A normalized major/minor pack format, e.g. `69.1`.
    Decimal(f64),
}

impl From<u64> for PackNumber {
    fn from(value: u64) -> Self {
        PackNumber::Integer(value)
    }
}

impl fmt::Display for PackNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackNumber::Integer(n) => write!(f, "{n}"),
            PackNumber::Decimal(n) => write!(f, "{n}"),
        }
    }
}

/// The datapack and resourcepack identifiers of one released version.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackFormats {
    pub datapack: PackNumber,
    pub resourcepack: PackNumber,
}

impl PackFormats {
    /// Creates a pair from anything convertible into a [`PackNumber`].
    ///
    /// ## Examples
    ///
    /// ```
    /// use pack_formats_lib::{PackFormats, PackNumber};
    ///
    /// let formats = PackFormats::new(5u64, 6u64);
    /// assert_eq!(formats.datapack, PackNumber::Integer(5));
    /// assert_eq!(formats.resourcepack, PackNumber::Integer(6));
    /// ```
    pub fn new(datapack: impl Into<PackNumber>, resourcepack: impl Into<PackNumber>) -> Self {
        Self {
            datapack: datapack.into(),
            resourcepack: resourcepack.into(),
        }
    }
}

/// One released version as listed in the version catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Unique version id, e.g. `1.21.4` or `24w44a`.
    pub id: String,
    /// Locator of the per-version descriptor document.
    pub url: String,
    #[serde(rename = "releaseTime", default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// Release timestamp, falling back to the generic `time` field.
    #[must_use]
    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.release_time.or(self.time)
    }
}

/// The catalog document: every known version, newest first upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub versions: Vec<CatalogEntry>,
}

/// Per-version descriptor. Only the client archive locator is read.
#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor {
    pub downloads: Downloads,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Downloads {
    pub client: Download,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Download {
    pub url: String,
}
