//! Region lookup.
//!
//! The catalog belongs to the dataset, not the engine: it maps region ids to
//! their metadata and the file holding each region's year. [`StaticCatalog`]
//! reads the `id,name,longitude,latitude,file` table shipped alongside a
//! dataset; other sources can implement [`RegionCatalog`].

use crate::error::LoadError;
use crate::loader::LineCounter;
use crate::models::Region;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A region together with the file holding its series.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub region: Region,
    pub file: PathBuf,
}

pub trait RegionCatalog: Send + Sync {
    fn get(&self, id: &str) -> Option<&CatalogEntry>;

    fn entries(&self) -> Vec<&CatalogEntry>;

    /// Region whose file has the same name as `path`
    fn region_for_file(&self, path: &Path) -> Option<&Region> {
        let name = path.file_name()?;
        self.entries()
            .into_iter()
            .find(|entry| entry.file.file_name() == Some(name))
            .map(|entry| &entry.region)
    }
}

/// In-memory catalog keyed by region id.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl StaticCatalog {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.region.id.clone(), entry))
                .collect(),
        }
    }

    /// Read a catalog table; relative file paths resolve against its directory.
    pub fn from_csv_file(path: &Path) -> Result<Self, LoadError> {
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let catalog = Self::parse(&content, base).map_err(|reason| LoadError::Catalog {
            path: path.to_path_buf(),
            reason,
        })?;
        debug!("Loaded {} catalog entries from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Parse catalog rows. A first row whose first field is `id` is a header.
    pub fn parse(content: &str, base: &Path) -> Result<Self, String> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let mut entries = BTreeMap::new();
        let mut record = StringRecord::new();
        let mut lines = LineCounter::new(content);
        let mut first = true;

        while reader
            .read_record(&mut record)
            .map_err(|e| format!("invalid CSV: {e}"))?
        {
            let number = lines.line_before(reader.position().byte() as usize);
            let is_header = first && record.get(0).is_some_and(|field| field.eq_ignore_ascii_case("id"));
            first = false;
            if is_header || record.iter().all(str::is_empty) {
                continue;
            }

            let fields: Vec<&str> = record.iter().collect();
            let [id, name, longitude, latitude, file] = fields[..] else {
                return Err(format!(
                    "line {number}: expected 5 fields, found {}",
                    fields.len()
                ));
            };
            let parse_coordinate = |field: &str, what: &str| {
                field
                    .parse::<f64>()
                    .map_err(|_| format!("line {number}: invalid {what} '{field}'"))
            };
            let longitude = parse_coordinate(longitude, "longitude")?;
            let latitude = parse_coordinate(latitude, "latitude")?;
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(format!("line {number}: latitude {latitude} out of range"));
            }

            let entry = CatalogEntry {
                region: Region::new(id, name, longitude, latitude),
                file: base.join(file),
            };
            if entries.insert(id.to_string(), entry).is_some() {
                return Err(format!("line {number}: duplicate region id '{id}'"));
            }
        }

        Ok(Self { entries })
    }

    /// File for a region id
    pub fn resolve(&self, id: &str) -> Option<&Path> {
        self.entries.get(id).map(|entry| entry.file.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RegionCatalog for StaticCatalog {
    fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    fn entries(&self) -> Vec<&CatalogEntry> {
        self.entries.values().collect()
    }
}
