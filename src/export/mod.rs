//! Output surfaces: the tabular dataset and the nested image-URL index.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::Result;
use crate::models::ProductRecord;

pub const CSV_HEADERS: [&str; 5] = ["Brand", "Product Name", "Color", "Dimensions", "Weight"];

/// Appends product rows to a CSV dataset. Never truncates prior run output:
/// a non-empty file at the target path pushes this run to `name(1).ext`,
/// `name(2).ext`, and so on.
pub struct CsvExporter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvExporter {
    pub fn create(dir: &Path, base_name: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = available_path(dir, base_name);

        let mut writer = csv::Writer::from_writer(File::create(&path)?);
        writer.write_record(CSV_HEADERS)?;
        writer.flush()?;

        info!(path = %path.display(), "created output dataset");
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The row is flushed before this returns, so an interrupted run loses at
    /// most the record in flight.
    pub fn append(&mut self, record: &ProductRecord) -> Result<()> {
        self.writer.write_record([
            record.brand.as_str(),
            record.product_name.as_str(),
            record.color.as_str(),
            record.dimensions.as_str(),
            record.weight.as_str(),
        ])?;
        self.writer.flush()?;
        Ok(())
    }
}

/// First path under `dir` that does not already hold a non-empty file:
/// `name.ext`, then `name(1).ext`, `name(2).ext`, …
fn available_path(dir: &Path, base_name: &str) -> PathBuf {
    let occupied = |p: &Path| p.metadata().map(|m| m.len() > 0).unwrap_or(false);

    let candidate = dir.join(base_name);
    if !occupied(&candidate) {
        return candidate;
    }

    let (stem, ext) = match base_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (base_name, ""),
    };

    let mut counter = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{stem}({counter})")
        } else {
            format!("{stem}({counter}).{ext}")
        };
        let candidate = dir.join(name);
        if !occupied(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Nested `brand -> product -> color -> [url]` index, deduplicated and
/// order-preserving. The whole file is rewritten after each update so an
/// interrupted run keeps everything recorded so far, and reloaded on open so
/// the index is append-only across runs.
pub struct ImageIndex {
    path: PathBuf,
    data: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>,
}

impl ImageIndex {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "image index failed to parse, starting fresh");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, data })
    }

    pub fn record(&mut self, brand: &str, product: &str, color: &str, urls: &[String]) -> Result<()> {
        let list = self
            .data
            .entry(brand.to_string())
            .or_default()
            .entry(product.to_string())
            .or_default()
            .entry(color.to_string())
            .or_default();

        for url in urls {
            if !list.contains(url) {
                list.push(url.clone());
            }
        }

        self.save()
    }

    pub fn urls(&self, brand: &str, product: &str, color: &str) -> Option<&[String]> {
        self.data
            .get(brand)?
            .get(product)?
            .get(color)
            .map(Vec::as_slice)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.data)?)?;
        Ok(())
    }
}
