//! Writing reports, JSON dumps and charts to disk.
//!
//! Exports take a snapshot of records and never touch a document: they go
//! through the same atomic replace as data files, so a failed export leaves
//! any earlier file at the target intact.

use std::path::{Path, PathBuf};

use crate::chart::{self, ChartConfig};
use crate::error::{Result, StoreError};
use crate::models::Manufacturer;
use crate::report;
use crate::store;

/// Pretty-printed JSON array of `records`.
pub fn to_json(records: &[Manufacturer]) -> Result<String> {
    serde_json::to_string_pretty(records).map_err(StoreError::Serialization)
}

pub fn export_json(records: &[Manufacturer], path: &Path) -> Result<()> {
    let json = to_json(records)?;
    store::write_atomic(path, json.as_bytes())?;
    tracing::info!(path = %path.display(), count = records.len(), "exported JSON");
    Ok(())
}

pub fn export_pdf(records: &[Manufacturer], title: &str, path: &Path) -> Result<()> {
    let pdf = report::render_pdf(records, title);
    store::write_atomic(path, &pdf)?;
    tracing::info!(path = %path.display(), count = records.len(), "exported PDF report");
    Ok(())
}

pub fn export_chart(records: &[Manufacturer], config: &ChartConfig, path: &Path) -> Result<()> {
    let png = chart::generate(records, config)?;
    store::write_atomic(path, &png)?;
    tracing::info!(path = %path.display(), chart = %config.chart_type, "exported chart");
    Ok(())
}

/// Hand a written export to the platform viewer.
pub fn open_in_viewer(path: &Path) -> Result<()> {
    open::that(path).map_err(|source| StoreError::io("open viewer for", path, source))
}

/// Suggested target for an export: next to the data file with the given
/// extension, or `manufacturers.<ext>` for unsaved documents.
pub fn default_path(document: Option<&Path>, extension: &str) -> PathBuf {
    match document {
        Some(path) => path.with_extension(extension),
        None => PathBuf::from(format!("manufacturers.{extension}")),
    }
}
