//! CSV exports of report subsets and aggregate tables.

use std::path::Path;

use super::ExportResult;
use crate::models::{ReportSubset, Table};

/// Every column of the subset, source columns first, without an index
/// column. Dates are written as `%Y-%m-%d %H:%M:%S` and lists as JSON so
/// the file loads back unchanged.
pub fn records_to_csv(subset: &ReportSubset<'_>) -> ExportResult<Vec<u8>> {
    let columns = subset.all_columns();
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in subset.iter() {
        writer.write_record(columns.iter().map(|c| row.get(c).to_string()))?;
    }
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// A table with its index as the first, unnamed column.
pub fn table_to_csv(table: &Table) -> ExportResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(std::iter::once("").chain(table.columns.iter().map(String::as_str)))?;
    for (index, row) in table.index.iter().zip(&table.data) {
        writer.write_record(
            std::iter::once(index.clone()).chain(row.iter().map(ToString::to_string)),
        )?;
    }
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// Write an export to disk, creating parent directories as needed.
pub fn write_export<P: AsRef<Path>>(path: P, bytes: &[u8]) -> ExportResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}
