use crate::constants::*;
use crate::error::Result;
use crate::pipeline::processing::aggregate::{YearBedsBathsSummary, YearBedsSummary};
use crate::pipeline::processing::derive::DerivedRecord;
use crate::pipeline::processing::normalize::NormalizedRecord;
use crate::pipeline::PipelineOutput;
use crate::types::{RawTable, TableRecord};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write `table` as a comma-delimited file with a header row. Missing cells are empty.
pub fn write_table(path: &Path, table: &RawTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    if !table.headers.is_empty() {
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
        }
    }
    writer.flush()?;
    debug!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Read a delimited file written by [`write_table`] (or any headered CSV)
pub fn read_table(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut table = RawTable::new(headers);
    for record in reader.records() {
        let record = record?;
        table.push_row(
            record
                .iter()
                .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
                .collect(),
        );
    }
    Ok(table)
}

pub fn export_records<T: TableRecord>(path: &Path, records: &[T]) -> Result<PathBuf> {
    write_table(path, &RawTable::from_records(records))?;
    Ok(path.to_path_buf())
}

pub fn load_records<T: TableRecord>(path: &Path) -> Result<Vec<T>> {
    read_table(path)?.to_records()
}

pub fn save_raw(dir: &Path, raw: &RawTable) -> Result<PathBuf> {
    let path = dir.join(RAW_FILE);
    write_table(&path, raw)?;
    Ok(path)
}

/// Write the normalized, derived and both summary tables into `dir`
pub fn save_analysis(dir: &Path, output: &PipelineOutput) -> Result<Vec<PathBuf>> {
    Ok(vec![
        export_records(&dir.join(NORMALIZED_FILE), &output.normalized)?,
        export_records(&dir.join(DERIVED_FILE), &output.derived)?,
        export_records(&dir.join(SUMMARY_YEAR_BEDS_FILE), &output.year_beds)?,
        export_records(&dir.join(SUMMARY_YEAR_BEDS_BATHS_FILE), &output.year_beds_baths)?,
    ])
}

pub fn load_raw(dir: &Path) -> Result<RawTable> {
    read_table(&dir.join(RAW_FILE))
}

pub fn load_normalized(dir: &Path) -> Result<Vec<NormalizedRecord>> {
    load_records(&dir.join(NORMALIZED_FILE))
}

pub fn load_derived(dir: &Path) -> Result<Vec<DerivedRecord>> {
    load_records(&dir.join(DERIVED_FILE))
}

pub fn load_summaries(dir: &Path) -> Result<(Vec<YearBedsSummary>, Vec<YearBedsBathsSummary>)> {
    Ok((
        load_records(&dir.join(SUMMARY_YEAR_BEDS_FILE))?,
        load_records(&dir.join(SUMMARY_YEAR_BEDS_BATHS_FILE))?,
    ))
}
