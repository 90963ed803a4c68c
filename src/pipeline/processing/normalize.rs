use crate::constants::*;
use crate::error::{Result, TrendsError};
use crate::types::{format_number, parse_number, RawTable, RowView, TableRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument};

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// One distinct sold property with standardized columns.
/// `price` and `square_feet` stay optional here; rows missing them are dropped on derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub sold_date: String,
    pub property_type: String,
    pub price: Option<f64>,
    pub square_feet: Option<f64>,
    pub beds: Option<f64>,
    pub baths: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub hoa_month: Option<f64>,
    pub url: String,
    pub mls_number: String,
    pub url_id: Option<u64>,
    pub mls_id: Option<u64>,
    /// Listing attributes passed through unchanged, keyed by standardized column name
    pub extra: BTreeMap<String, Option<String>>,
}

/// Row counts for each normalization filter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub duplicates_removed: usize,
    pub missing_sold_date: usize,
    pub excluded_property_type: usize,
    pub output_rows: usize,
}

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub excluded_property_type: String,
    pub placeholder: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            excluded_property_type: EXCLUDED_PROPERTY_TYPE.to_string(),
            placeholder: UNKNOWN_PLACEHOLDER.to_string(),
        }
    }
}

/// Turns the raw union of fetched bins into one row per distinct sold property
#[derive(Debug, Clone, Default)]
pub struct RecordNormalizer {
    pub config: NormalizerConfig,
}

impl RecordNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, raw), fields(rows = raw.len()))]
    pub fn normalize(&self, raw: &RawTable) -> Result<(Vec<NormalizedRecord>, NormalizeReport)> {
        let mut report = NormalizeReport {
            input_rows: raw.len(),
            ..NormalizeReport::default()
        };
        if raw.headers.is_empty() {
            return Ok((Vec::new(), report));
        }

        // Exact duplicates come from overlapping bins; first occurrence wins
        let mut seen = HashSet::new();
        let rows: Vec<&Vec<Option<String>>> = raw.rows.iter().filter(|r| seen.insert(*r)).collect();
        report.duplicates_removed = raw.len() - rows.len();

        let headers = standardize_headers(&raw.headers);
        let missing = missing_required(&headers);
        if !missing.is_empty() {
            return Err(TrendsError::SchemaMismatch {
                stage: "normalize".to_string(),
                missing,
            });
        }

        let mut table = RawTable::new(headers);
        for row in rows {
            table.push_row(row.clone());
        }

        let sold_idx = table.column_index(COL_SOLD_DATE).unwrap_or_default();
        let before = table.len();
        table.rows.retain(|r| r[sold_idx].is_some());
        report.missing_sold_date = before - table.len();

        let mut table = upper_case(drop_columns(table));

        let type_idx = table.column_index(COL_PROPERTY_TYPE).unwrap_or_default();
        let before = table.len();
        let excluded = self.config.excluded_property_type.to_uppercase();
        table
            .rows
            .retain(|r| r[type_idx].as_deref() != Some(excluded.as_str()));
        report.excluded_property_type = before - table.len();

        let text_extras = text_columns(&table);
        let records: Vec<NormalizedRecord> = table
            .row_views()
            .map(|row| self.to_record(&row, &text_extras))
            .collect();

        report.output_rows = records.len();
        debug!(?report, "Normalization filters applied");
        info!(
            "Normalized {} of {} raw rows ({} duplicates, {} unsold, {} excluded)",
            report.output_rows,
            report.input_rows,
            report.duplicates_removed,
            report.missing_sold_date,
            report.excluded_property_type
        );
        Ok((records, report))
    }

    fn to_record(&self, row: &RowView<'_>, text_extras: &HashSet<String>) -> NormalizedRecord {
        let url = row.get(COL_URL);
        let mls_number = row.get(COL_MLS_NUMBER);
        let number = |col: &str| row.get(col).and_then(parse_number);

        let extra = row
            .headers()
            .iter()
            .filter(|h| !is_core_column(h))
            .map(|h| {
                let value = match row.get(h) {
                    Some(v) => Some(v.to_string()),
                    None if text_extras.contains(h) => Some(self.config.placeholder.clone()),
                    None => None,
                };
                (h.clone(), value)
            })
            .collect();

        NormalizedRecord {
            sold_date: row.get(COL_SOLD_DATE).unwrap_or_default().to_string(),
            property_type: self.text_or_placeholder(row.get(COL_PROPERTY_TYPE)),
            price: number(COL_PRICE),
            square_feet: number(COL_SQUARE_FEET),
            beds: number(COL_BEDS),
            baths: number(COL_BATHS),
            latitude: number(COL_LATITUDE),
            longitude: number(COL_LONGITUDE),
            hoa_month: number(COL_HOA_MONTH),
            url_id: url.and_then(extract_url_id),
            mls_id: mls_number.and_then(extract_mls_id),
            url: self.text_or_placeholder(url),
            mls_number: self.text_or_placeholder(mls_number),
            extra,
        }
    }

    fn text_or_placeholder(&self, value: Option<&str>) -> String {
        value.unwrap_or(&self.config.placeholder).to_string()
    }
}

/// Snake-case a source header: `MLS#` → `mls_number`, `HOA/MONTH` → `hoa_month`,
/// `$/SQUARE FEET` → `dollar_square_feet`, `URL (SEE ...)` → `url`
pub fn standardize_column_name(name: &str) -> String {
    let trimmed = name.trim();
    let upper = trimmed.to_ascii_uppercase();
    if upper == "URL" || upper.starts_with("URL (") {
        return COL_URL.to_string();
    }
    let lowered = trimmed
        .to_lowercase()
        .replace('#', "_number")
        .replace('$', "dollar_")
        .replace('/', "_");
    NON_ALNUM
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Required columns absent from a source header row, by standardized name
pub fn missing_required_columns(headers: &[String]) -> Vec<String> {
    missing_required(&standardize_headers(headers))
}

fn missing_required(standardized: &[String]) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|c| !standardized.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect()
}

fn standardize_headers(headers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(headers.len());
    for h in headers {
        let base = standardize_column_name(h);
        let mut name = base.clone();
        let mut k = 2;
        while out.contains(&name) {
            name = format!("{base}_{k}");
            k += 1;
        }
        out.push(name);
    }
    out
}

/// Drop source bookkeeping, plus id columns that are always recomputed
fn drop_columns(table: RawTable) -> RawTable {
    let keep: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            !DROPPED_COLUMNS.contains(&h.as_str()) && h.as_str() != COL_URL_ID && h.as_str() != COL_MLS_ID
        })
        .map(|(i, _)| i)
        .collect();
    RawTable {
        headers: keep.iter().map(|&i| table.headers[i].clone()).collect(),
        rows: table
            .rows
            .into_iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect(),
    }
}

fn upper_case(mut table: RawTable) -> RawTable {
    for cell in table.rows.iter_mut().flatten().flatten() {
        *cell = cell.to_uppercase();
    }
    table
}

/// Pass-through columns holding text: any present value that is not a number
fn text_columns(table: &RawTable) -> HashSet<String> {
    table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !is_core_column(h))
        .filter(|(i, _)| {
            table
                .rows
                .iter()
                .filter_map(|r| r[*i].as_deref())
                .any(|v| parse_number(v).is_none())
        })
        .map(|(_, h)| h.clone())
        .collect()
}

fn is_core_column(name: &str) -> bool {
    REQUIRED_COLUMNS.contains(&name) || name == COL_URL_ID || name == COL_MLS_ID
}

/// Digits of the final path segment: `.../home/12345` → 12345
pub fn extract_url_id(url: &str) -> Option<u64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

/// MLS number without its alphabetic prefix: `NWM1234567` → 1234567
pub fn extract_mls_id(mls: &str) -> Option<u64> {
    mls.trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .ok()
}

const NORMALIZED_COLUMNS: [&str; 13] = [
    COL_SOLD_DATE,
    COL_PROPERTY_TYPE,
    COL_PRICE,
    COL_SQUARE_FEET,
    COL_BEDS,
    COL_BATHS,
    COL_LATITUDE,
    COL_LONGITUDE,
    COL_HOA_MONTH,
    COL_URL,
    COL_MLS_NUMBER,
    COL_URL_ID,
    COL_MLS_ID,
];

/// Union of pass-through column names across `extras`, in name order
pub(crate) fn extra_columns<'a>(
    extras: impl Iterator<Item = &'a BTreeMap<String, Option<String>>>,
) -> Vec<String> {
    let mut names: Vec<String> = extras.flat_map(|e| e.keys().cloned()).collect();
    names.sort();
    names.dedup();
    names
}

/// Pass-through cells of a loaded row: every column not in `known`
pub(crate) fn extras_from_row(row: &RowView<'_>, known: &[&str]) -> BTreeMap<String, Option<String>> {
    row.headers()
        .iter()
        .filter(|h| !known.contains(&h.as_str()))
        .map(|h| (h.clone(), row.get(h).map(str::to_string)))
        .collect()
}

impl TableRecord for NormalizedRecord {
    fn columns(records: &[Self]) -> Vec<String> {
        NORMALIZED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(extra_columns(records.iter().map(|r| &r.extra)))
            .collect()
    }

    fn cell(&self, column: &str) -> Option<String> {
        match column {
            COL_SOLD_DATE => Some(self.sold_date.clone()),
            COL_PROPERTY_TYPE => Some(self.property_type.clone()),
            COL_PRICE => self.price.map(format_number),
            COL_SQUARE_FEET => self.square_feet.map(format_number),
            COL_BEDS => self.beds.map(format_number),
            COL_BATHS => self.baths.map(format_number),
            COL_LATITUDE => self.latitude.map(format_number),
            COL_LONGITUDE => self.longitude.map(format_number),
            COL_HOA_MONTH => self.hoa_month.map(format_number),
            COL_URL => Some(self.url.clone()),
            COL_MLS_NUMBER => Some(self.mls_number.clone()),
            COL_URL_ID => self.url_id.map(|v| v.to_string()),
            COL_MLS_ID => self.mls_id.map(|v| v.to_string()),
            other => self.extra.get(other).cloned().flatten(),
        }
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            sold_date: row.require(COL_SOLD_DATE)?.to_string(),
            property_type: row.require(COL_PROPERTY_TYPE)?.to_string(),
            price: row.parse(COL_PRICE)?,
            square_feet: row.parse(COL_SQUARE_FEET)?,
            beds: row.parse(COL_BEDS)?,
            baths: row.parse(COL_BATHS)?,
            latitude: row.parse(COL_LATITUDE)?,
            longitude: row.parse(COL_LONGITUDE)?,
            hoa_month: row.parse(COL_HOA_MONTH)?,
            url: row.require(COL_URL)?.to_string(),
            mls_number: row.require(COL_MLS_NUMBER)?.to_string(),
            url_id: row.parse(COL_URL_ID)?,
            mls_id: row.parse(COL_MLS_ID)?,
            extra: extras_from_row(row, &NORMALIZED_COLUMNS),
        })
    }
}
