use crate::constants::*;
use crate::error::Result;
use crate::pipeline::processing::normalize::{extra_columns, extras_from_row, NormalizedRecord};
use crate::types::{format_number, Category, RowView, TableRecord};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Sold-date layouts seen in source payloads and our own exports
const SOLD_DATE_FORMATS: [&str; 4] = ["%B-%d-%Y", "%b-%d-%Y", "%Y-%m-%d", "%m/%d/%Y"];

/// A normalized sale with PPSF, date parts, categorical bed/bath keys and
/// per-dataset rescaled coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRecord {
    pub sold_date: NaiveDate,
    pub sold_year: i32,
    pub sold_month: u32,
    pub sold_quarter: u32,
    pub sold_day: u32,
    pub property_type: String,
    pub price: f64,
    pub square_feet: f64,
    pub ppsf: f64,
    pub beds: Category,
    pub baths: Category,
    pub beds_baths: Category,
    /// Rescaled to [0, 100] across the dataset
    pub latitude: Option<f64>,
    /// Rescaled to [0, 100] across the dataset
    pub longitude: Option<f64>,
    pub hoa_month: f64,
    pub hoa_month_bool: u8,
    pub url: String,
    pub mls_number: String,
    pub url_id: Option<u64>,
    pub mls_id: Option<u64>,
    pub extra: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeriveReport {
    pub input_rows: usize,
    pub unparseable_sold_date: usize,
    pub missing_price_or_area: usize,
    pub non_positive_price_or_area: usize,
    pub output_rows: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureDeriver;

impl FeatureDeriver {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, records), fields(rows = records.len()))]
    pub fn derive(&self, records: &[NormalizedRecord]) -> (Vec<DerivedRecord>, DeriveReport) {
        let mut report = DeriveReport {
            input_rows: records.len(),
            ..DeriveReport::default()
        };

        let mut derived: Vec<DerivedRecord> = Vec::with_capacity(records.len());
        for record in records {
            let Some(sold_date) = parse_sold_date(&record.sold_date) else {
                debug!("Dropping row with unparseable sold date '{}'", record.sold_date);
                report.unparseable_sold_date += 1;
                continue;
            };
            let (Some(price), Some(square_feet)) = (record.price, record.square_feet) else {
                debug!(
                    price = ?record.price,
                    square_feet = ?record.square_feet,
                    "Dropping row with missing price or area"
                );
                report.missing_price_or_area += 1;
                continue;
            };
            if price <= 0.0 || square_feet <= 0.0 {
                debug!(price, square_feet, "Dropping row with non-positive price or area");
                report.non_positive_price_or_area += 1;
                continue;
            }

            // Presence flag must be read before the fee is defaulted
            let hoa_month_bool = u8::from(record.hoa_month.is_some());
            let beds = Category::from_count(record.beds);
            let baths = Category::from_count(record.baths);
            let beds_baths = Category::composite(&beds, &baths);

            derived.push(DerivedRecord {
                sold_date,
                sold_year: sold_date.year(),
                sold_month: sold_date.month(),
                sold_quarter: quarter(sold_date.month()),
                sold_day: sold_date.day(),
                property_type: record.property_type.clone(),
                price,
                square_feet,
                ppsf: price / square_feet,
                beds,
                baths,
                beds_baths,
                latitude: record.latitude,
                longitude: record.longitude,
                hoa_month: record.hoa_month.unwrap_or(0.0),
                hoa_month_bool,
                url: record.url.clone(),
                mls_number: record.mls_number.clone(),
                url_id: record.url_id,
                mls_id: record.mls_id,
                extra: record.extra.clone(),
            });
        }

        let latitudes = rescale_0_100(&derived.iter().map(|r| r.latitude).collect::<Vec<_>>());
        let longitudes = rescale_0_100(&derived.iter().map(|r| r.longitude).collect::<Vec<_>>());
        for ((record, lat), lon) in derived.iter_mut().zip(latitudes).zip(longitudes) {
            record.latitude = lat;
            record.longitude = lon;
        }

        report.output_rows = derived.len();
        info!(
            "Derived {} of {} rows ({} bad dates, {} missing price/area, {} non-positive)",
            report.output_rows,
            report.input_rows,
            report.unparseable_sold_date,
            report.missing_price_or_area,
            report.non_positive_price_or_area
        );
        (derived, report)
    }
}

pub fn parse_sold_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    SOLD_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Calendar quarter, `ceil(month / 3)`
pub fn quarter(month: u32) -> u32 {
    (month + 2) / 3
}

/// Min-subtract then max-normalize to [0, 100]. Missing values stay missing and are
/// ignored for the bounds. When every present value is equal the result is 0.
pub fn rescale_0_100(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let present = values.iter().flatten().copied();
    let min = present.clone().fold(f64::INFINITY, f64::min);
    let max = present.fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    values
        .iter()
        .map(|v| {
            v.map(|x| {
                if range > 0.0 {
                    (x - min) / range * 100.0
                } else {
                    0.0
                }
            })
        })
        .collect()
}

const DERIVED_COLUMNS: [&str; 20] = [
    COL_SOLD_DATE,
    COL_SOLD_YEAR,
    COL_SOLD_MONTH,
    COL_SOLD_QUARTER,
    COL_SOLD_DAY,
    COL_PROPERTY_TYPE,
    COL_PRICE,
    COL_SQUARE_FEET,
    COL_PPSF,
    COL_BEDS,
    COL_BATHS,
    COL_BEDS_BATHS,
    COL_LATITUDE,
    COL_LONGITUDE,
    COL_HOA_MONTH,
    COL_HOA_MONTH_BOOL,
    COL_URL,
    COL_MLS_NUMBER,
    COL_URL_ID,
    COL_MLS_ID,
];

impl TableRecord for DerivedRecord {
    fn columns(records: &[Self]) -> Vec<String> {
        DERIVED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(extra_columns(records.iter().map(|r| &r.extra)))
            .collect()
    }

    fn cell(&self, column: &str) -> Option<String> {
        match column {
            COL_SOLD_DATE => Some(self.sold_date.format("%Y-%m-%d").to_string()),
            COL_SOLD_YEAR => Some(self.sold_year.to_string()),
            COL_SOLD_MONTH => Some(self.sold_month.to_string()),
            COL_SOLD_QUARTER => Some(self.sold_quarter.to_string()),
            COL_SOLD_DAY => Some(self.sold_day.to_string()),
            COL_PROPERTY_TYPE => Some(self.property_type.clone()),
            COL_PRICE => Some(format_number(self.price)),
            COL_SQUARE_FEET => Some(format_number(self.square_feet)),
            COL_PPSF => Some(format_number(self.ppsf)),
            COL_BEDS => Some(self.beds.to_string()),
            COL_BATHS => Some(self.baths.to_string()),
            COL_BEDS_BATHS => Some(self.beds_baths.to_string()),
            COL_LATITUDE => self.latitude.map(format_number),
            COL_LONGITUDE => self.longitude.map(format_number),
            COL_HOA_MONTH => Some(format_number(self.hoa_month)),
            COL_HOA_MONTH_BOOL => Some(self.hoa_month_bool.to_string()),
            COL_URL => Some(self.url.clone()),
            COL_MLS_NUMBER => Some(self.mls_number.clone()),
            COL_URL_ID => self.url_id.map(|v| v.to_string()),
            COL_MLS_ID => self.mls_id.map(|v| v.to_string()),
            other => self.extra.get(other).cloned().flatten(),
        }
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            sold_date: row.parse_required(COL_SOLD_DATE)?,
            sold_year: row.parse_required(COL_SOLD_YEAR)?,
            sold_month: row.parse_required(COL_SOLD_MONTH)?,
            sold_quarter: row.parse_required(COL_SOLD_QUARTER)?,
            sold_day: row.parse_required(COL_SOLD_DAY)?,
            property_type: row.require(COL_PROPERTY_TYPE)?.to_string(),
            price: row.parse_required(COL_PRICE)?,
            square_feet: row.parse_required(COL_SQUARE_FEET)?,
            ppsf: row.parse_required(COL_PPSF)?,
            beds: Category::new(row.require(COL_BEDS)?),
            baths: Category::new(row.require(COL_BATHS)?),
            beds_baths: Category::new(row.require(COL_BEDS_BATHS)?),
            latitude: row.parse(COL_LATITUDE)?,
            longitude: row.parse(COL_LONGITUDE)?,
            hoa_month: row.parse_required(COL_HOA_MONTH)?,
            hoa_month_bool: row.parse_required(COL_HOA_MONTH_BOOL)?,
            url: row.require(COL_URL)?.to_string(),
            mls_number: row.require(COL_MLS_NUMBER)?.to_string(),
            url_id: row.parse(COL_URL_ID)?,
            mls_id: row.parse(COL_MLS_ID)?,
            extra: extras_from_row(row, &DERIVED_COLUMNS),
        })
    }
}
