//! Column names and fixed values shared by the fetch, normalize and export stages.
//! Names are the standardized (snake_case) forms produced by the normalizer.

// Source identity
pub const REDFIN_SOURCE: &str = "redfin";
pub const REDFIN_GIS_CSV_URL: &str = "https://www.redfin.com/stingray/api/gis-csv";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// First cell of the disclaimer row the source prepends to some payloads
pub const MLS_DISCLAIMER_PREFIX: &str = "In accordance with local MLS rules";

// Core columns
pub const COL_SOLD_DATE: &str = "sold_date";
pub const COL_PROPERTY_TYPE: &str = "property_type";
pub const COL_PRICE: &str = "price";
pub const COL_BEDS: &str = "beds";
pub const COL_BATHS: &str = "baths";
pub const COL_SQUARE_FEET: &str = "square_feet";
pub const COL_LATITUDE: &str = "latitude";
pub const COL_LONGITUDE: &str = "longitude";
pub const COL_HOA_MONTH: &str = "hoa_month";
pub const COL_URL: &str = "url";
pub const COL_MLS_NUMBER: &str = "mls_number";
pub const COL_URL_ID: &str = "url_id";
pub const COL_MLS_ID: &str = "mls_id";

// Derived columns
pub const COL_PPSF: &str = "ppsf";
pub const COL_SOLD_YEAR: &str = "sold_year";
pub const COL_SOLD_MONTH: &str = "sold_month";
pub const COL_SOLD_QUARTER: &str = "sold_quarter";
pub const COL_SOLD_DAY: &str = "sold_day";
pub const COL_BEDS_BATHS: &str = "beds_baths";
pub const COL_HOA_MONTH_BOOL: &str = "hoa_month_bool";

// Summary columns
pub const COL_N: &str = "n";
pub const COL_PPSF_AVG: &str = "ppsf_avg";
pub const COL_LB: &str = "lb";
pub const COL_UB: &str = "ub";
pub const COL_NYR: &str = "nyr";

/// Columns every fetched payload must carry once names are standardized
pub const REQUIRED_COLUMNS: [&str; 11] = [
    COL_SOLD_DATE,
    COL_PROPERTY_TYPE,
    COL_PRICE,
    COL_BEDS,
    COL_BATHS,
    COL_SQUARE_FEET,
    COL_LATITUDE,
    COL_LONGITUDE,
    COL_HOA_MONTH,
    COL_URL,
    COL_MLS_NUMBER,
];

/// Market metadata and listing-site bookkeeping that never reaches the analysis
pub const DROPPED_COLUMNS: [&str; 9] = [
    "sale_type",
    "status",
    "next_open_house_start_time",
    "next_open_house_end_time",
    "source",
    "favorite",
    "interested",
    "days_on_market",
    "dollar_square_feet",
];

pub const EXCLUDED_PROPERTY_TYPE: &str = "CONDO/CO-OP";
pub const UNKNOWN_PLACEHOLDER: &str = "UNKNOWN";

// Confidence band
pub const LOWER_PERCENTILE: f64 = 0.10;
pub const UPPER_PERCENTILE: f64 = 0.90;
/// Years of coverage a bed/bath combination may lag the best-covered one by
pub const YEAR_COVERAGE_SLACK: usize = 1;

// Artifact file names
pub const RAW_FILE: &str = "raw.csv";
pub const NORMALIZED_FILE: &str = "normalized.csv";
pub const DERIVED_FILE: &str = "derived.csv";
pub const SUMMARY_YEAR_BEDS_FILE: &str = "summary_year_beds.csv";
pub const SUMMARY_YEAR_BEDS_BATHS_FILE: &str = "summary_year_beds_baths.csv";
pub const CHART_YEAR_BEDS_FILE: &str = "chart_year_beds.vl.json";
pub const CHART_YEAR_BEDS_BATHS_FILE: &str = "chart_year_beds_baths.vl.json";
pub const MANIFEST_FILE: &str = "manifest.json";
