use crate::constants::UNKNOWN_PLACEHOLDER;
use crate::error::{Result, TrendsError};
use crate::manifest::FetchRecord;
use crate::query::ListingQuery;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Loosely-typed rows exactly as returned by the source (or loaded from a flat file).
/// Cells are trimmed; empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Push a row, padding or truncating it to the header width
    pub fn push_row(&mut self, mut row: Vec<Option<String>>) {
        row.resize(self.headers.len(), None);
        self.rows.push(row);
    }

    /// Append `other`, matching columns by name. Columns only `other` has are added
    /// at the end and left empty for rows already present.
    pub fn extend_aligned(&mut self, other: RawTable) {
        if self.headers.is_empty() {
            *self = other;
            return;
        }
        let mapping: Vec<usize> = other
            .headers
            .iter()
            .map(|h| match self.column_index(h) {
                Some(i) => i,
                None => {
                    self.headers.push(h.clone());
                    self.headers.len() - 1
                }
            })
            .collect();
        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, None);
        }
        for row in other.rows {
            let mut aligned = vec![None; width];
            for (cell, &target) in row.into_iter().zip(&mapping) {
                aligned[target] = cell;
            }
            self.rows.push(aligned);
        }
    }

    pub fn row(&self, index: usize) -> RowView<'_> {
        RowView {
            headers: &self.headers,
            cells: &self.rows[index],
        }
    }

    pub fn row_views(&self) -> impl Iterator<Item = RowView<'_>> {
        self.rows.iter().map(move |cells| RowView {
            headers: &self.headers,
            cells,
        })
    }

    pub fn from_records<T: TableRecord>(records: &[T]) -> Self {
        let headers = T::columns(records);
        let rows = records
            .iter()
            .map(|r| headers.iter().map(|h| r.cell(h)).collect())
            .collect();
        Self { headers, rows }
    }

    pub fn to_records<T: TableRecord>(&self) -> Result<Vec<T>> {
        self.row_views().map(|row| T::from_row(&row)).collect()
    }
}

/// Named access into one row of a [`RawTable`]
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    headers: &'a [String],
    cells: &'a [Option<String>],
}

impl<'a> RowView<'a> {
    pub fn headers(&self) -> &'a [String] {
        self.headers
    }

    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.cells.get(i))
            .and_then(|c| c.as_deref())
    }

    pub fn require(&self, column: &str) -> Result<&'a str> {
        self.get(column).ok_or_else(|| TrendsError::InvalidValue {
            column: column.to_string(),
            value: "<missing>".to_string(),
        })
    }

    /// Parse an optional cell; a present but unparseable value is an error
    pub fn parse<T: FromStr>(&self, column: &str) -> Result<Option<T>> {
        match self.get(column) {
            None => Ok(None),
            Some(text) => text.parse::<T>().map(Some).map_err(|_| TrendsError::InvalidValue {
                column: column.to_string(),
                value: text.to_string(),
            }),
        }
    }

    pub fn parse_required<T: FromStr>(&self, column: &str) -> Result<T> {
        self.parse(column)?.ok_or_else(|| TrendsError::InvalidValue {
            column: column.to_string(),
            value: "<missing>".to_string(),
        })
    }
}

/// A typed pipeline table that can be flattened to, and rebuilt from, named columns
pub trait TableRecord: Sized {
    /// Column order for a table of `records`
    fn columns(records: &[Self]) -> Vec<String>;

    /// Text for one cell; `None` renders as an empty cell
    fn cell(&self, column: &str) -> Option<String>;

    fn from_row(row: &RowView<'_>) -> Result<Self>;
}

/// Nominal value used for beds, baths and their composite key.
/// Ordered numerically where the label is a number, placeholders last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_PLACEHOLDER.to_string())
    }

    /// Category for a count such as beds or baths: `3.0` → "3", `2.5` → "2.5"
    pub fn from_count(value: Option<f64>) -> Self {
        value.map(|v| Self(format_number(v))).unwrap_or_else(Self::unknown)
    }

    /// Composite key `"{a}_{b}"`
    pub fn composite(a: &Category, b: &Category) -> Self {
        Self(format!("{}_{}", a.0, b.0))
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    fn sort_key(&self) -> Vec<Option<f64>> {
        self.0.split('_').map(|part| part.parse::<f64>().ok()).collect()
    }
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.sort_key(), other.sort_key());
        for (x, y) in a.iter().zip(&b) {
            let ord = match (x, y) {
                (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.len().cmp(&b.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a numeric cell, tolerating currency symbols and thousands separators
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != '$' && *c != ',').collect();
    cleaned.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Shortest text that parses back to the same value
pub fn format_number(value: f64) -> String {
    value.to_string()
}

/// Source of raw sold-listing rows
#[async_trait::async_trait]
pub trait ListingSource: Send + Sync {
    /// Unique identifier for this source
    fn source_name(&self) -> &'static str;

    /// Fetch the rows for one price bin. An empty bin is an empty table, not an error.
    async fn fetch_bin(&self, query: &ListingQuery) -> Result<FetchedBin>;
}

/// Rows returned for one request plus what was recorded about the request
#[derive(Debug, Clone)]
pub struct FetchedBin {
    pub table: RawTable,
    pub record: FetchRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_extend_aligned_matches_columns_by_name() {
        let mut a = RawTable::new(vec!["price".into(), "beds".into()]);
        a.push_row(vec![cell("100"), cell("3")]);

        let mut b = RawTable::new(vec!["beds".into(), "baths".into(), "price".into()]);
        b.push_row(vec![cell("2"), cell("1.5"), cell("200")]);

        a.extend_aligned(b);

        assert_eq!(a.headers, vec!["price", "beds", "baths"]);
        assert_eq!(a.rows[0], vec![cell("100"), cell("3"), None]);
        assert_eq!(a.rows[1], vec![cell("200"), cell("2"), cell("1.5")]);
    }

    #[test]
    fn test_extend_aligned_into_empty_takes_other() {
        let mut a = RawTable::default();
        let mut b = RawTable::new(vec!["x".into()]);
        b.push_row(vec![cell("1")]);
        a.extend_aligned(b.clone());
        assert_eq!(a, b);
    }

    #[test]
    fn test_category_orders_numerically() {
        let mut cats = vec![
            Category::new("10"),
            Category::unknown(),
            Category::new("2"),
            Category::from_count(Some(3.0)),
        ];
        cats.sort();
        let labels: Vec<&str> = cats.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["2", "3", "10", "UNKNOWN"]);

        let mut keys = vec![
            Category::composite(&Category::new("3"), &Category::new("2.5")),
            Category::composite(&Category::new("3"), &Category::new("2")),
            Category::composite(&Category::new("2"), &Category::new("1")),
        ];
        keys.sort();
        let labels: Vec<&str> = keys.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["2_1", "3_2", "3_2.5"]);
    }

    #[test]
    fn test_parse_number_strips_currency() {
        assert_eq!(parse_number("$1,250,000"), Some(1_250_000.0));
        assert_eq!(parse_number(" 2.5 "), Some(2.5));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("n/a"), None);
    }
}
