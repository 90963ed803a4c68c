use crate::constants::*;
use crate::error::Result;
use crate::pipeline::processing::derive::DerivedRecord;
use crate::types::{format_number, Category, RowView, TableRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

/// Count, area-weighted average PPSF and percentile band for one group
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PpsfStats {
    pub n: usize,
    /// sum(price) / sum(square_feet), not the mean of per-row ppsf
    pub ppsf_avg: f64,
    pub lb: f64,
    pub ub: f64,
}

/// View A row, keyed by (sold_year, beds)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearBedsSummary {
    pub sold_year: i32,
    pub beds: Category,
    pub stats: PpsfStats,
}

/// View B row, keyed by (sold_year, beds, baths)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearBedsBathsSummary {
    pub sold_year: i32,
    pub beds: Category,
    pub baths: Category,
    /// Distinct sale years observed for this beds × baths combination
    pub nyr: usize,
    pub stats: PpsfStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateReport {
    pub combinations: usize,
    pub max_year_coverage: usize,
    pub sparse_combinations_dropped: usize,
    pub year_beds_baths_groups: usize,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub year_coverage_slack: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            lower_percentile: LOWER_PERCENTILE,
            upper_percentile: UPPER_PERCENTILE,
            year_coverage_slack: YEAR_COVERAGE_SLACK,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    pub config: AggregatorConfig,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// View A: every (sold_year, beds) group, however small
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub fn by_year_beds(&self, rows: &[DerivedRecord]) -> Vec<YearBedsSummary> {
        let mut groups: BTreeMap<(i32, Category), Vec<&DerivedRecord>> = BTreeMap::new();
        for row in rows {
            groups
                .entry((row.sold_year, row.beds.clone()))
                .or_default()
                .push(row);
        }
        groups
            .into_iter()
            .filter_map(|((sold_year, beds), members)| {
                self.stats(&members).map(|stats| YearBedsSummary {
                    sold_year,
                    beds,
                    stats,
                })
            })
            .collect()
    }

    /// View B: (sold_year, beds, baths) groups for combinations whose year coverage is
    /// within the slack of the best-covered combination
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub fn by_year_beds_baths(
        &self,
        rows: &[DerivedRecord],
    ) -> (Vec<YearBedsBathsSummary>, AggregateReport) {
        let mut years: BTreeMap<(Category, Category), BTreeSet<i32>> = BTreeMap::new();
        let mut groups: BTreeMap<(i32, Category, Category), Vec<&DerivedRecord>> = BTreeMap::new();
        for row in rows {
            years
                .entry((row.beds.clone(), row.baths.clone()))
                .or_default()
                .insert(row.sold_year);
            groups
                .entry((row.sold_year, row.beds.clone(), row.baths.clone()))
                .or_default()
                .push(row);
        }

        let max_year_coverage = years.values().map(BTreeSet::len).max().unwrap_or(0);
        let threshold = max_year_coverage.saturating_sub(self.config.year_coverage_slack);
        let sparse: BTreeSet<&(Category, Category)> = years
            .iter()
            .filter(|(_, covered)| covered.len() < threshold)
            .map(|(key, _)| key)
            .collect();
        for (beds, baths) in &sparse {
            debug!(%beds, %baths, "Dropping sparse bed/bath combination");
        }

        let summaries: Vec<YearBedsBathsSummary> = groups
            .iter()
            .filter_map(|((sold_year, beds, baths), members)| {
                let combo = (beds.clone(), baths.clone());
                if sparse.contains(&combo) {
                    return None;
                }
                let nyr = years.get(&combo).map(BTreeSet::len).unwrap_or(0);
                self.stats(members).map(|stats| YearBedsBathsSummary {
                    sold_year: *sold_year,
                    beds: beds.clone(),
                    baths: baths.clone(),
                    nyr,
                    stats,
                })
            })
            .collect();

        let report = AggregateReport {
            combinations: years.len(),
            max_year_coverage,
            sparse_combinations_dropped: sparse.len(),
            year_beds_baths_groups: summaries.len(),
        };
        info!(
            "Kept {} of {} bed/bath combinations (max coverage {} years)",
            report.combinations - report.sparse_combinations_dropped,
            report.combinations,
            max_year_coverage
        );
        (summaries, report)
    }

    fn stats(&self, members: &[&DerivedRecord]) -> Option<PpsfStats> {
        let mut ppsf: Vec<f64> = members.iter().map(|r| r.ppsf).collect();
        ppsf.sort_by(|a, b| a.total_cmp(b));
        let total_price: f64 = members.iter().map(|r| r.price).sum();
        let total_area: f64 = members.iter().map(|r| r.square_feet).sum();
        Some(PpsfStats {
            n: members.len(),
            ppsf_avg: total_price / total_area,
            lb: percentile(&ppsf, self.config.lower_percentile)?,
            ub: percentile(&ppsf, self.config.upper_percentile)?,
        })
    }
}

/// Linear interpolation between order statistics at rank `p * (n - 1)` over
/// ascending `sorted`. A single value is every percentile; empty input has none.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = p.clamp(0.0, 1.0) * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

const YEAR_BEDS_COLUMNS: [&str; 6] = [COL_SOLD_YEAR, COL_BEDS, COL_N, COL_PPSF_AVG, COL_LB, COL_UB];
const YEAR_BEDS_BATHS_COLUMNS: [&str; 8] = [
    COL_SOLD_YEAR,
    COL_BEDS,
    COL_BATHS,
    COL_NYR,
    COL_N,
    COL_PPSF_AVG,
    COL_LB,
    COL_UB,
];

impl PpsfStats {
    fn cell(&self, column: &str) -> Option<String> {
        match column {
            COL_N => Some(self.n.to_string()),
            COL_PPSF_AVG => Some(format_number(self.ppsf_avg)),
            COL_LB => Some(format_number(self.lb)),
            COL_UB => Some(format_number(self.ub)),
            _ => None,
        }
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            n: row.parse_required(COL_N)?,
            ppsf_avg: row.parse_required(COL_PPSF_AVG)?,
            lb: row.parse_required(COL_LB)?,
            ub: row.parse_required(COL_UB)?,
        })
    }
}

impl TableRecord for YearBedsSummary {
    fn columns(_: &[Self]) -> Vec<String> {
        YEAR_BEDS_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn cell(&self, column: &str) -> Option<String> {
        match column {
            COL_SOLD_YEAR => Some(self.sold_year.to_string()),
            COL_BEDS => Some(self.beds.to_string()),
            other => self.stats.cell(other),
        }
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            sold_year: row.parse_required(COL_SOLD_YEAR)?,
            beds: Category::new(row.require(COL_BEDS)?),
            stats: PpsfStats::from_row(row)?,
        })
    }
}

impl TableRecord for YearBedsBathsSummary {
    fn columns(_: &[Self]) -> Vec<String> {
        YEAR_BEDS_BATHS_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn cell(&self, column: &str) -> Option<String> {
        match column {
            COL_SOLD_YEAR => Some(self.sold_year.to_string()),
            COL_BEDS => Some(self.beds.to_string()),
            COL_BATHS => Some(self.baths.to_string()),
            COL_NYR => Some(self.nyr.to_string()),
            other => self.stats.cell(other),
        }
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            sold_year: row.parse_required(COL_SOLD_YEAR)?,
            beds: Category::new(row.require(COL_BEDS)?),
            baths: Category::new(row.require(COL_BATHS)?),
            nyr: row.parse_required(COL_NYR)?,
            stats: PpsfStats::from_row(row)?,
        })
    }
}
