pub mod export;
pub mod processing;
pub mod visualize;

use crate::config::{Config, OutputConfig};
use crate::constants::*;
use crate::error::{Result, TrendsError};
use crate::manifest::{FetchRecord, RunManifest};
use crate::metrics::stages;
use crate::query::QueryConfig;
use crate::types::{ListingSource, RawTable};
use chrono::{DateTime, Utc};
use processing::aggregate::{Aggregator, YearBedsBathsSummary, YearBedsSummary};
use processing::derive::{DerivedRecord, FeatureDeriver};
use processing::normalize::{missing_required_columns, NormalizedRecord, RecordNormalizer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span, instrument, warn};
use uuid::Uuid;

/// Row counts per stage, including why rows were dropped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCounts {
    pub fetched: usize,
    pub duplicates_removed: usize,
    pub missing_sold_date: usize,
    pub excluded_property_type: usize,
    pub normalized: usize,
    pub unparseable_sold_date: usize,
    pub missing_price_or_area: usize,
    pub non_positive_price_or_area: usize,
    pub derived: usize,
    pub year_beds_groups: usize,
    pub combinations: usize,
    pub sparse_combinations_dropped: usize,
    pub year_beds_baths_groups: usize,
}

/// Every table the analysis produces from one raw table
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub normalized: Vec<NormalizedRecord>,
    pub derived: Vec<DerivedRecord>,
    pub year_beds: Vec<YearBedsSummary>,
    pub year_beds_baths: Vec<YearBedsBathsSummary>,
    pub counts: StageCounts,
}

/// Result of a complete pipeline run
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub output_dir: PathBuf,
    pub counts: StageCounts,
    pub artifacts: Vec<PathBuf>,
    pub manifest: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub normalizer: RecordNormalizer,
    pub deriver: FeatureDeriver,
    pub aggregator: Aggregator,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every price bin in turn and concatenate the rows.
    /// A bin missing required columns aborts the fetch; duplicates from overlapping
    /// bins are left for the normalizer.
    #[instrument(skip_all, fields(source = source.source_name()))]
    pub async fn fetch(
        &self,
        source: &dyn ListingSource,
        query: &QueryConfig,
    ) -> Result<(RawTable, Vec<FetchRecord>)> {
        query.validate()?;
        let t_fetch = Instant::now();
        let requests = query.requests();
        info!("📡 Fetching {} price bins from {}", requests.len(), source.source_name());

        let mut table = RawTable::default();
        let mut records = Vec::with_capacity(requests.len());
        for request in &requests {
            let bin = source.fetch_bin(request).await?;
            // A headerless body is an empty bin; anything else must carry the full schema
            if !bin.table.headers.is_empty() {
                let missing = missing_required_columns(&bin.table.headers);
                if !missing.is_empty() {
                    return Err(TrendsError::SchemaMismatch {
                        stage: format!("fetch {}", request.label()),
                        missing,
                    });
                }
            }
            stages::rows_fetched(bin.table.len());
            table.extend_aligned(bin.table);
            records.push(bin.record);
        }

        stages::duration("fetch", t_fetch.elapsed().as_secs_f64());
        stages::rows_out("fetch", table.len());
        info!("✅ Fetched {} raw rows", table.len());
        Ok((table, records))
    }

    /// Normalize, derive and aggregate `raw`. Only schema problems are fatal.
    pub fn analyze(&self, raw: &RawTable) -> Result<PipelineOutput> {
        let mut counts = StageCounts {
            fetched: raw.len(),
            ..StageCounts::default()
        };

        let normalized = {
            let _span = info_span!("normalize").entered();
            let t = Instant::now();
            let (rows, report) = self.normalizer.normalize(raw)?;
            counts.duplicates_removed = report.duplicates_removed;
            counts.missing_sold_date = report.missing_sold_date;
            counts.excluded_property_type = report.excluded_property_type;
            counts.normalized = rows.len();
            stages::rows_dropped("normalize", "duplicate", report.duplicates_removed);
            stages::rows_dropped("normalize", "missing_sold_date", report.missing_sold_date);
            stages::rows_dropped("normalize", "excluded_property_type", report.excluded_property_type);
            stages::rows_out("normalize", rows.len());
            stages::duration("normalize", t.elapsed().as_secs_f64());
            rows
        };

        let derived = {
            let _span = info_span!("derive").entered();
            let t = Instant::now();
            let (rows, report) = self.deriver.derive(&normalized);
            counts.unparseable_sold_date = report.unparseable_sold_date;
            counts.missing_price_or_area = report.missing_price_or_area;
            counts.non_positive_price_or_area = report.non_positive_price_or_area;
            counts.derived = rows.len();
            stages::rows_dropped("derive", "unparseable_sold_date", report.unparseable_sold_date);
            stages::rows_dropped("derive", "missing_price_or_area", report.missing_price_or_area);
            stages::rows_dropped("derive", "non_positive_price_or_area", report.non_positive_price_or_area);
            stages::rows_out("derive", rows.len());
            stages::duration("derive", t.elapsed().as_secs_f64());
            rows
        };

        let (year_beds, year_beds_baths) = {
            let _span = info_span!("aggregate").entered();
            let t = Instant::now();
            let year_beds = self.aggregator.by_year_beds(&derived);
            let (year_beds_baths, report) = self.aggregator.by_year_beds_baths(&derived);
            counts.year_beds_groups = year_beds.len();
            counts.combinations = report.combinations;
            counts.sparse_combinations_dropped = report.sparse_combinations_dropped;
            counts.year_beds_baths_groups = report.year_beds_baths_groups;
            stages::rows_out("summary_year_beds", year_beds.len());
            stages::rows_out("summary_year_beds_baths", year_beds_baths.len());
            stages::duration("aggregate", t.elapsed().as_secs_f64());
            (year_beds, year_beds_baths)
        };

        if derived.is_empty() {
            warn!("No usable sales after normalization; summaries are empty");
        }

        Ok(PipelineOutput {
            normalized,
            derived,
            year_beds,
            year_beds_baths,
            counts,
        })
    }

    /// Fetch, analyze, then write tables, charts and the manifest into a fresh run directory
    #[instrument(skip_all, fields(source = source.source_name()))]
    pub async fn run(&self, config: &Config, source: &dyn ListingSource) -> Result<PipelineResult> {
        info!("🚀 Starting pipeline for {}", source.source_name());
        let mut manifest = RunManifest::new(source.source_name(), Some(config.query.clone()));

        let (raw, fetches) = self.fetch(source, &config.query).await?;
        manifest.fetches = fetches;
        let output = self.analyze(&raw)?;

        self.write_run(manifest, &config.output, &raw, Some(&output))
    }

    /// Fetch and export only the raw table
    #[instrument(skip_all, fields(source = source.source_name()))]
    pub async fn fetch_only(&self, config: &Config, source: &dyn ListingSource) -> Result<PipelineResult> {
        let mut manifest = RunManifest::new(source.source_name(), Some(config.query.clone()));
        let (raw, fetches) = self.fetch(source, &config.query).await?;
        manifest.fetches = fetches;
        manifest.counts.fetched = raw.len();
        self.write_run(manifest, &config.output, &raw, None)
    }

    /// Analyze a previously exported raw table
    #[instrument(skip_all, fields(rows = raw.len()))]
    pub fn run_offline(&self, raw: &RawTable, source_label: &str, output: &OutputConfig) -> Result<PipelineResult> {
        let manifest = RunManifest::new(source_label, None);
        let analyzed = self.analyze(raw)?;
        self.write_run(manifest, output, raw, Some(&analyzed))
    }

    fn write_run(
        &self,
        mut manifest: RunManifest,
        output: &OutputConfig,
        raw: &RawTable,
        analyzed: Option<&PipelineOutput>,
    ) -> Result<PipelineResult> {
        let _span = info_span!("export").entered();
        let dir = run_dir(&output.dir, &manifest.run_id, manifest.started_at);

        let mut artifacts = vec![export::save_raw(&dir, raw)?];
        if let Some(analyzed) = analyzed {
            artifacts.extend(export::save_analysis(&dir, analyzed)?);
            if output.write_charts {
                artifacts.push(visualize::write_chart(
                    &dir.join(CHART_YEAR_BEDS_FILE),
                    &visualize::year_beds_chart(&analyzed.year_beds),
                )?);
                artifacts.push(visualize::write_chart(
                    &dir.join(CHART_YEAR_BEDS_BATHS_FILE),
                    &visualize::year_beds_baths_chart(&analyzed.year_beds_baths),
                )?);
            }
            manifest.counts = analyzed.counts.clone();
        }

        manifest.artifacts = artifacts.clone();
        manifest.finish();
        let manifest_path = manifest.write(&dir)?;
        info!("💾 Wrote {} artifacts to {}", artifacts.len(), dir.display());

        Ok(PipelineResult {
            run_id: manifest.run_id,
            output_dir: dir,
            counts: manifest.counts,
            artifacts,
            manifest: manifest_path,
        })
    }
}

/// `<base>/run_<YYYYmmdd_HHMMSS>_<first 8 of run id>`
pub fn run_dir(base: &Path, run_id: &Uuid, started_at: DateTime<Utc>) -> PathBuf {
    let id = run_id.simple().to_string();
    base.join(format!("run_{}_{}", started_at.format("%Y%m%d_%H%M%S"), &id[..8]))
}
