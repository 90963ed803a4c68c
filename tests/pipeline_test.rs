use ppsf_trends::app::ports::{HttpClientPort, HttpGetResult};
use ppsf_trends::apis::redfin::RedfinSource;
use ppsf_trends::config::{Config, OutputConfig};
use ppsf_trends::error::TrendsError;
use ppsf_trends::pipeline::export;
use ppsf_trends::pipeline::Pipeline;
use ppsf_trends::query::QueryConfig;
use ppsf_trends::types::Category;
use std::sync::{Arc, Mutex};

const HEADER: &str = "SALE TYPE,SOLD DATE,PROPERTY TYPE,ADDRESS,CITY,PRICE,BEDS,BATHS,SQUARE FEET,\
HOA/MONTH,STATUS,URL (SEE https://www.redfin.com/buy-a-home/comparative-market-analysis FOR INFO ON PRICING),\
SOURCE,MLS#,FAVORITE,INTERESTED,LATITUDE,LONGITUDE";

const SALE_A: &str = "PAST SALE,March-5-2020,Single Family Residential,1 Main St,Seattle,300000,3,2,1500,,Sold,\
https://www.redfin.com/WA/Seattle/1-Main-St-98101/home/1001,NWMLS,1901,N,Y,47.5,-122.4";
const SALE_B: &str = "PAST SALE,June-9-2020,Single Family Residential,2 Main St,Seattle,330000,3,2,1100,150,Sold,\
https://www.redfin.com/WA/Seattle/2-Main-St-98101/home/1002,NWMLS,1902,N,Y,47.7,-122.2";
const SALE_C: &str = "PAST SALE,July-1-2021,Single Family Residential,3 Main St,Seattle,400000,3,2,2000,,Sold,\
https://www.redfin.com/WA/Seattle/3-Main-St-98101/home/1003,NWMLS,1903,N,Y,47.6,-122.3";
const SALE_CONDO: &str = "PAST SALE,July-9-2021,Condo/Co-op,4 Main St #5,Seattle,500000,2,1,900,400,Sold,\
https://www.redfin.com/WA/Seattle/4-Main-St-98101/unit-5/home/1004,NWMLS,1904,N,Y,47.65,-122.25";
const SALE_NO_AREA: &str = "PAST SALE,August-2-2021,Townhouse,5 Main St,Seattle,610000,2,1,,,Sold,\
https://www.redfin.com/WA/Seattle/5-Main-St-98101/home/1005,NWMLS,1905,N,Y,47.55,-122.35";

/// Serves one payload per price bin; the first bin overlaps the second by one sale
struct BinnedHttp {
    seen: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl HttpClientPort for BinnedHttp {
    async fn get(&self, url: &str) -> Result<HttpGetResult, String> {
        self.seen.lock().unwrap().push(url.to_string());
        let rows = if url.contains("min_price=500000") {
            vec![SALE_A, SALE_B, SALE_C]
        } else if url.contains("min_price=750000") {
            vec![SALE_C, SALE_CONDO, SALE_NO_AREA]
        } else {
            vec![]
        };
        let body = if rows.is_empty() {
            String::new()
        } else {
            format!("{}\n{}\n", HEADER, rows.join("\n"))
        };
        Ok(HttpGetResult {
            status: 200,
            content_length: body.len() as u64,
            bytes: body.into_bytes(),
            content_type: "text/csv".to_string(),
        })
    }
}

fn config(dir: &std::path::Path, bins: u32) -> Config {
    Config {
        query: QueryConfig {
            region_ids: vec!["16163".to_string()],
            price_floor: 500_000,
            price_bin_width: 250_000,
            price_bin_count: bins,
            ..QueryConfig::default()
        },
        output: OutputConfig {
            dir: dir.to_path_buf(),
            write_charts: true,
        },
        ..Config::default()
    }
}

fn source() -> (RedfinSource, Arc<BinnedHttp>) {
    let http = Arc::new(BinnedHttp {
        seen: Mutex::new(Vec::new()),
    });
    (RedfinSource::new("https://example.test/api/gis-csv", http.clone()), http)
}

#[tokio::test]
async fn test_full_run_over_overlapping_bins() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 3);
    let (source, http) = source();

    let result = Pipeline::new().run(&config, &source).await.unwrap();

    assert_eq!(http.seen.lock().unwrap().len(), 3);
    let counts = &result.counts;
    assert_eq!(counts.fetched, 6);
    assert_eq!(counts.duplicates_removed, 1);
    assert_eq!(counts.excluded_property_type, 1);
    assert_eq!(counts.normalized, 4);
    assert_eq!(counts.missing_price_or_area, 1);
    assert_eq!(counts.derived, 3);

    let derived = export::load_derived(&result.output_dir).unwrap();
    assert_eq!(derived.len(), 3);
    for row in &derived {
        assert_eq!(row.ppsf, row.price / row.square_feet);
        assert!(row.square_feet > 0.0);
        assert_ne!(row.property_type, "CONDO/CO-OP");
        let lat = row.latitude.unwrap();
        assert!((0.0..=100.0).contains(&lat));
    }
    let by_url_id = |id: u64| derived.iter().find(|r| r.url_id == Some(id)).unwrap();
    assert_eq!(by_url_id(1001).latitude, Some(0.0));
    assert_eq!(by_url_id(1002).latitude, Some(100.0));
    assert_eq!((by_url_id(1001).hoa_month, by_url_id(1001).hoa_month_bool), (0.0, 0));
    assert_eq!((by_url_id(1002).hoa_month, by_url_id(1002).hoa_month_bool), (150.0, 1));

    let (year_beds, year_beds_baths) = export::load_summaries(&result.output_dir).unwrap();
    assert_eq!(year_beds.len(), 2);
    assert_eq!((year_beds[0].sold_year, year_beds[0].beds.label()), (2020, "3"));
    assert_eq!(year_beds[0].stats.n, 2);
    assert!((year_beds[0].stats.ppsf_avg - 242.31).abs() < 0.005);
    assert_eq!((year_beds[1].sold_year, year_beds[1].stats.n), (2021, 1));
    assert_eq!(year_beds[1].stats.ppsf_avg, 200.0);

    // A single beds/baths combination covering both years survives the coverage filter
    assert_eq!(year_beds_baths.len(), 2);
    assert!(year_beds_baths
        .iter()
        .all(|r| r.baths == Category::new("2") && r.nyr == 2));

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&result.manifest).unwrap()).unwrap();
    assert_eq!(manifest["fetches"].as_array().unwrap().len(), 3);
    assert_eq!(manifest["fetches"][2]["rows"], 0);
    assert_eq!(manifest["counts"]["derived"], 3);
}

#[tokio::test]
async fn test_exported_tables_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 2);
    let (source, _) = source();
    let pipeline = Pipeline::new();

    let (raw, _) = pipeline.fetch(&source, &config.query).await.unwrap();
    let output = pipeline.analyze(&raw).unwrap();
    let result = pipeline.run_offline(&raw, "fixture", &config.output).unwrap();

    assert_eq!(export::load_raw(&result.output_dir).unwrap(), raw);
    assert_eq!(export::load_normalized(&result.output_dir).unwrap(), output.normalized);
    assert_eq!(export::load_derived(&result.output_dir).unwrap(), output.derived);
    let (year_beds, year_beds_baths) = export::load_summaries(&result.output_dir).unwrap();
    assert_eq!(year_beds, output.year_beds);
    assert_eq!(year_beds_baths, output.year_beds_baths);
}

#[tokio::test]
async fn test_reanalyzing_exported_raw_matches_online_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 2);
    let (source, _) = source();
    let pipeline = Pipeline::new();

    let fetched = pipeline.fetch_only(&config, &source).await.unwrap();
    assert_eq!(fetched.artifacts.len(), 1);

    let raw = export::load_raw(&fetched.output_dir).unwrap();
    let offline = pipeline.run_offline(&raw, "raw.csv", &config.output).unwrap();
    let online = pipeline.run(&config, &source).await.unwrap();
    assert_eq!(offline.counts, online.counts);
}

#[tokio::test]
async fn test_schema_mismatch_aborts_before_export() {
    struct PartialHttp;

    #[async_trait::async_trait]
    impl HttpClientPort for PartialHttp {
        async fn get(&self, _url: &str) -> Result<HttpGetResult, String> {
            let body = b"SOLD DATE,PRICE\nMarch-5-2020,300000\n".to_vec();
            Ok(HttpGetResult {
                status: 200,
                content_length: body.len() as u64,
                bytes: body,
                content_type: "text/csv".to_string(),
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 1);
    let source = RedfinSource::new("https://example.test/api/gis-csv", Arc::new(PartialHttp));

    let err = Pipeline::new().run(&config, &source).await.unwrap_err();
    assert!(matches!(err, TrendsError::SchemaMismatch { .. }));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_bin_missing_required_columns_aborts_run() {
    /// First bin is complete; the second drops area, location and listing columns
    struct SplitSchemaHttp;

    #[async_trait::async_trait]
    impl HttpClientPort for SplitSchemaHttp {
        async fn get(&self, url: &str) -> Result<HttpGetResult, String> {
            let body = if url.contains("min_price=500000") {
                format!("{}\n{}\n", HEADER, SALE_A)
            } else {
                "SOLD DATE,PROPERTY TYPE,PRICE,BEDS,BATHS\n\
                 July-1-2021,Single Family Residential,800000,3,2\n"
                    .to_string()
            };
            Ok(HttpGetResult {
                status: 200,
                content_length: body.len() as u64,
                bytes: body.into_bytes(),
                content_type: "text/csv".to_string(),
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 2);
    let source = RedfinSource::new("https://example.test/api/gis-csv", Arc::new(SplitSchemaHttp));

    let err = Pipeline::new().run(&config, &source).await.unwrap_err();
    match &err {
        TrendsError::SchemaMismatch { stage, missing } => {
            assert!(stage.starts_with("fetch"));
            assert!(stage.contains("750000"));
            assert!(missing.contains(&"square_feet".to_string()));
            assert!(missing.contains(&"mls_number".to_string()));
            assert!(!missing.contains(&"price".to_string()));
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }
    assert!(err.to_string().contains("during fetch"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
