use crate::app::ports::HttpClientPort;
use crate::constants::{MLS_DISCLAIMER_PREFIX, REDFIN_SOURCE};
use crate::error::{Result, TrendsError};
use crate::manifest::{ChecksumMeta, FetchRecord};
use crate::metrics::sources;
use crate::query::ListingQuery;
use crate::types::{FetchedBin, ListingSource, RawTable};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Sold listings from the gis-csv endpoint, one request per price bin
pub struct RedfinSource {
    base_url: String,
    http: Arc<dyn HttpClientPort>,
}

impl RedfinSource {
    pub fn new(base_url: impl Into<String>, http: Arc<dyn HttpClientPort>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    pub fn request_url(&self, query: &ListingQuery) -> Result<String> {
        let url = reqwest::Url::parse_with_params(&self.base_url, query.query_pairs())
            .map_err(|e| TrendsError::Config(format!("invalid source url '{}': {}", self.base_url, e)))?;
        Ok(url.to_string())
    }
}

#[async_trait::async_trait]
impl ListingSource for RedfinSource {
    fn source_name(&self) -> &'static str {
        REDFIN_SOURCE
    }

    #[instrument(skip(self, query), fields(bin = %query.label()))]
    async fn fetch_bin(&self, query: &ListingQuery) -> Result<FetchedBin> {
        let url = self.request_url(query)?;
        let t0 = Instant::now();
        let resp = self.http.get(&url).await.map_err(|e| {
            sources::request_error();
            TrendsError::source_unavailable("fetch", format!("{}: {}", query.label(), e))
        })?;

        if !(200..=299).contains(&resp.status) {
            sources::request_error();
            return Err(TrendsError::source_unavailable(
                "fetch",
                format!("{}: HTTP status {}", query.label(), resp.status),
            ));
        }
        sources::request_success(t0.elapsed().as_secs_f64(), resp.bytes.len());
        debug!(
            "Received {} bytes ({}) for {}",
            resp.content_length,
            resp.content_type,
            query.label()
        );

        let table = parse_payload(&resp.bytes).map_err(|e| {
            TrendsError::source_unavailable("parse", format!("{}: {}", query.label(), e))
        })?;
        info!("Fetched {} rows for {}", table.len(), query.label());

        Ok(FetchedBin {
            record: FetchRecord {
                region_id: query.region_id.clone(),
                bin: query.bin,
                url,
                status: Some(resp.status),
                rows: table.len(),
                size_bytes: resp.bytes.len() as u64,
                checksum: ChecksumMeta::of(&resp.bytes),
                fetched_at: Utc::now(),
            },
            table,
        })
    }
}

/// Read a gis-csv payload. Header names are kept as sent; the disclaimer row some
/// markets prepend is skipped. An empty body is an empty table.
pub fn parse_payload(bytes: &[u8]) -> Result<RawTable> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(RawTable::default());
    }
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace()).copied();
    if matches!(first, Some(b'{') | Some(b'<')) {
        return Err(TrendsError::source_unavailable(
            "parse",
            "payload is not CSV (error page or JSON response)",
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut table = RawTable::new(headers);
    for record in reader.records() {
        let record = record?;
        if record
            .get(0)
            .map(|c| c.starts_with(MLS_DISCLAIMER_PREFIX))
            .unwrap_or(false)
        {
            continue;
        }
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        table.push_row(
            record
                .iter()
                .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
                .collect(),
        );
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use crate::query::QueryConfig;
    use std::sync::Mutex;

    const PAYLOAD: &str = "SALE TYPE,SOLD DATE,PROPERTY TYPE,PRICE,BEDS,BATHS,SQUARE FEET\n\
        In accordance with local MLS rules some sales are not listed,,,,,,\n\
        PAST SALE,September-15-2021,Single Family Residential,850000,3,2,1800\n\
        PAST SALE,March-2-2020,Townhouse,610000,2,1.5,\n";

    struct FakeHttp {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl HttpClientPort for FakeHttp {
        async fn get(&self, url: &str) -> std::result::Result<HttpGetResult, String> {
            self.seen.lock().unwrap().push(url.to_string());
            Ok(HttpGetResult {
                status: self.status,
                bytes: self.body.as_bytes().to_vec(),
                content_type: "text/csv".to_string(),
                content_length: self.body.len() as u64,
            })
        }
    }

    fn source(status: u16, body: &'static str) -> (RedfinSource, Arc<FakeHttp>) {
        let http = Arc::new(FakeHttp {
            status,
            body,
            seen: Mutex::new(Vec::new()),
        });
        (
            RedfinSource::new("https://example.test/api/gis-csv", http.clone()),
            http,
        )
    }

    #[test]
    fn test_parse_payload_skips_disclaimer() {
        let table = parse_payload(PAYLOAD.as_bytes()).unwrap();
        assert_eq!(table.headers.len(), 7);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0).get("SOLD DATE"), Some("September-15-2021"));
        assert_eq!(table.row(1).get("SQUARE FEET"), None);
    }

    #[test]
    fn test_parse_payload_empty_and_header_only() {
        assert!(parse_payload(b"").unwrap().headers.is_empty());
        let table = parse_payload(b"PRICE,BEDS\n").unwrap();
        assert_eq!(table.headers, vec!["PRICE", "BEDS"]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_parse_payload_rejects_json_error_body() {
        let err = parse_payload(b"{}&&{\"errorMessage\":\"bad region\"}").unwrap_err();
        assert!(matches!(err, TrendsError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_bin_builds_query_and_records_checksum() {
        let (source, http) = source(200, PAYLOAD);
        let query = QueryConfig::default().requests().remove(0);

        let fetched = source.fetch_bin(&query).await.unwrap();

        assert_eq!(fetched.table.len(), 2);
        assert_eq!(fetched.record.rows, 2);
        assert_eq!(fetched.record.checksum, ChecksumMeta::of(PAYLOAD.as_bytes()));
        let seen = http.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("region_id=16163"));
        assert!(seen[0].contains("min_price=500000"));
        assert!(seen[0].contains("max_price=749999"));
        assert!(seen[0].contains("uipt=1%2C2%2C3"));
    }

    #[tokio::test]
    async fn test_fetch_bin_non_success_status_is_source_unavailable() {
        let (source, _) = source(503, "");
        let query = QueryConfig::default().requests().remove(0);
        let err = source.fetch_bin(&query).await.unwrap_err();
        match err {
            TrendsError::SourceUnavailable { stage, message } => {
                assert_eq!(stage, "fetch");
                assert!(message.contains("503"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
