use crate::error::{Result, TrendsError};
use serde::{Deserialize, Serialize};

/// Parameters that decide what sold listings are requested from the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub region_ids: Vec<String>,
    /// Source region type code (6 = city, 2 = zip, 5 = county, 1 = neighborhood)
    pub region_type: u8,
    /// Source sale status code (9 = sold)
    pub sold_status: u8,
    /// Source property type codes (1 = house, 2 = condo, 3 = townhouse)
    pub property_types: Vec<u8>,
    pub price_floor: u64,
    pub price_bin_width: u64,
    pub price_bin_count: u32,
    pub min_beds: u32,
    pub max_beds: u32,
    pub min_baths: f32,
    pub max_baths: f32,
    /// Lookback window in days
    pub sold_within_days: u32,
    /// Row cap the source applies per request
    pub num_homes: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            region_ids: vec!["16163".to_string()],
            region_type: 6,
            sold_status: 9,
            property_types: vec![1, 2, 3],
            price_floor: 500_000,
            price_bin_width: 250_000,
            price_bin_count: 6,
            min_beds: 1,
            max_beds: 6,
            min_baths: 1.0,
            max_baths: 5.0,
            sold_within_days: 1825,
            num_homes: 350,
        }
    }
}

/// One inclusive sub-range of the configured price band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBin {
    pub min_price: u64,
    pub max_price: u64,
}

/// A single request against the listings source: one region, one price bin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingQuery {
    pub region_id: String,
    pub region_type: u8,
    pub sold_status: u8,
    pub property_types: Vec<u8>,
    pub bin: PriceBin,
    pub min_beds: u32,
    pub max_beds: u32,
    pub min_baths: f32,
    pub max_baths: f32,
    pub sold_within_days: u32,
    pub num_homes: u32,
}

impl QueryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.region_ids.iter().all(|r| r.trim().is_empty()) {
            return Err(TrendsError::Config("at least one region id is required".into()));
        }
        if self.property_types.is_empty() {
            return Err(TrendsError::Config("at least one property type is required".into()));
        }
        if self.price_bin_width == 0 || self.price_bin_count == 0 {
            return Err(TrendsError::Config(
                "price_bin_width and price_bin_count must be positive".into(),
            ));
        }
        if self.min_beds > self.max_beds {
            return Err(TrendsError::Config(format!(
                "min_beds ({}) exceeds max_beds ({})",
                self.min_beds, self.max_beds
            )));
        }
        if self.min_baths > self.max_baths {
            return Err(TrendsError::Config(format!(
                "min_baths ({}) exceeds max_baths ({})",
                self.min_baths, self.max_baths
            )));
        }
        if self.sold_within_days == 0 {
            return Err(TrendsError::Config("sold_within_days must be positive".into()));
        }
        Ok(())
    }

    /// Contiguous, non-overlapping bins starting at the price floor
    pub fn price_bins(&self) -> Vec<PriceBin> {
        (0..u64::from(self.price_bin_count))
            .map(|i| {
                let min_price = self.price_floor + i * self.price_bin_width;
                PriceBin {
                    min_price,
                    max_price: min_price + self.price_bin_width - 1,
                }
            })
            .collect()
    }

    /// One query per (region, price bin)
    pub fn requests(&self) -> Vec<ListingQuery> {
        let bins = self.price_bins();
        self.region_ids
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .flat_map(|region_id| {
                bins.iter().map(move |bin| ListingQuery {
                    region_id: region_id.to_string(),
                    region_type: self.region_type,
                    sold_status: self.sold_status,
                    property_types: self.property_types.clone(),
                    bin: *bin,
                    min_beds: self.min_beds,
                    max_beds: self.max_beds,
                    min_baths: self.min_baths,
                    max_baths: self.max_baths,
                    sold_within_days: self.sold_within_days,
                    num_homes: self.num_homes,
                })
            })
            .collect()
    }
}

impl ListingQuery {
    /// Query-string pairs understood by the gis-csv endpoint
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let uipt = self
            .property_types
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",");
        vec![
            ("al", "1".to_string()),
            ("region_id", self.region_id.clone()),
            ("region_type", self.region_type.to_string()),
            ("status", self.sold_status.to_string()),
            ("uipt", uipt),
            ("min_price", self.bin.min_price.to_string()),
            ("max_price", self.bin.max_price.to_string()),
            ("min_num_beds", self.min_beds.to_string()),
            ("max_num_beds", self.max_beds.to_string()),
            ("min_num_baths", self.min_baths.to_string()),
            ("max_num_baths", self.max_baths.to_string()),
            ("sold_within_days", self.sold_within_days.to_string()),
            ("num_homes", self.num_homes.to_string()),
            ("v", "8".to_string()),
        ]
    }

    pub fn label(&self) -> String {
        format!(
            "region={} price={}..={}",
            self.region_id, self.bin.min_price, self.bin.max_price
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_bins_are_contiguous_and_inclusive() {
        let config = QueryConfig {
            price_floor: 100_000,
            price_bin_width: 50_000,
            price_bin_count: 3,
            ..QueryConfig::default()
        };
        let bins = config.price_bins();
        assert_eq!(
            bins,
            vec![
                PriceBin { min_price: 100_000, max_price: 149_999 },
                PriceBin { min_price: 150_000, max_price: 199_999 },
                PriceBin { min_price: 200_000, max_price: 249_999 },
            ]
        );
    }

    #[test]
    fn test_requests_cover_every_region_and_bin() {
        let config = QueryConfig {
            region_ids: vec!["1".into(), " ".into(), "2".into()],
            price_bin_count: 2,
            ..QueryConfig::default()
        };
        let requests = config.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0].region_id, "1");
        assert_eq!(requests[3].region_id, "2");
        assert_eq!(requests[3].bin, config.price_bins()[1]);
    }

    #[test]
    fn test_query_pairs_join_property_types() {
        let config = QueryConfig {
            property_types: vec![1, 3],
            ..QueryConfig::default()
        };
        let pairs = config.requests()[0].query_pairs();
        let uipt = pairs.iter().find(|(k, _)| *k == "uipt").map(|(_, v)| v.as_str());
        assert_eq!(uipt, Some("1,3"));
        let status = pairs.iter().find(|(k, _)| *k == "status").map(|(_, v)| v.as_str());
        assert_eq!(status, Some("9"));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = QueryConfig {
            min_beds: 4,
            max_beds: 2,
            ..QueryConfig::default()
        };
        assert!(matches!(config.validate(), Err(TrendsError::Config(_))));

        let config = QueryConfig {
            price_bin_width: 0,
            ..QueryConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(QueryConfig::default().validate().is_ok());
    }
}
