//! Vega-Lite chart specs for the two summary views.
//!
//! Each chart layers a line of `ppsf_avg` per category over `sold_year`, an error
//! bar spanning `lb..ub`, and the group size `n` as a text label. The data is
//! inlined so a spec file is self-contained.

use crate::constants::*;
use crate::error::Result;
use crate::pipeline::processing::aggregate::{YearBedsBathsSummary, YearBedsSummary};
use crate::types::Category;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

pub fn year_beds_chart(rows: &[YearBedsSummary]) -> Value {
    let values: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                COL_SOLD_YEAR: r.sold_year,
                COL_BEDS: r.beds.label(),
                COL_N: r.stats.n,
                COL_PPSF_AVG: r.stats.ppsf_avg,
                COL_LB: r.stats.lb,
                COL_UB: r.stats.ub,
            })
        })
        .collect();
    let beds_order = category_order(rows.iter().map(|r| &r.beds));

    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": "Price per square foot by sold year and beds",
        "width": 640,
        "height": 360,
        "data": { "values": values },
        "layer": trend_layers(COL_BEDS, &beds_order),
    })
}

/// View B, one column per beds value with a line per baths value
pub fn year_beds_baths_chart(rows: &[YearBedsBathsSummary]) -> Value {
    let values: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                COL_SOLD_YEAR: r.sold_year,
                COL_BEDS: r.beds.label(),
                COL_BATHS: r.baths.label(),
                COL_NYR: r.nyr,
                COL_N: r.stats.n,
                COL_PPSF_AVG: r.stats.ppsf_avg,
                COL_LB: r.stats.lb,
                COL_UB: r.stats.ub,
            })
        })
        .collect();
    let beds_order = category_order(rows.iter().map(|r| &r.beds));
    let baths_order = category_order(rows.iter().map(|r| &r.baths));

    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": "Price per square foot by sold year, beds and baths",
        "data": { "values": values },
        "facet": {
            "column": {
                "field": COL_BEDS,
                "type": "nominal",
                "sort": beds_order,
                "title": "beds",
            }
        },
        "spec": {
            "width": 240,
            "height": 300,
            "layer": trend_layers(COL_BATHS, &baths_order),
        },
        "resolve": { "scale": { "y": "shared" } },
    })
}

fn trend_layers(color_field: &str, color_order: &[String]) -> Value {
    let x = json!({ "field": COL_SOLD_YEAR, "type": "ordinal", "title": "sold year" });
    let color = json!({ "field": color_field, "type": "nominal", "sort": color_order });

    json!([
        {
            "mark": { "type": "line", "point": true },
            "encoding": {
                "x": x,
                "y": { "field": COL_PPSF_AVG, "type": "quantitative", "title": "$ / sq ft" },
                "color": color,
                "tooltip": [
                    { "field": COL_SOLD_YEAR },
                    { "field": color_field },
                    { "field": COL_N, "type": "quantitative" },
                    { "field": COL_PPSF_AVG, "type": "quantitative", "format": ".2f" },
                ],
            }
        },
        {
            "mark": { "type": "errorbar", "ticks": true },
            "encoding": {
                "x": x,
                "y": { "field": COL_LB, "type": "quantitative" },
                "y2": { "field": COL_UB },
                "color": color,
            }
        },
        {
            "mark": { "type": "text", "dy": -10 },
            "encoding": {
                "x": x,
                "y": { "field": COL_PPSF_AVG, "type": "quantitative" },
                "text": { "field": COL_N, "type": "quantitative" },
                "color": color,
            }
        }
    ])
}

/// Distinct labels in numeric category order
fn category_order<'a>(categories: impl Iterator<Item = &'a Category>) -> Vec<String> {
    categories
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|c| c.label().to_string())
        .collect()
}

pub fn write_chart(path: &Path, chart: &Value) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(chart)?)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::aggregate::PpsfStats;

    fn stats(n: usize, avg: f64) -> PpsfStats {
        PpsfStats {
            n,
            ppsf_avg: avg,
            lb: avg - 10.0,
            ub: avg + 10.0,
        }
    }

    #[test]
    fn test_year_beds_chart_layers_and_order() {
        let rows = vec![
            YearBedsSummary {
                sold_year: 2020,
                beds: Category::new("10"),
                stats: stats(1, 300.0),
            },
            YearBedsSummary {
                sold_year: 2020,
                beds: Category::new("3"),
                stats: stats(2, 242.31),
            },
            YearBedsSummary {
                sold_year: 2021,
                beds: Category::unknown(),
                stats: stats(1, 200.0),
            },
        ];
        let chart = year_beds_chart(&rows);

        assert_eq!(chart["$schema"], VEGA_LITE_SCHEMA);
        assert_eq!(chart["data"]["values"].as_array().unwrap().len(), 3);
        assert_eq!(chart["data"]["values"][1][COL_N], 2);

        let layers = chart["layer"].as_array().unwrap();
        let marks: Vec<&str> = layers
            .iter()
            .map(|l| l["mark"]["type"].as_str().unwrap())
            .collect();
        assert_eq!(marks, vec!["line", "errorbar", "text"]);
        assert_eq!(layers[1]["encoding"]["y2"]["field"], COL_UB);
        assert_eq!(layers[0]["encoding"]["color"]["sort"], json!(["3", "10", "UNKNOWN"]));
    }

    #[test]
    fn test_year_beds_baths_chart_facets_by_beds() {
        let rows = vec![
            YearBedsBathsSummary {
                sold_year: 2021,
                beds: Category::new("3"),
                baths: Category::new("2.5"),
                nyr: 2,
                stats: stats(4, 410.0),
            },
            YearBedsBathsSummary {
                sold_year: 2021,
                beds: Category::new("2"),
                baths: Category::new("1"),
                nyr: 2,
                stats: stats(3, 390.0),
            },
        ];
        let chart = year_beds_baths_chart(&rows);

        assert_eq!(chart["facet"]["column"]["field"], COL_BEDS);
        assert_eq!(chart["facet"]["column"]["sort"], json!(["2", "3"]));
        assert_eq!(
            chart["spec"]["layer"][0]["encoding"]["color"]["field"],
            COL_BATHS
        );
    }

    #[test]
    fn test_write_chart_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_chart(&dir.path().join(CHART_YEAR_BEDS_FILE), &year_beds_chart(&[])).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["data"]["values"], json!([]));
    }
}
