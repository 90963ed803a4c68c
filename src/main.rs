use anyhow::Context;
use clap::{Parser, Subcommand};
use ppsf_trends::apis::redfin::RedfinSource;
use ppsf_trends::config::{non_empty_env, Config};
use ppsf_trends::infra::http_client::ReqwestHttp;
use ppsf_trends::pipeline::{export, Pipeline, PipelineResult};
use ppsf_trends::{logging, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ppsf_trends")]
#[command(about = "Price-per-square-foot trends for recently sold homes")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every price bin, analyze, and export tables and charts
    Run,
    /// Fetch every price bin and export only the raw table
    Fetch,
    /// Analyze a previously exported raw table
    Analyze {
        /// Path to a raw.csv written by `fetch` or `run`
        #[arg(long)]
        input: PathBuf,
    },
}

fn redfin_source(config: &Config) -> RedfinSource {
    let http = Arc::new(ReqwestHttp::new(config.source.user_agent.clone()));
    RedfinSource::new(config.source.base_url.clone(), http)
}

fn print_summary(result: &PipelineResult) {
    let c = &result.counts;
    println!("\n📊 Pipeline results (run {}):", result.run_id);
    println!("   Fetched rows: {}", c.fetched);
    println!(
        "   Normalized: {} ({} duplicates, {} missing sold date, {} excluded type)",
        c.normalized, c.duplicates_removed, c.missing_sold_date, c.excluded_property_type
    );
    println!(
        "   Derived: {} ({} bad dates, {} missing price/area, {} non-positive price/area)",
        c.derived, c.unparseable_sold_date, c.missing_price_or_area, c.non_positive_price_or_area
    );
    println!("   Year x beds groups: {}", c.year_beds_groups);
    println!(
        "   Year x beds x baths groups: {} ({} of {} combinations dropped as sparse)",
        c.year_beds_baths_groups, c.sparse_combinations_dropped, c.combinations
    );
    println!("   Output: {}", result.output_dir.display());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();
    let metrics_handle = metrics::init_metrics();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let pipeline = Pipeline::new();

    let outcome = match cli.command {
        Commands::Run => {
            let source = redfin_source(&config);
            pipeline.run(&config, &source).await.context("run")
        }
        Commands::Fetch => {
            let source = redfin_source(&config);
            pipeline.fetch_only(&config, &source).await.context("fetch")
        }
        Commands::Analyze { input } => {
            let raw = export::read_table(&input)
                .with_context(|| format!("reading raw table {}", input.display()))?;
            info!("Loaded {} raw rows from {}", raw.len(), input.display());
            pipeline
                .run_offline(&raw, &input.display().to_string(), &config.output)
                .context("analyze")
        }
    };

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!("Pipeline failed: {:#}", e);
            return Err(e);
        }
    };
    print_summary(&result);

    if let (Some(handle), Some(base)) = (metrics_handle.as_ref(), non_empty_env("PPSF_PUSHGATEWAY_URL")) {
        metrics::push_to_gateway(handle, &base, &result.run_id.to_string()).await;
    }
    Ok(())
}
