//! chronofacet CLI
//!
//! Runs date histogram facets over a dataset file:
//! - `run`: load the dataset, collect every configured facet, print results
//! - `config`: print or write a default configuration file

use anyhow::{bail, Context};
use chronofacet::config::{generate_default_config, Config, FacetConfig, LoggingConfig};
use chronofacet::facet::{FacetCollector, FacetResult};
use chronofacet::index::{load_dataset, InMemoryIndex};
use chronofacet::script::ExprScriptService;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chronofacet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Date histogram facets with counts and script totals")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect facets over a dataset
    Run {
        /// Config file (default: ~/.config/chronofacet/config.toml or ./chronofacet.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Dataset file (.json or .csv), overrides the config
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Facets to run by name (default: all)
        #[arg(long = "facet")]
        facets: Vec<String>,
        /// Collect segments on separate threads
        #[arg(long)]
        parallel: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            facets,
            parallel,
        } => {
            let config = match config {
                Some(path) => Config::load_with_env(&path)?,
                None => Config::load_default(),
            };
            init_logging(&config.logging);

            let data_path = data
                .or_else(|| config.data.path.as_ref().map(PathBuf::from))
                .context("No dataset given: pass --data or set [data] path")?;
            let parallel = parallel || config.data.parallel;

            let selected = select_facets(&config, &facets)?;

            let index = Arc::new(
                load_dataset(&data_path)
                    .with_context(|| format!("Failed to load dataset {:?}", data_path))?,
            );
            let scripts = ExprScriptService::new(index.clone());

            let mut results = Vec::with_capacity(selected.len());
            for facet in selected {
                let result = run_facet(facet, &index, &scripts, parallel)
                    .with_context(|| format!("Facet '{}' failed", facet.name))?;
                results.push(result);
            }

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&results)?),
                "csv" => print_csv(&results)?,
                _ => print_table(&results),
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("chronofacet={}", config.level).into());

    // Logs on stderr, results on stdout
    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn select_facets<'a>(config: &'a Config, names: &[String]) -> anyhow::Result<Vec<&'a FacetConfig>> {
    if config.facets.is_empty() {
        bail!("No facets configured: add a [[facet]] table to the config");
    }
    if names.is_empty() {
        return Ok(config.facets.iter().collect());
    }

    names
        .iter()
        .map(|name| {
            config
                .facet(name)
                .with_context(|| format!("Unknown facet '{}'", name))
        })
        .collect()
}

fn run_facet(
    facet: &FacetConfig,
    index: &Arc<InMemoryIndex>,
    scripts: &ExprScriptService,
    parallel: bool,
) -> anyhow::Result<FacetResult> {
    let started = std::time::Instant::now();

    let result = if parallel {
        let merged = index.collect_parallel(|| {
            FacetCollector::new(facet, index.as_ref(), index.clone(), scripts)
        })?;
        FacetResult::from_accumulator(&facet.name, facet.comparator, &merged)
    } else {
        let mut collector = FacetCollector::new(facet, index.as_ref(), index.clone(), scripts)?;
        index.collect(&mut collector)?;
        collector.finish()
    };

    tracing::info!(
        facet = %facet.name,
        buckets = result.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Facet collected"
    );
    Ok(result)
}

fn format_key(key: i64) -> String {
    chrono::DateTime::from_timestamp_millis(key)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| key.to_string())
}

fn print_table(results: &[FacetResult]) {
    for result in results {
        println!("{} (comparator: {})", result.name(), result.comparator());

        if result.is_empty() {
            println!("No data");
            println!();
            continue;
        }

        println!(
            "{:<26} | {:<10} | {:<14} | {:<14}",
            "Bucket", "Count", "Total", "Mean"
        );
        println!("{}", "-".repeat(73));

        for entry in result.entries() {
            println!(
                "{:<26} | {:<10} | {:<14.2} | {:<14.2}",
                format_key(entry.key),
                entry.count,
                entry.total,
                entry.mean()
            );
        }
        println!();
    }
}

fn print_csv(results: &[FacetResult]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(["facet", "key", "count", "total"])?;

    for result in results {
        for entry in result.entries() {
            writer.write_record([
                result.name().to_string(),
                entry.key.to_string(),
                entry.count.to_string(),
                entry.total.to_string(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}
