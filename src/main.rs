//! Taxinomia server binary.
//!
//! Loads configuration, ingests the configured CSV datasets (or the
//! built-in demo dataset), and serves the table explorer.
//!
//! ```bash
//! # explore the demo dataset
//! taxinomia --demo
//!
//! # serve CSV files
//! taxinomia orders=data/orders.csv regions=data/regions.csv
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taxinomia::config::{Config, DatasetConfig};
use taxinomia::ingest::{load_csv_table, ImportOptions};
use taxinomia::model::DataModel;
use taxinomia::pipeline::Engine;
use taxinomia::server::{self, AllowAll, AppState};
use taxinomia::{demo, Table};

#[derive(Debug, Parser)]
#[command(name = "taxinomia", about = "Interactive table-oriented analytics engine")]
struct Args {
    /// Configuration file (defaults to taxinomia.toml + environment).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, overriding the configuration.
    #[arg(long)]
    addr: Option<String>,

    /// Load the built-in demo dataset.
    #[arg(long)]
    demo: bool,

    /// Datasets to serve, as NAME=CSV_PATH pairs.
    datasets: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load().unwrap_or_default(),
    };
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    init_tracing(&config);

    let mut model = DataModel::new();
    let mut loaded = 0usize;

    if args.demo || (args.datasets.is_empty() && config.dataset.is_empty()) {
        model.add_table(demo::orders_table()?)?;
        model.add_table(demo::regions_table()?)?;
        loaded += 2;
        info!("demo dataset loaded");
    }

    for dataset in &config.dataset {
        model.add_table(load_dataset(dataset)?)?;
        loaded += 1;
    }

    for spec in &args.datasets {
        let (name, path) = spec
            .split_once('=')
            .with_context(|| format!("dataset {spec:?} is not NAME=CSV_PATH"))?;
        let dataset = DatasetConfig {
            name: name.to_string(),
            csv: PathBuf::from(path),
            schema: None,
            domains: Vec::new(),
        };
        model.add_table(load_dataset(&dataset)?)?;
        loaded += 1;
    }

    info!(tables = loaded, joins = model.joins().len(), "data model ready");

    let state = AppState {
        engine: Arc::new(Engine::new(model)),
        users: Arc::new(AllowAll),
        config: Arc::new(config),
    };
    server::serve(state).await
}

fn load_dataset(dataset: &DatasetConfig) -> anyhow::Result<Table> {
    let options = match &dataset.schema {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading schema {}", path.display()))?;
            ImportOptions::from_toml(&text)?
        }
        None => ImportOptions::default(),
    };
    let mut table = load_csv_table(&dataset.name, &dataset.csv, &options)?;
    table.set_domains(dataset.domains.clone());
    Ok(table)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
