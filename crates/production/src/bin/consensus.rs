//! Hybrid consensus CLI
//!
//! Routes batches of transactions through the classifier, the in-process
//! agreement cluster and the ordering path, printing one JSON result per line.

use anyhow::Context;
use clap::{Parser, Subcommand};
use hybrid_classifier::Classifier;
use hybrid_core::AcknowledgingExecutor;
use hybrid_production::{read_requests, HybridConfig};
use hybrid_types::{Argument, TransactionRequest};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hybrid-consensus")]
#[command(about = "Route transactions between agreement and ordering paths")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a batch of JSON-lines requests
    Run {
        /// Configuration file (TOML); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Request file, one JSON object per line; reads stdin when omitted
        #[arg(short, long)]
        requests: Option<PathBuf>,

        /// Let the engine's admission rules pick the path
        #[arg(long)]
        engine_admission: bool,

        /// Log filter used when RUST_LOG is unset
        #[arg(long, default_value = "info")]
        log_level: String,
    },

    /// Print the classification decision for one request
    Classify {
        /// Operation name
        operation: String,

        /// Operation arguments, in order
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// Monetary value attached to the request
        #[arg(long)]
        value: Option<f64>,

        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration as TOML
    DefaultConfig,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Results go to stdout; keep logs out of the way.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HybridConfig> {
    match path {
        Some(path) => HybridConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(HybridConfig::default()),
    }
}

fn load_requests(path: Option<&Path>) -> anyhow::Result<Vec<TransactionRequest>> {
    let requests = match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening requests file {}", path.display()))?;
            read_requests(BufReader::new(file))?
        }
        None => read_requests(io::stdin().lock())?,
    };
    Ok(requests)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            requests,
            engine_admission,
            log_level,
        } => {
            init_tracing(&log_level);

            let config = load_config(config.as_deref())?;
            let requests = load_requests(requests.as_deref())?;
            let router = config
                .router_builder(Arc::new(AcknowledgingExecutor))
                .build()
                .context("building router")?;

            info!(
                requests = requests.len(),
                replicas = config.network.replicas,
                engine_admission,
                "Routing batch"
            );

            for request in requests {
                let result = if engine_admission {
                    router.submit_with_engine_admission(request).await
                } else {
                    router.submit(request).await
                };
                println!("{}", serde_json::to_string(&result)?);
            }

            let metrics = router.metrics();
            info!(
                transactions = metrics.total_transactions,
                failures = metrics.total_failures,
                "Batch complete"
            );
            println!("{}", serde_json::to_string(&metrics)?);
        }

        Commands::Classify {
            operation,
            args,
            value,
            config,
        } => {
            // No tracing here; output goes to stdout.
            let config = load_config(config.as_deref())?;
            let arguments = args.into_iter().map(Argument::text).collect();
            let mut request = TransactionRequest::new(operation, arguments);
            if let Some(value) = value {
                request = request.with_value(value);
            }
            let decision = Classifier::new(config.classifier).classify(&request);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }

        Commands::DefaultConfig => {
            print!("{}", HybridConfig::default().to_toml_string()?);
        }
    }

    Ok(())
}
