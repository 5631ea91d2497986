use anyhow::Context;
use clap::Parser;
use codesearch_core::{
    config::Config,
    corpus::Corpus,
    search::{init_search_metrics, SearchBackends, SearchRequest, SearchService},
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run a search request against a JSON corpus served by the in-memory index
/// and backend
#[derive(Debug, Parser)]
#[command(name = "codesearch", version, about)]
struct Cli {
    /// Corpus file describing indexed and unindexed repositories
    #[arg(long, env = "CODESEARCH_CORPUS")]
    corpus: PathBuf,

    /// Search request file; an empty `repos` list searches the whole corpus
    #[arg(long)]
    query: PathBuf,

    /// Configuration file layered over the built-in defaults
    #[arg(long, env = "CODESEARCH_CONFIG")]
    config: Option<String>,

    /// Print collected Prometheus metrics to stderr after the search
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing
    let level = &config.observability.log_level;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("codesearch_core={level},codesearch={level}").into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!("Starting codesearch v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Prometheus metrics
    let metrics_registry = Registry::new();
    if config.observability.prometheus_enabled {
        if let Err(e) = init_search_metrics(&metrics_registry) {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        }
    }

    let corpus = Corpus::load(&cli.corpus)
        .with_context(|| format!("loading corpus {}", cli.corpus.display()))?;
    let request_json = std::fs::read_to_string(&cli.query)
        .with_context(|| format!("reading query {}", cli.query.display()))?;
    let mut request: SearchRequest =
        serde_json::from_str(&request_json).context("parsing search request")?;
    if request.repos.is_empty() {
        request.repos = corpus.repos();
    }

    let (index, backend) = corpus.into_services();
    let service = SearchService::new(SearchBackends::new(
        index,
        backend.clone(),
        backend,
        config,
    ));

    let results = service.search(request).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);

    if cli.print_metrics {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metrics_registry.gather(), &mut buffer)?;
        eprintln!("{}", String::from_utf8_lossy(&buffer));
    }

    Ok(())
}
