//! featureserver CLI
//!
//! Loads providers from a YAML configuration and answers a single request,
//! printing the JSON payload to stdout.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;

use featureserver::{
    cache::MemoryCache,
    config::Config,
    core::{CacheBackend, FeatureServerResult, ProviderRegistry, ProviderRequest},
    logging::Logger,
    model::QueryParameters,
    query::QueryDispatcher,
};

#[derive(Debug, Parser)]
#[command(name = "featureserver")]
#[command(about = "Query GeoServices feature layers from configured providers", long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "conf/featureserver.yaml")]
    conf: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a feature query against a provider
    Query {
        /// Provider namespace
        provider: String,
        /// Query string, e.g. "returnCountOnly=true&f=json"
        #[arg(default_value = "")]
        query: String,
        /// Layer index
        #[arg(short, long, default_value = "0")]
        layer: String,
    },
    /// Print a provider's layer description
    Layer {
        provider: String,
        #[arg(short, long, default_value = "0")]
        layer: String,
    },
    /// Print a provider's catalog
    Catalog { provider: String },
    /// List registered providers
    Providers,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load_from_yaml(&cli.conf) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let log_task = match config.log.clone() {
        Some(log) => {
            let logger = Logger::new(log);
            logger.init_env_logger();
            Some(tokio::spawn(logger.run(shutdown_rx)))
        }
        None => {
            env_logger::init();
            None
        }
    };

    let result = execute(&config, cli.command).await;

    let _ = shutdown_tx.send(true);
    if let Some(task) = log_task {
        if let Ok(Err(e)) = task.await {
            eprintln!("Error: {e}");
        }
    }

    match result {
        Ok(body) => println!("{body}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn execute(config: &Config, command: Commands) -> FeatureServerResult<String> {
    let cache: Arc<dyn CacheBackend> = match config.cache.max_entries {
        Some(max) => Arc::new(MemoryCache::with_max_entries(max)),
        None => Arc::new(MemoryCache::new()),
    };
    let registry = ProviderRegistry::new();

    log::info!("Loading providers...");
    registry.load_static_providers(config, cache)?;

    let body = match command {
        Commands::Query {
            provider,
            query,
            layer,
        } => {
            let req = ProviderRequest::new(&format!("/{provider}/FeatureServer/{layer}/query?{query}"))?
                .with_param("layer", layer);
            let dataset = registry.get(&provider)?.fetch_features(&req).await?;
            let params = QueryParameters::from_query(&req.query)?;
            QueryDispatcher::default().resolve(&dataset, &params)?.to_json()?
        }
        Commands::Layer { provider, layer } => {
            let req = ProviderRequest::new(&format!("/{provider}/FeatureServer/{layer}"))?
                .with_param("layer", layer);
            registry.get(&provider)?.fetch_layer(&req).await?
        }
        Commands::Catalog { provider } => {
            let req = ProviderRequest::new(&format!("/{provider}/FeatureServer"))?;
            registry.get(&provider)?.fetch_catalog(&req).await?
        }
        Commands::Providers => serde_json::to_value(registry.namespaces())?,
    };

    Ok(serde_json::to_string_pretty(&body)?)
}
