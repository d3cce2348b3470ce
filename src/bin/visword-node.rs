//! visword node
//!
//! Serves one side of the query path over TCP:
//!
//! - `--role words`: `onFeature` (descriptors -> word ids) over a lazily
//!   rebuilt visual-word index
//! - `--role signatures`: `onWord` (word ids -> ranked signatures)
//!
//! ## Usage
//!
//! ```bash
//! visword-node --role words --listen 127.0.0.1:7401 --snapshot vocab.json
//! visword-node --role signatures --listen 127.0.0.1:7402 --snapshot vocab.json --top-k 5
//! ```

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use visword::rpc::{RpcServer, SignatureService, WordService};
use visword::{NodeConfig, VocabularySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Words,
    Signatures,
}

/// visword RPC node
#[derive(Parser, Debug)]
#[command(name = "visword-node")]
#[command(about = "Serve visual-word or signature lookups over TCP")]
#[command(version)]
struct Args {
    /// Which service to run
    #[arg(long, value_enum)]
    role: Role,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7401")]
    listen: String,

    /// Vocabulary snapshot (JSON)
    #[arg(long)]
    snapshot: String,

    /// Optional JSON config overriding defaults
    #[arg(long)]
    config: Option<String>,

    /// Signature candidates per request (overrides the config file)
    #[arg(long)]
    top_k: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(top_k) = args.top_k {
        config.pipeline.top_k = top_k;
    }

    let snapshot = VocabularySnapshot::load(&args.snapshot)?;
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
        }
    };

    tracing::info!(role = ?args.role, listen = %args.listen, version = env!("CARGO_PKG_VERSION"), "starting visword node");
    match args.role {
        Role::Words => {
            let index = snapshot.into_visual_index(config.strategy.clone(), config.rebuild.clone())?;
            tracing::info!(words = index.len(), "word index ready");
            let server = RpcServer::bind(&args.listen, WordService::new(index), config.rpc.clone()).await?;
            server.serve(shutdown).await?;
        }
        Role::Signatures => {
            let index = snapshot.into_signature_index(config.strategy.clone())?;
            tracing::info!(
                words = index.len(),
                signatures = index.signature_count(),
                top_k = config.pipeline.top_k,
                "signature index ready"
            );
            let service = SignatureService::new(index, config.pipeline.top_k);
            let server = RpcServer::bind(&args.listen, service, config.rpc.clone()).await?;
            server.serve(shutdown).await?;
        }
    }
    Ok(())
}
