//! semstore server and command-line tool.
//!
//! Without a subcommand the binary serves the HTTP API. The `write` and
//! `query` subcommands run one operation against the data directory and print
//! a JSON envelope on stdout:
//!
//! ```text
//! {"status": "success", "message": "...", "id": "..."}
//! {"status": "success", "results": [...]}
//! {"status": "error", "message": "..."}
//! ```
//!
//! The process exits nonzero when the envelope reports an error. Logs go to
//! stderr.

mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use semstore_core::{
    BootstrapMode, DistanceMetric, EmbedderConfig, Error, Metadata, NewDocument, QueryRequest,
    RemoteEmbedderConfig, Store, StoreConfig, DEFAULT_COLLECTION, DEFAULT_DIMENSION,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmbedderBackend {
    /// Local feature-hashing model
    Hashing,
    /// Ollama `/api/embeddings`
    Ollama,
    /// OpenAI-compatible `/embeddings`
    Openai,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Bootstrap {
    Declared,
    SeedAndPurge,
}

#[derive(Parser)]
#[command(name = "semstore-server", about = "HTTP front end and CLI for a semstore data directory")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Storage root; one sub-directory per collection
    #[arg(long, global = true, env = "SEMSTORE_DATA", default_value = "./semstore-data")]
    data: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Collection used when a request names none
    #[arg(long, default_value = DEFAULT_COLLECTION)]
    default_collection: String,

    /// Distance metric for new collections (euclidean, cosine, dot)
    #[arg(long, global = true, default_value = "cosine")]
    metric: DistanceMetric,

    /// Embedding backend
    #[arg(long, global = true, value_enum, env = "SEMSTORE_EMBED_API", default_value = "hashing")]
    embedder: EmbedderBackend,

    /// Embedding dimensionality
    #[arg(long, global = true, env = "SEMSTORE_EMBED_DIM", default_value_t = DEFAULT_DIMENSION)]
    dimension: usize,

    /// Model name for remote backends
    #[arg(long, global = true, env = "SEMSTORE_EMBED_MODEL")]
    embed_model: Option<String>,

    /// Endpoint override for remote backends
    #[arg(long, global = true, env = "SEMSTORE_EMBED_ENDPOINT")]
    embed_endpoint: Option<String>,

    /// API key for the OpenAI-compatible backend
    #[arg(long, global = true, env = "SEMSTORE_EMBED_API_KEY", hide_env_values = true)]
    embed_api_key: Option<String>,

    /// Per-operation timeout in seconds (0 disables)
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    /// Schema bootstrap protocol for new collections
    #[arg(long, global = true, value_enum, default_value = "declared")]
    bootstrap: Bootstrap,
}

#[derive(Subcommand)]
enum Command {
    /// Embed and store one document
    Write(WriteArgs),
    /// Semantic search over one collection
    Query(QueryArgs),
}

#[derive(clap::Args)]
struct WriteArgs {
    /// Target collection, created if missing
    #[arg(long)]
    collection: String,

    /// Document text
    #[arg(long)]
    text: String,

    /// JSON object of scalar metadata values
    #[arg(long)]
    metadata: Option<String>,

    /// Document id (a UUID is generated when omitted)
    #[arg(long)]
    id: Option<String>,
}

#[derive(clap::Args)]
struct QueryArgs {
    #[arg(long)]
    collection: String,

    /// Text to search for
    #[arg(long)]
    query: String,

    #[arg(long, default_value_t = 5)]
    n_results: usize,

    /// Predicate narrowing the candidates
    #[arg(long)]
    filter: Option<String>,
}

impl Args {
    fn embedder_config(&self) -> semstore_core::Result<EmbedderConfig> {
        let model = || {
            self.embed_model.clone().ok_or_else(|| {
                semstore_core::Error::Configuration(
                    "--embed-model (or SEMSTORE_EMBED_MODEL) is required for remote embedders".into(),
                )
            })
        };
        let mut remote = match self.embedder {
            EmbedderBackend::Hashing => return Ok(EmbedderConfig::hashing(self.dimension)),
            EmbedderBackend::Ollama => RemoteEmbedderConfig::ollama(model()?, self.dimension),
            EmbedderBackend::Openai => RemoteEmbedderConfig::openai(
                self.embed_api_key.clone().unwrap_or_default(),
                model()?,
                self.dimension,
            ),
        };
        if let Some(endpoint) = &self.embed_endpoint {
            remote = remote.with_endpoint(endpoint.clone());
        }
        Ok(EmbedderConfig::Remote(remote))
    }

    fn store_config(&self) -> semstore_core::Result<StoreConfig> {
        let timeout = (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs));
        let bootstrap = match self.bootstrap {
            Bootstrap::Declared => BootstrapMode::Declared,
            Bootstrap::SeedAndPurge => BootstrapMode::SeedAndPurge,
        };
        Ok(StoreConfig::new(&self.data)
            .with_default_collection(self.default_collection.clone())
            .with_metric(self.metric)
            .with_bootstrap(bootstrap)
            .with_operation_timeout(timeout)
            .with_embedder(self.embedder_config()?))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    let default_level = if args.command.is_some() { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match &args.command {
        Some(command) => {
            let (envelope, ok) = run_command(&args, command).await;
            println!("{}", envelope);
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        None => {
            serve(&args).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(Store::open(args.store_config()?).await?);
    let app = api::router(Arc::clone(&store));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.flush_all().await?;
    tracing::info!("shut down cleanly");
    Ok(())
}

/// Runs one subcommand and renders its outcome as a status envelope. The
/// flag is false when the envelope reports an error.
async fn run_command(args: &Args, command: &Command) -> (Value, bool) {
    match execute(args, command).await {
        Ok(envelope) => (envelope, true),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            (json!({ "status": "error", "message": e.to_string() }), false)
        }
    }
}

async fn execute(args: &Args, command: &Command) -> semstore_core::Result<Value> {
    let store = Store::open(args.store_config()?).await?;
    let envelope = match command {
        Command::Write(write) => {
            let mut document = NewDocument::new(write.text.clone());
            if let Some(raw) = &write.metadata {
                document = document.with_metadata(parse_metadata(raw)?);
            }
            if let Some(id) = &write.id {
                document = document.with_id(id.clone());
            }
            let id = store.write(&write.collection, document).await?;
            json!({
                "status": "success",
                "message": format!("Successfully wrote document {} to collection '{}'", id, write.collection),
                "id": id,
            })
        }
        Command::Query(query) => {
            let mut request = QueryRequest::semantic(query.query.clone())
                .in_collection(query.collection.clone())
                .with_limit(query.n_results);
            if let Some(filter) = &query.filter {
                request = request.with_filter(filter.clone());
            }
            let hits = store.query(request).await?;
            json!({ "status": "success", "results": hits })
        }
    };
    store.flush_all().await?;
    Ok(envelope)
}

fn parse_metadata(raw: &str) -> semstore_core::Result<Metadata> {
    serde_json::from_str(raw).map_err(|e| {
        Error::InvalidInput(format!(
            "--metadata must be a JSON object of scalar values: {}",
            e
        ))
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["semstore-server"]);
        let config = args.store_config().unwrap();
        assert_eq!(config.default_collection, "default");
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert_eq!(config.embedder, EmbedderConfig::hashing(384));
        assert_eq!(config.operation_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_remote_requires_model() {
        let args = Args::parse_from(["semstore-server", "--embedder", "ollama", "--dimension", "768"]);
        if args.embed_model.is_none() {
            assert!(args.store_config().is_err());
        }
    }

    #[test]
    fn test_timeout_zero_disables() {
        let args = Args::parse_from(["semstore-server", "--timeout-secs", "0", "--metric", "dot"]);
        let config = args.store_config().unwrap();
        assert_eq!(config.operation_timeout, None);
        assert_eq!(config.metric, DistanceMetric::DotProduct);
    }

    fn cli(dir: &std::path::Path, rest: &[&str]) -> Args {
        let data = dir.to_string_lossy().into_owned();
        let mut argv = vec!["semstore-server", "--dimension", "32"];
        argv.extend_from_slice(rest);
        argv.extend_from_slice(&["--data", &data]);
        Args::parse_from(argv)
    }

    #[test]
    fn test_subcommand_flags() {
        let args = Args::parse_from([
            "semstore-server",
            "query",
            "--collection",
            "news",
            "--query",
            "rate cut",
            "--n-results",
            "3",
        ]);
        match args.command {
            Some(Command::Query(query)) => {
                assert_eq!(query.collection, "news");
                assert_eq!(query.query, "rate cut");
                assert_eq!(query.n_results, 3);
            }
            _ => panic!("expected query subcommand"),
        }
        assert!(Args::try_parse_from(["semstore-server", "write", "--collection", "c"]).is_err());
    }

    #[tokio::test]
    async fn test_write_then_query_envelopes() {
        let dir = tempfile::tempdir().unwrap();
        let args = cli(
            dir.path(),
            &[
                "write",
                "--collection",
                "profiles",
                "--text",
                "Apple Inc designs consumer electronics",
                "--metadata",
                r#"{"symbol": "AAPL", "data_type": "profile"}"#,
            ],
        );
        let (envelope, ok) = run_command(&args, args.command.as_ref().unwrap()).await;
        assert!(ok);
        assert_eq!(envelope["status"], "success");
        let id = envelope["id"].as_str().unwrap().to_string();
        assert!(envelope["message"].as_str().unwrap().contains("'profiles'"));

        let args = cli(
            dir.path(),
            &["query", "--collection", "profiles", "--query", "consumer electronics"],
        );
        let (envelope, ok) = run_command(&args, args.command.as_ref().unwrap()).await;
        assert!(ok);
        assert_eq!(envelope["status"], "success");
        let results = envelope["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["id"], id.as_str());
        assert_eq!(results[0]["metadata"]["symbol"], "AAPL");
    }

    #[tokio::test]
    async fn test_command_errors_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let args = cli(
            dir.path(),
            &["write", "--collection", "c", "--text", "hello", "--metadata", "[1, 2]"],
        );
        let (envelope, ok) = run_command(&args, args.command.as_ref().unwrap()).await;
        assert!(!ok);
        assert_eq!(envelope["status"], "error");
        assert!(envelope["message"].as_str().unwrap().contains("--metadata"));

        let args = cli(
            dir.path(),
            &["query", "--collection", "c", "--query", "x", "--n-results", "0"],
        );
        let (envelope, ok) = run_command(&args, args.command.as_ref().unwrap()).await;
        assert!(!ok);
        assert_eq!(envelope["status"], "error");
    }
}
