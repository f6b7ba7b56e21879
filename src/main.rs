//! Command-line entry point. Subcommand surface and the tracing-subscriber
//! bootstrap follow `main.rs`'s `Cli`/`Commands` clap-derive shape in the
//! reference server; `start` owns the long-lived daemon process while the
//! other subcommands are thin RPC clients against its socket (§6).

use clap::{Parser, Subcommand};
use coderadar::config::Config;
use coderadar::daemon::{run, Daemon};
use coderadar::embedder::Embedder;
use coderadar::ignore_engine::IgnoreEngine;
use coderadar::indexer::{Indexer, TextEmbedder};
use coderadar::registry::Registry;
use coderadar::search::SearchService;
use coderadar::types::ProjectMetadata;
use coderadar::vector_store::VectorStore;
use coderadar::watcher::{start_watcher, LastRpcActivity};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::RwLock;

#[derive(Parser)]
#[command(name = "coderadar", version, about = "Per-project code search daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Workspace root to operate on; defaults to the current directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Project name, used on first index to claim a stable identity.
    #[arg(long, global = true, default_value = "default")]
    name: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon for the current workspace (foreground).
    Start,
    /// Request a graceful shutdown of the running daemon.
    Stop,
    /// Print indexing state and progress.
    Status,
    /// Print project metadata.
    Info,
    /// List registered projects.
    Ls {
        #[arg(long)]
        long: bool,
    },
    /// Build or refresh the index.
    Index {
        #[arg(long)]
        force: bool,
    },
    /// Run a search query.
    Search {
        query: String,
        #[arg(long, default_value = "auto")]
        mode: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Print the effective default ignore patterns.
    Exclusions,
    /// Remove a registered project by name glob.
    Rm { project_glob: String },
}

fn workspace_root(cli: &Cli) -> PathBuf {
    cli.root.clone().unwrap_or_else(|| std::env::current_dir().expect("cwd"))
}

fn data_base_dir() -> PathBuf {
    dirs_data_dir().join("coderadar")
}

fn dirs_data_dir() -> PathBuf {
    std::env::var("CODERADAR_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("coderadar-data"))
}

fn socket_path(pid: &str) -> PathBuf {
    std::env::temp_dir().join(format!("coderadar-{pid}.sock"))
}

async fn send_request(pid: &str, op: &str, args: serde_json::Value) -> coderadar::error::Result<serde_json::Value> {
    let path = socket_path(pid);
    let mut stream = UnixStream::connect(&path).await.map_err(|e| {
        coderadar::error::Error::NotReady(format!("daemon not reachable at {}: {e}", path.display()))
    })?;

    let req = serde_json::json!({"id": 1, "op": op, "args": args});
    let body = serde_json::to_vec(&req).unwrap();
    stream.write_all(&(body.len() as u32).to_be_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut resp_buf = vec![0u8; len];
    stream.read_exact(&mut resp_buf).await?;
    let resp: serde_json::Value = serde_json::from_slice(&resp_buf)
        .map_err(|e| coderadar::error::Error::InvalidRequest(e.to_string()))?;
    Ok(resp)
}

async fn start_daemon(root: PathBuf, project_name: String) -> coderadar::error::Result<()> {
    let config = Config::load(&root)?;
    let registry = Registry::new(data_base_dir())?;
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
    let (metadata, moved) = registry.resolve("local", &root, &project_name, now)?;
    let pid = metadata.pid.clone();

    let project_dir = registry.project_dir(&pid);
    let ignore = Arc::new(IgnoreEngine::new(&root, &config.skip_dirs));
    let store = Arc::new(VectorStore::open(&project_dir, config.hnsw.construction_ef, config.hnsw.m)?);
    if moved {
        tracing::warn!(pid = %pid, "workspace path changed for this project id; clearing index");
        store.clear_all()?;
    }

    let indexer = Arc::new(Indexer::new(root.clone(), config.clone(), Arc::clone(&ignore), Arc::clone(&store)));

    let embedder: Arc<dyn TextEmbedder> = match Embedder::load(&metadata.embedder_model_tag, &data_base_dir().join("models"), config.network_enabled) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::warn!(error = %e, "semantic embedding unavailable; regex search still works");
            Arc::new(UnavailableEmbedder)
        }
    };
    indexer.set_embedder(Arc::clone(&embedder));

    let search = Arc::new(SearchService::new(
        root.clone(),
        Arc::clone(&store),
        embedder,
        config.search.clone(),
        config.path_map.clone(),
    ));
    let metadata = Arc::new(RwLock::new(metadata));
    let activity = Arc::new(LastRpcActivity::new());

    let _watcher_handle = start_watcher(root.clone(), Arc::clone(&indexer), Arc::clone(&ignore), Arc::clone(&metadata), Arc::clone(&activity), config.watcher.clone());

    {
        let mut meta = metadata.write().await;
        indexer.index_once(false, &mut meta, now)?;
        registry.save_metadata(&meta)?;
    }

    spawn_periodic_reconcile(Arc::clone(&indexer), Arc::clone(&metadata), config.reconcile.period_seconds);

    let (shutdown_tx, _) = tokio::sync::watch::channel(false);
    let daemon = Arc::new(Daemon { indexer, search, metadata, activity, shutdown: shutdown_tx });

    let path = socket_path(&pid);
    run(&path, daemon).await
}

/// §4.9: "every ~15 minutes while the daemon is active" — a background
/// sweep independent of the watcher's ignore-triggered reconcile.
fn spawn_periodic_reconcile(indexer: Arc<Indexer>, metadata: Arc<RwLock<ProjectMetadata>>, period_seconds: u64) {
    let period = Duration::from_secs(period_seconds.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick fires immediately; the initial index_once already covered that pass
        loop {
            interval.tick().await;
            let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
            let mut meta = metadata.write().await;
            if let Err(e) = indexer.reconcile(&mut meta, now) {
                tracing::warn!(error = %e, "periodic reconcile failed");
            }
        }
    });
}

struct UnavailableEmbedder;
impl TextEmbedder for UnavailableEmbedder {
    fn dim(&self) -> usize {
        0
    }
    fn embed(&self, _texts: &[String]) -> coderadar::error::Result<Vec<Vec<f32>>> {
        Err(coderadar::error::Error::ModelUnavailable("no embedding model loaded".into()))
    }
    fn is_available(&self) -> bool {
        false
    }
}

fn print_response(resp: serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(&resp).unwrap_or_default());
}

fn pid_for(root: &std::path::Path, project_name: &str) -> coderadar::error::Result<String> {
    let registry = Registry::new(data_base_dir())?;
    let now = 0;
    let (meta, _) = registry.resolve("local", root, project_name, now)?;
    Ok(meta.pid)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("coderadar=info".parse().unwrap()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let root = workspace_root(&cli);

    let result: coderadar::error::Result<()> = async {
        match cli.command.unwrap_or(Commands::Start) {
            Commands::Start => start_daemon(root, cli.name).await,
            Commands::Stop => {
                let pid = pid_for(&root, &cli.name)?;
                print_response(send_request(&pid, "stop", serde_json::json!({})).await?);
                Ok(())
            }
            Commands::Status => {
                let pid = pid_for(&root, &cli.name)?;
                print_response(send_request(&pid, "status", serde_json::json!({})).await?);
                Ok(())
            }
            Commands::Info => {
                let pid = pid_for(&root, &cli.name)?;
                print_response(send_request(&pid, "info", serde_json::json!({})).await?);
                Ok(())
            }
            Commands::Ls { long: _ } => {
                let registry = Registry::new(data_base_dir())?;
                for project in registry.list()? {
                    println!("{}\t{}", project.project_name, project.workspace_path);
                }
                Ok(())
            }
            Commands::Index { force } => {
                let pid = pid_for(&root, &cli.name)?;
                print_response(send_request(&pid, "index", serde_json::json!({"force": force})).await?);
                Ok(())
            }
            Commands::Search { query, mode, limit, threshold } => {
                let pid = pid_for(&root, &cli.name)?;
                let args = serde_json::json!({"query": query, "mode": mode, "limit": limit, "similarity_threshold": threshold});
                print_response(send_request(&pid, "search", args).await?);
                Ok(())
            }
            Commands::Exclusions => {
                let config = Config::default();
                for dir in &config.skip_dirs {
                    println!("{dir}/");
                }
                Ok(())
            }
            Commands::Rm { project_glob } => {
                let registry = Registry::new(data_base_dir())?;
                for project in registry.list()? {
                    if project.project_name == project_glob {
                        registry.remove(&project.pid)?;
                    }
                }
                Ok(())
            }
        }
    }
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}
