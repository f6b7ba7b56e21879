//! Daemon/RPC Core (C13): long-lived per-workspace process serving
//! length-prefixed JSON requests over a Unix domain socket.
//!
//! The dispatch-by-method-string shape is adapted from
//! `mcp.rs::dispatch_jsonrpc`, but the framing and envelope are the custom
//! `{len:u32_be, body}` / `{id, op, args}` → `{id, ok, result|error}`
//! protocol in §6, not JSON-RPC/MCP: this daemon talks to one workspace at a
//! time over a local socket rather than line-delimited stdio.

use crate::error::Error;
use crate::indexer::Indexer;
use crate::search::SearchService;
use crate::types::{ProjectMetadata, SearchMode};
use crate::watcher::LastRpcActivity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::RwLock;

#[derive(Debug, Deserialize)]
struct Request {
    id: serde_json::Value,
    op: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct Response {
    id: serde_json::Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl Response {
    fn ok(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self { id, ok: true, result: Some(result), error: None }
    }
    fn err(id: serde_json::Value, e: Error) -> Self {
        Self { id, ok: false, result: None, error: Some(ErrorBody { code: e.code(), message: e.to_string() }) }
    }
}

pub struct Daemon {
    pub indexer: Arc<Indexer>,
    pub search: Arc<SearchService>,
    pub metadata: Arc<RwLock<ProjectMetadata>>,
    pub activity: Arc<LastRpcActivity>,
    pub shutdown: tokio::sync::watch::Sender<bool>,
}

impl Daemon {
    async fn handle_request(&self, req: Request) -> Response {
        self.activity.touch(now_secs());
        match req.op.as_str() {
            "search" => self.handle_search(req).await,
            "index" => self.handle_index(req).await,
            "status" => self.handle_status(req).await,
            "info" => self.handle_info(req).await,
            "ls" => self.handle_ls(req).await,
            "get_search_capabilities" => self.handle_get_search_capabilities(req).await,
            "stop" => {
                let _ = self.shutdown.send(true);
                Response::ok(req.id, serde_json::json!({"stopping": true}))
            }
            other => Response::err(req.id, Error::InvalidRequest(format!("unknown op: {other}"))),
        }
    }

    async fn handle_search(&self, req: Request) -> Response {
        let query = req.args.get("query").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let mode_str = req.args.get("mode").and_then(|v| v.as_str()).unwrap_or("auto");
        let limit = req.args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);
        let threshold = req.args.get("similarity_threshold").and_then(|v| v.as_f64()).map(|f| f as f32);

        let Some(mode) = SearchMode::parse(mode_str) else {
            return Response::err(req.id, Error::InvalidRequest(format!("unknown mode: {mode_str}")));
        };
        let routed = self.search.route(&query, mode);
        let is_building = self.indexer.state() == crate::types::IndexState::Building;

        let result = match routed {
            SearchMode::Regex => self.search.regex_search(&query, limit).await,
            _ => self.search.semantic_search(&query, limit, threshold, is_building),
        };

        match result {
            Ok(resp) => Response::ok(req.id, serde_json::to_value(resp).unwrap()),
            Err(e) => Response::err(req.id, e),
        }
    }

    async fn handle_index(&self, req: Request) -> Response {
        let force = req.args.get("force").and_then(|v| v.as_bool()).unwrap_or(false);
        let indexer = Arc::clone(&self.indexer);
        let metadata = Arc::clone(&self.metadata);
        let result = tokio::task::spawn_blocking(move || {
            let rt = tokio::runtime::Handle::current();
            let mut meta = rt.block_on(metadata.write());
            indexer.index_once(force, &mut meta, now_secs())
        })
        .await;

        match result {
            Ok(Ok(())) => Response::ok(req.id, serde_json::json!({"state": "ready"})),
            Ok(Err(e)) => Response::err(req.id, e),
            Err(e) => Response::err(req.id, Error::WorkerFailure(e.to_string())),
        }
    }

    async fn handle_status(&self, req: Request) -> Response {
        let (indexed, total) = self.indexer.progress();
        let state = self.indexer.state();
        Response::ok(
            req.id,
            serde_json::json!({"state": format!("{state:?}"), "files_indexed": indexed, "files_total": total}),
        )
    }

    async fn handle_info(&self, req: Request) -> Response {
        let meta = self.metadata.read().await;
        Response::ok(req.id, serde_json::to_value(&*meta).unwrap())
    }

    async fn handle_ls(&self, req: Request) -> Response {
        let meta = self.metadata.read().await;
        Response::ok(req.id, serde_json::json!([meta.project_name.clone()]))
    }

    /// §6's agent-mode tool schema: lets an agent check whether `semantic`
    /// mode will actually work (reflecting §7's `ModelUnavailable` state)
    /// before routing a query to it.
    async fn handle_get_search_capabilities(&self, req: Request) -> Response {
        let meta = self.metadata.read().await;
        Response::ok(
            req.id,
            serde_json::json!({
                "modes": ["auto", "semantic", "regex"],
                "languages": ["rust", "typescript", "javascript", "python", "go", "c", "cpp", "java"],
                "model_tag": meta.embedder_model_tag,
                "semantic": self.search.semantic_available(),
            }),
        )
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

async fn read_frame(stream: &mut UnixStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    if stream.read_exact(&mut len_buf).await.is_err() {
        return Ok(None);
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(Some(body))
}

async fn write_frame(stream: &mut UnixStream, body: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(body.len() as u32).to_be_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}

async fn handle_connection(mut stream: UnixStream, daemon: Arc<Daemon>) {
    // FIFO per connection (§5): requests on one socket are served in order.
    loop {
        let body = match read_frame(&mut stream).await {
            Ok(Some(b)) => b,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "connection read error");
                break;
            }
        };
        let response = match serde_json::from_slice::<Request>(&body) {
            Ok(req) => daemon.handle_request(req).await,
            Err(e) => Response::err(serde_json::Value::Null, Error::InvalidRequest(e.to_string())),
        };
        let encoded = serde_json::to_vec(&response).unwrap();
        if write_frame(&mut stream, &encoded).await.is_err() {
            break;
        }
    }
}

pub async fn run(socket_path: &std::path::Path, daemon: Arc<Daemon>) -> crate::error::Result<()> {
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!(path = %socket_path.display(), "daemon listening");

    let mut shutdown_rx = daemon.shutdown.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let daemon = Arc::clone(&daemon);
                tokio::spawn(handle_connection(stream, daemon));
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("daemon shutting down");
                    break;
                }
            }
        }
    }
    let _ = std::fs::remove_file(socket_path);
    Ok(())
}
