//! Coordination library server (spec §4.4): a long-lived TCP RPC server,
//! one per run, brokering locks, shared values, and value sets across
//! subprocesses.

use crate::resourcefile::load_value_sets;
use crate::rpc::{self, KeywordResult, RunKeywordRequest};
use crate::sharedlib::SharedLibraryRegistry;
use crate::state::CoordinationState;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct CoordinationServer {
    pub state: Arc<CoordinationState>,
    pub local_addr: SocketAddr,
    stopping: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
    shared_libraries: Arc<SharedLibraryRegistry>,
}

impl CoordinationServer {
    /// Starts the server. `host:port` of `0` selects a free port
    /// automatically; a busy user-supplied port also falls back to an
    /// OS-assigned free one (spec §4.4).
    pub async fn start(host: &str, port: u16, resourcefile: Option<&Path>) -> std::io::Result<Self> {
        let value_sets = resourcefile.map(load_value_sets).unwrap_or_default();
        let state = Arc::new(CoordinationState::new(value_sets));
        let stopping = Arc::new(AtomicBool::new(false));
        let shared_libraries = Arc::new(SharedLibraryRegistry::new(host.to_string()));

        let listener = bind_with_fallback(host, port)?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        let tokio_listener = tokio::net::TcpListener::from_std(listener)?;

        let app = build_router(state.clone(), stopping.clone(), shared_libraries.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(tokio_listener, app).await {
                tracing::error!("coordination server exited with error: {}", e);
            }
        });

        tracing::info!("coordination server listening on {}", local_addr);
        Ok(Self { state, local_addr, stopping, handle: Some(handle), shared_libraries })
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// `import_shared_library` (spec §4.4): returns the port of the
    /// nested server hosting `name`, spawning one the first time it's
    /// asked for and reusing it on every later call.
    pub async fn import_shared_library(&self, name: &str) -> std::io::Result<SocketAddr> {
        self.shared_libraries.import(name).await
    }

    /// Orderly shutdown (`stop_remote_server`, spec §4.4). The server's
    /// own task is aborted; callers then proceed to teardown.
    pub async fn shutdown(mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shared_libraries.stop_all().await;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn bind_with_fallback(host: &str, port: u16) -> std::io::Result<TcpListener> {
    if port != 0 {
        if let Ok(listener) = TcpListener::bind((host, port)) {
            return Ok(listener);
        }
        tracing::warn!("port {} busy, selecting a free port", port);
    }
    TcpListener::bind((host, 0))
}

fn build_router(state: Arc<CoordinationState>, stopping: Arc<AtomicBool>, shared_libraries: Arc<SharedLibraryRegistry>) -> Router {
    Router::new()
        .route("/RPC2/run_keyword", post(run_keyword))
        .route("/RPC2/get_keyword_names", get(get_keyword_names))
        .route("/RPC2/get_keyword_arguments", post(get_keyword_arguments))
        .route("/RPC2/get_keyword_documentation", post(get_keyword_documentation))
        .route("/RPC2/stop_remote_server", post(stop_remote_server))
        .with_state((state, stopping, shared_libraries))
}

type AppState = (Arc<CoordinationState>, Arc<AtomicBool>, Arc<SharedLibraryRegistry>);

/// `import_shared_library` and `stop_remote_libraries` need the nested
/// server registry, not just `CoordinationState`, so they're handled
/// here before falling through to the generic `rpc::dispatch` table
/// (spec §4.4).
async fn run_keyword(
    State((state, _stopping, shared_libraries)): State<AppState>,
    Json(req): Json<RunKeywordRequest>,
) -> Json<KeywordResult> {
    match req.name.as_str() {
        "import_shared_library" => {
            let name = match req.args.first().and_then(Value::as_str) {
                Some(n) => n.to_string(),
                None => return Json(KeywordResult::fail("argument 0 missing")),
            };
            match shared_libraries.import(&name).await {
                Ok(addr) => Json(KeywordResult::pass(Value::from(addr.port()))),
                Err(e) => Json(KeywordResult::fail(e.to_string())),
            }
        }
        "stop_remote_libraries" => {
            shared_libraries.stop_all().await;
            Json(KeywordResult::pass(Value::Null))
        }
        _ => Json(rpc::dispatch(&state, req)),
    }
}

async fn get_keyword_names(State(_): State<AppState>) -> Json<Value> {
    Json(serde_json::json!(rpc::KEYWORD_NAMES))
}

async fn get_keyword_arguments(State(_): State<AppState>, Json(name): Json<String>) -> Json<Value> {
    Json(serde_json::json!(rpc::keyword_arguments(&name)))
}

async fn get_keyword_documentation(State(_): State<AppState>, Json(name): Json<String>) -> Json<Value> {
    Json(Value::String(rpc::keyword_documentation(&name).to_string()))
}

async fn stop_remote_server(State((_, stopping, shared_libraries)): State<AppState>) -> Json<Value> {
    stopping.store(true, Ordering::SeqCst);
    shared_libraries.stop_all().await;
    Json(Value::Bool(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_to_a_free_port_when_requested() {
        let server = CoordinationServer::start("127.0.0.1", 0, None).await.unwrap();
        assert_ne!(server.local_addr.port(), 0);
        server.shutdown().await;
    }
}
