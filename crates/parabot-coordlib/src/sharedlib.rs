//! Shared-library hosting (spec §4.4 `import_shared_library` /
//! `stop_remote_libraries`): Robot Framework lets several test processes
//! share one instance of a stateful library by pointing every process at
//! the same nested remote-library server instead of each importing its
//! own. The coordination server plays broker: the first caller to name a
//! given library gets a freshly spawned nested RPC server and its port;
//! every later caller naming the same library is handed the same port
//! back, so all subprocesses talk to one shared instance.
//!
//! The library implementation itself is the subprocess runner's concern,
//! not ours (spec treats collaborators as opaque) — what this module
//! owns is the nested server's lifecycle: bind, track, and tear down on
//! `stop_remote_libraries`.

use axum::routing::post;
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

struct HostedLibrary {
    addr: SocketAddr,
    stopping: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

/// Tracks one nested server per imported library name, keyed by the name
/// passed to `import_shared_library`.
pub struct SharedLibraryRegistry {
    host: String,
    libraries: Mutex<HashMap<String, HostedLibrary>>,
}

impl SharedLibraryRegistry {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into(), libraries: Mutex::new(HashMap::new()) }
    }

    /// Returns the existing port for `name` if already imported,
    /// otherwise binds a fresh nested server and remembers it.
    pub async fn import(&self, name: &str) -> std::io::Result<SocketAddr> {
        let mut libraries = self.libraries.lock().await;
        if let Some(hosted) = libraries.get(name) {
            return Ok(hosted.addr);
        }
        let hosted = spawn_nested_server(&self.host).await?;
        let addr = hosted.addr;
        libraries.insert(name.to_string(), hosted);
        Ok(addr)
    }

    /// Stops every nested server and forgets them (`stop_remote_libraries`).
    pub async fn stop_all(&self) {
        let mut libraries = self.libraries.lock().await;
        for (_, hosted) in libraries.drain() {
            hosted.stopping.store(true, Ordering::SeqCst);
            hosted.handle.abort();
        }
    }
}

async fn spawn_nested_server(host: &str) -> std::io::Result<HostedLibrary> {
    let listener = TcpListener::bind((host, 0))?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;

    let stopping = Arc::new(AtomicBool::new(false));
    let app = Router::new().route("/RPC2/stop_remote_server", post(stop_remote_server));
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(tokio_listener, app).await {
            tracing::error!("shared library server exited with error: {}", e);
        }
    });

    Ok(HostedLibrary { addr, stopping, handle })
}

async fn stop_remote_server() -> axum::response::Json<Value> {
    axum::response::Json(Value::Bool(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reimporting_the_same_name_reuses_the_port() {
        let registry = SharedLibraryRegistry::new("127.0.0.1");
        let first = registry.import("StatefulLib").await.unwrap();
        let second = registry.import("StatefulLib").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn different_names_get_different_ports() {
        let registry = SharedLibraryRegistry::new("127.0.0.1");
        let a = registry.import("LibA").await.unwrap();
        let b = registry.import("LibB").await.unwrap();
        assert_ne!(a.port(), b.port());
    }

    #[tokio::test]
    async fn stop_all_forgets_every_library() {
        let registry = SharedLibraryRegistry::new("127.0.0.1");
        let first = registry.import("LibA").await.unwrap();
        registry.stop_all().await;
        let reimported = registry.import("LibA").await.unwrap();
        assert_ne!(first.port(), reimported.port());
    }
}
