//! Cache of running language server clients, one per tool path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::LspConfig;
use crate::editor::EditorState;
use crate::lsp::client::Client;
use crate::models::tool::Tool;
use crate::Result;

/// Shared clients keyed by the tool's executable path.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    config: LspConfig,
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl ClientRegistry {
    /// Empty registry whose clients use `config`.
    #[must_use]
    pub fn new(config: LspConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Return the client for `tool.path`, starting it if necessary.
    ///
    /// Concurrent callers for the same path wait for a single start.
    ///
    /// # Errors
    ///
    /// Returns the launch or handshake error of a failed start; nothing is
    /// cached in that case.
    pub async fn get_or_spawn(
        &self,
        tool: &Tool,
        editor: &dyn EditorState,
        project_root: &Path,
    ) -> Result<Arc<Client>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&tool.path) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(Client::spawn(tool, editor, project_root, &self.config).await?);
        clients.insert(tool.path.clone(), Arc::clone(&client));
        Ok(client)
    }

    /// The client for `path`, if one is running.
    pub async fn lookup(&self, path: &str) -> Option<Arc<Client>> {
        self.clients.lock().await.get(path).cloned()
    }

    /// Paths of all running clients, sorted.
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.clients.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Shut down every client.
    ///
    /// Clients still referenced elsewhere cannot be shut down gracefully;
    /// they are removed from the registry and receive `exit` when the last
    /// reference is dropped.
    pub async fn shutdown_all(&self) {
        let clients: Vec<(String, Arc<Client>)> = self.clients.lock().await.drain().collect();
        for (path, client) in clients {
            match Arc::try_unwrap(client) {
                Ok(client) => match client.shutdown().await {
                    Ok(completion) => {
                        info!(path, exit_code = ?completion.exit_code, "language server stopped");
                    }
                    Err(err) => warn!(path, %err, "language server shutdown failed"),
                },
                Err(_shared) => {
                    warn!(path, "language server still in use; detaching it");
                }
            }
        }
    }
}
