//! Language server client.
//!
//! A [`Client`] owns a language server process started in plain pipe mode.
//! Its stdout is decoded on the process worker thread by a response router
//! that completes pending calls through one-shot channels and forwards
//! notifications and server requests to an mpsc channel once a consumer has
//! taken its receiver; until then they are logged and dropped. Calls await
//! their one-shot with a timeout; the worker never calls into client state.
//!
//! Lifecycle:
//! 1. [`Client::spawn`] starts the server and performs the `initialize` /
//!    `initialized` handshake.
//! 2. [`Client::call`], [`Client::notify`] and [`Client::respond`] exchange
//!    messages.
//! 3. [`Client::shutdown`] sends `shutdown` and `exit` and waits for the
//!    process. Dropping a client without it sends a best-effort `exit`,
//!    closes stdin and gives the server the shutdown grace period to exit
//!    before it is killed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use crate::config::{LspConfig, TerminalConfig};
use crate::editor::EditorState;
use crate::lsp::codec::{self, FrameCodec};
use crate::lsp::message::{Incoming, Message, Params, Response};
use crate::lsp::pending::{IdGenerator, PendingRequests};
use crate::models::tool::Tool;
use crate::process::{launch, Completion, OutputSinks, ProcessHandle};
use crate::util::{path_to_file_uri, visible_whitespace};
use crate::{AppError, Result};

// ── Response routing ─────────────────────────────────────────────────────────

/// Destination for notifications and server requests.
#[derive(Debug, Default)]
struct IncomingSlot {
    sender: Option<mpsc::UnboundedSender<Incoming>>,
    taken: bool,
}

/// Decodes server output on the worker thread.
///
/// Dropped when the server's stdout closes, which clears the pending table
/// so callers still waiting fail immediately.
struct ResponseRouter {
    tool: String,
    buffer: BytesMut,
    codec: FrameCodec,
    pending: PendingRequests,
    incoming: Arc<Mutex<IncomingSlot>>,
}

impl ResponseRouter {
    fn receive(&mut self, bytes: &[u8]) {
        debug!(
            tool = %self.tool,
            "<- {}",
            visible_whitespace(&String::from_utf8_lossy(bytes))
        );
        self.buffer.extend_from_slice(bytes);

        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(body)) => self.route(body),
                Ok(None) => break,
                Err(err) => warn!(tool = %self.tool, %err, "dropping malformed frame"),
            }
        }
    }

    fn route(&self, body: Value) {
        match Incoming::from_body(body) {
            Ok(Incoming::Response { id, response }) => {
                if !self.pending.fulfil(id, response) {
                    debug!(tool = %self.tool, id, "discarding response for untracked id");
                }
            }
            Ok(message) => self.forward(message),
            Err(err) => warn!(tool = %self.tool, %err, "ignoring unrecognised message"),
        }
    }

    fn forward(&self, message: Incoming) {
        let mut slot = self.incoming.lock();
        let Some(sender) = slot.sender.as_ref() else {
            debug!(tool = %self.tool, ?message, "no incoming receiver; discarding message");
            return;
        };
        if let Err(err) = sender.send(message) {
            debug!(
                tool = %self.tool,
                message = ?err.0,
                "incoming receiver dropped; discarding message"
            );
            slot.sender = None;
        }
    }
}

impl Drop for ResponseRouter {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                tool = %self.tool,
                outstanding = self.pending.len(),
                "server output closed; failing outstanding calls"
            );
        }
        self.pending.clear();
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Connection to one language server process.
#[derive(Debug)]
pub struct Client {
    tool: Tool,
    process: ProcessHandle,
    ids: IdGenerator,
    pending: PendingRequests,
    incoming: Arc<Mutex<IncomingSlot>>,
    capabilities: Value,
    call_timeout: Duration,
    shutdown_grace: Duration,
    exit_sent: bool,
}

impl Client {
    /// Start the server described by `tool` and complete the handshake.
    ///
    /// The server always runs in plain pipe mode regardless of the tool's
    /// TTY setting. `project_root` becomes the `rootUri` of the
    /// `initialize` call.
    ///
    /// # Errors
    ///
    /// - `AppError::Launch` if the server cannot be started.
    /// - `AppError::Handshake` if `initialize` fails or returns an error.
    pub async fn spawn(
        tool: &Tool,
        editor: &dyn EditorState,
        project_root: &Path,
        config: &LspConfig,
    ) -> Result<Self> {
        let mut tool = tool.clone();
        tool.use_tty_mode = false;

        let pending = PendingRequests::new();
        let incoming = Arc::new(Mutex::new(IncomingSlot::default()));
        let mut router = ResponseRouter {
            tool: tool.display_name().to_owned(),
            buffer: BytesMut::new(),
            codec: FrameCodec::new(),
            pending: pending.clone(),
            incoming: Arc::clone(&incoming),
        };
        let stderr_tool = tool.display_name().to_owned();
        let sinks = OutputSinks {
            stdout: Box::new(move |bytes| router.receive(bytes)),
            stderr: Box::new(move |bytes| {
                debug!(
                    tool = %stderr_tool,
                    "stderr: {}",
                    visible_whitespace(&String::from_utf8_lossy(bytes))
                );
            }),
        };
        let process = launch(&tool, editor, &TerminalConfig::default(), sinks)?;

        let mut client = Self {
            tool,
            process,
            ids: IdGenerator::new(),
            pending,
            incoming,
            capabilities: Value::Null,
            call_timeout: config.call_timeout(),
            shutdown_grace: config.shutdown_grace(),
            exit_sent: false,
        };

        let response = client
            .call("initialize", initialize_params(project_root))
            .await
            .map_err(|err| AppError::Handshake(format!("initialize failed: {err}")))?;
        match response {
            Response::Result(mut result) => {
                client.capabilities = result
                    .get_mut("capabilities")
                    .map(Value::take)
                    .unwrap_or(Value::Null);
            }
            Response::Error(error) => {
                return Err(AppError::Handshake(format!(
                    "server rejected initialize: {error}"
                )));
            }
        }
        client.notify("initialized", json!({}))?;

        info!(
            tool = client.tool.display_name(),
            pid = client.process.pid(),
            "language server initialized"
        );
        Ok(client)
    }

    /// The tool this client runs.
    #[must_use]
    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    /// Server process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Capabilities reported by the server in its `initialize` result.
    #[must_use]
    pub fn capabilities(&self) -> &Value {
        &self.capabilities
    }

    /// Take the receiver for server notifications and requests.
    ///
    /// Messages are forwarded from this call on; anything the server sent
    /// earlier was discarded. Returns `None` after the first call.
    pub fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<Incoming>> {
        let mut slot = self.incoming.lock();
        if slot.taken {
            return None;
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        slot.sender = Some(sender);
        slot.taken = true;
        Some(receiver)
    }

    /// Send a call and wait for its response.
    ///
    /// # Errors
    ///
    /// - `AppError::ChannelClosed` if the server's stdin is closed.
    /// - `AppError::Timeout` if no response arrives within the call timeout.
    /// - `AppError::Protocol` if the server's output ended first.
    pub async fn call(&self, method: &str, params: impl Into<Params>) -> Result<Response> {
        let id = self.ids.next_id();
        let receiver = self.pending.register(id);
        if let Err(err) = self.send(&Message::call(id, method, params)) {
            self.pending.cancel(id);
            return Err(err);
        }

        match tokio::time::timeout(self.call_timeout, receiver).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(AppError::Protocol(format!(
                "server output closed before {method} ({id}) was answered"
            ))),
            Err(_elapsed) => {
                self.pending.cancel(id);
                Err(AppError::Timeout(format!(
                    "{method} ({id}) got no response within {:?}",
                    self.call_timeout
                )))
            }
        }
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelClosed` if the server's stdin is closed.
    pub fn notify(&self, method: &str, params: impl Into<Params>) -> Result<()> {
        self.send(&Message::notification(method, params))
    }

    /// Answer a request the server sent us.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelClosed` if the server's stdin is closed.
    pub fn respond(&self, id: u64, response: Response) -> Result<()> {
        let mut body = json!({
            "jsonrpc": crate::lsp::message::JSONRPC_VERSION,
            "id": id.to_string(),
        });
        match response {
            Response::Result(result) => body["result"] = result,
            Response::Error(error) => body["error"] = serde_json::to_value(error)?,
        }
        let frame = codec::encode_body(&body)?;
        debug!(tool = self.tool.display_name(), id, "-> response");
        self.write_frame(&frame)
    }

    /// Shut the server down gracefully and wait for it to exit.
    ///
    /// Sends `shutdown`, then `exit`, closes stdin and waits up to the
    /// shutdown grace period before killing the process. Failures of the
    /// `shutdown` call are logged; the process is stopped regardless.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the process worker vanished.
    pub async fn shutdown(mut self) -> Result<Completion> {
        match self.call("shutdown", Params::Absent).await {
            Ok(Response::Result(_)) => {}
            Ok(Response::Error(error)) => {
                warn!(tool = self.tool.display_name(), %error, "server refused shutdown");
            }
            Err(err) => warn!(tool = self.tool.display_name(), %err, "shutdown call failed"),
        }

        self.exit_sent = true;
        if let Err(err) = self.notify("exit", Params::Absent) {
            debug!(tool = self.tool.display_name(), %err, "exit notification not sent");
        }
        self.process.close_input();

        if let Ok(completion) = tokio::time::timeout(self.shutdown_grace, self.process.join()).await
        {
            return completion;
        }

        warn!(
            tool = self.tool.display_name(),
            pid = self.process.pid(),
            "server did not exit in time; killing it"
        );
        self.process.kill()?;
        self.process.join().await
    }

    fn send(&self, message: &Message) -> Result<()> {
        let frame = codec::encode(message)?;
        debug!(
            tool = self.tool.display_name(),
            method = %message.method,
            id = message.id,
            "-> {}",
            visible_whitespace(&String::from_utf8_lossy(&frame))
        );
        self.write_frame(&frame)
    }

    fn write_frame(&self, frame: &[u8]) -> Result<()> {
        self.process.send_input(frame)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.exit_sent {
            return;
        }
        self.exit_sent = true;
        // The server may already be gone.
        if let Err(err) = self.notify("exit", Params::Absent) {
            debug!(tool = self.tool.display_name(), %err, "exit notification not sent");
        }
        self.process.set_drop_grace(self.shutdown_grace);
    }
}

/// Parameters of the `initialize` call.
fn initialize_params(project_root: &Path) -> Value {
    let root_uri = path_to_file_uri(project_root);
    let name = project_root
        .file_name()
        .map_or_else(|| root_uri.clone(), |name| name.to_string_lossy().into_owned());
    json!({
        "processId": std::process::id(),
        "rootUri": root_uri,
        "rootPath": project_root.to_string_lossy(),
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "textDocument": {
                "synchronization": { "didSave": true, "dynamicRegistration": false },
                "publishDiagnostics": { "relatedInformation": false },
            },
            "workspace": { "workspaceFolders": true },
        },
        "workspaceFolders": [{ "uri": root_uri, "name": name }],
        "trace": "off",
    })
}
