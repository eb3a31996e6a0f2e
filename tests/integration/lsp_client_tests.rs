//! Integration tests for the language server client.
//!
//! The server is a small shell script that reads framed messages from stdin
//! and answers a handful of methods:
//!
//! - `initialize` returns capabilities, or an error in `reject` mode
//! - `echo` returns its params
//! - `fail` returns a method-not-found error
//! - `chatty` sends a notification and a server request before answering
//! - `flood` sends fifty progress notifications before answering
//! - `silent` never answers
//! - `die` exits without answering
//! - `shutdown` returns null and `exit` ends the script

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use sce_toolhost::config::LspConfig;
use sce_toolhost::editor::EditorSnapshot;
use sce_toolhost::lsp::{Client, ClientRegistry, ErrorCode, Incoming, Response};
use sce_toolhost::models::{Tool, ToolType};
use sce_toolhost::AppError;

const FAKE_SERVER: &str = r#"#!/bin/sh
mode="$1"
log="$2"

reply() {
  printf 'Content-Length: %s\r\n\r\n%s' "${#1}" "$1"
}

while :; do
  len=
  while IFS= read -r line; do
    line=$(printf '%s' "$line" | tr -d '\r')
    [ -z "$line" ] && break
    case "$line" in
      Content-Length:*) len=$(printf '%s' "${line#Content-Length:}" | tr -d ' ') ;;
    esac
  done
  [ -z "$len" ] && exit 0
  body=$(dd bs=1 count="$len" 2>/dev/null)
  id=$(printf '%s' "$body" | sed -n 's/^{"id":"\([0-9]*\)".*/\1/p')
  method=$(printf '%s' "$body" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  printf '%s\n' "$method" >> "$log"

  case "$method" in
    initialize)
      if [ "$mode" = reject ]; then
        reply '{"jsonrpc":"2.0","id":"'"$id"'","error":{"code":-32603,"message":"not today"}}'
      else
        reply '{"jsonrpc":"2.0","id":"'"$id"'","result":{"capabilities":{"hoverProvider":true}}}'
      fi
      ;;
    echo)
      params=$(printf '%s' "$body" | sed -n 's/.*"params":\(.*\)}$/\1/p')
      reply '{"jsonrpc":"2.0","id":"'"$id"'","result":'"$params"'}'
      ;;
    fail)
      reply '{"jsonrpc":"2.0","id":"'"$id"'","error":{"code":-32601,"message":"no such method"}}'
      ;;
    chatty)
      reply '{"jsonrpc":"2.0","method":"window/logMessage","params":{"message":"hello"}}'
      reply '{"jsonrpc":"2.0","id":"77","method":"workspace/configuration","params":{}}'
      reply '{"jsonrpc":"2.0","id":"'"$id"'","result":true}'
      ;;
    flood)
      i=0
      while [ "$i" -lt 50 ]; do
        reply '{"jsonrpc":"2.0","method":"$/progress","params":{"n":'"$i"'}}'
        i=$((i + 1))
      done
      reply '{"jsonrpc":"2.0","id":"'"$id"'","result":true}'
      ;;
    silent) ;;
    die) exit 1 ;;
    shutdown)
      reply '{"jsonrpc":"2.0","id":"'"$id"'","result":null}'
      ;;
    exit) exit 0 ;;
  esac
done
"#;

struct FakeServer {
    dir: TempDir,
    tool: Tool,
}

impl FakeServer {
    fn new(mode: &str) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let script = dir.path().join("server.sh");
        std::fs::write(&script, FAKE_SERVER).expect("write server script");

        let log = dir.path().join("methods.log");

        let mut tool = Tool::new("fake-ls", "sh");
        tool.tool_type = ToolType::LspServer;
        tool.arguments = format!("{} {mode} {}", script.display(), log.display());
        Self { dir, tool }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Methods the server saw, in order.
    fn methods(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("methods.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

fn config() -> LspConfig {
    LspConfig {
        call_timeout_ms: 3000,
        shutdown_grace_ms: 2000,
    }
}

async fn start(server: &FakeServer, config: &LspConfig) -> sce_toolhost::Result<Client> {
    Client::spawn(&server.tool, &EditorSnapshot::default(), server.root(), config).await
}

// ── Handshake ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_reports_capabilities() {
    let server = FakeServer::new("ok");
    let client = start(&server, &config()).await.expect("spawn client");

    assert_eq!(client.capabilities(), &json!({"hoverProvider": true}));
    assert!(client.pid() > 0);
    assert!(!client.tool().use_tty_mode, "servers always run over pipes");

    client.shutdown().await.expect("shutdown");
    assert_eq!(
        server.methods(),
        vec!["initialize", "initialized", "shutdown", "exit"]
    );
}

#[tokio::test]
async fn rejected_initialize_is_handshake_error() {
    let server = FakeServer::new("reject");
    let result = start(&server, &config()).await;

    let err = result.expect_err("handshake must fail");
    assert!(matches!(err, AppError::Handshake(_)));
    assert!(err.to_string().contains("not today"));
}

#[tokio::test]
async fn missing_server_is_launch_error() {
    let mut tool = Tool::new("ghost-ls", "/nonexistent/sce-toolhost-ls");
    tool.tool_type = ToolType::LspServer;
    let dir = tempfile::tempdir().expect("temp dir");

    let result = Client::spawn(&tool, &EditorSnapshot::default(), dir.path(), &config()).await;
    assert!(matches!(result, Err(AppError::Launch(_))));
}

// ── Calls ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn call_receives_matching_response() {
    let server = FakeServer::new("ok");
    let client = start(&server, &config()).await.expect("spawn client");

    let response = client
        .call("echo", json!({"text": "ping"}))
        .await
        .expect("echo call");
    assert_eq!(response, Response::Result(json!({"text": "ping"})));

    let scalar = client.call("echo", json!(5)).await.expect("scalar call");
    assert_eq!(scalar, Response::Result(json!([5])));

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn error_response_is_returned_to_caller() {
    let server = FakeServer::new("ok");
    let client = start(&server, &config()).await.expect("spawn client");

    let response = client.call("fail", json!({})).await.expect("fail call");
    let error = response.into_result().expect_err("error response");
    assert_eq!(ErrorCode::from_code(error.code), Some(ErrorCode::MethodNotFound));
    assert_eq!(error.message, "no such method");

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn concurrent_calls_are_matched_by_id() {
    let server = FakeServer::new("ok");
    let client = Arc::new(start(&server, &config()).await.expect("spawn client"));

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.call("echo", json!({"n": 1})).await })
    };
    let second = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.call("echo", json!({"n": 2})).await })
    };

    let first = first.await.expect("task").expect("first call");
    let second = second.await.expect("task").expect("second call");
    assert_eq!(first, Response::Result(json!({"n": 1})));
    assert_eq!(second, Response::Result(json!({"n": 2})));

    let client = Arc::try_unwrap(client).expect("sole owner");
    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn unanswered_call_times_out() {
    let server = FakeServer::new("ok");
    let config = LspConfig {
        call_timeout_ms: 1000,
        shutdown_grace_ms: 2000,
    };
    let client = start(&server, &config).await.expect("spawn client");

    let result = client.call("silent", json!({})).await;
    assert!(matches!(result, Err(AppError::Timeout(_))));

    // The connection stays usable afterwards.
    let response = client.call("echo", json!([1])).await.expect("echo call");
    assert_eq!(response, Response::Result(json!([1])));

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn call_fails_when_server_exits() {
    let server = FakeServer::new("ok");
    let client = start(&server, &config()).await.expect("spawn client");

    let result = tokio::time::timeout(Duration::from_secs(2), client.call("die", json!({})))
        .await
        .expect("fails before the call timeout");
    assert!(matches!(result, Err(AppError::Protocol(_))));

    let completion = client.shutdown().await.expect("shutdown");
    assert_eq!(completion.exit_code, Some(1));
}

// ── Server-initiated traffic ────────────────────────────────────────────────

#[tokio::test]
async fn notifications_and_requests_are_forwarded() {
    let server = FakeServer::new("ok");
    let client = start(&server, &config()).await.expect("spawn client");
    let mut incoming = client.take_incoming().expect("incoming receiver");
    assert!(client.take_incoming().is_none(), "receiver is handed out once");

    let response = client.call("chatty", json!({})).await.expect("chatty call");
    assert_eq!(response, Response::Result(json!(true)));

    let notification = incoming.recv().await.expect("notification");
    assert_eq!(
        notification,
        Incoming::Notification {
            method: "window/logMessage".into(),
            params: Some(json!({"message": "hello"})),
        }
    );

    let request = incoming.recv().await.expect("server request");
    assert_eq!(
        request,
        Incoming::Request {
            id: 77,
            method: "workspace/configuration".into(),
            params: Some(json!({})),
        }
    );
    client
        .respond(77, Response::Result(json!([])))
        .expect("respond to server request");

    client.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn messages_before_take_incoming_are_discarded() {
    let server = FakeServer::new("ok");
    let client = start(&server, &config()).await.expect("spawn client");

    let response = client.call("flood", json!({})).await.expect("flood call");
    assert_eq!(response, Response::Result(json!(true)));

    let mut incoming = client.take_incoming().expect("incoming receiver");
    assert!(
        incoming.try_recv().is_err(),
        "nothing is kept for a receiver taken later"
    );

    client.call("chatty", json!({})).await.expect("chatty call");
    let first = incoming.recv().await.expect("notification");
    assert!(
        matches!(first, Incoming::Notification { ref method, .. } if method == "window/logMessage"),
        "progress notifications were not buffered: {first:?}"
    );

    client.shutdown().await.expect("shutdown");
}

// ── Shutdown ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_waits_for_clean_exit() {
    let server = FakeServer::new("ok");
    let client = start(&server, &config()).await.expect("spawn client");

    let completion = client.shutdown().await.expect("shutdown");
    assert!(completion.success());
}

#[tokio::test]
async fn dropped_client_lets_server_exit_cleanly() {
    let server = FakeServer::new("ok");
    let client = start(&server, &config()).await.expect("spawn client");
    drop(client);

    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    while server.methods().last().map(String::as_str) != Some("exit")
        && std::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.methods(), vec!["initialize", "initialized", "exit"]);
}

// ── Registry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn registry_reuses_running_client() {
    let server = FakeServer::new("ok");
    let registry = ClientRegistry::new(config());
    let editor = EditorSnapshot::default();

    let first = registry
        .get_or_spawn(&server.tool, &editor, server.root())
        .await
        .expect("first spawn");
    let second = registry
        .get_or_spawn(&server.tool, &editor, server.root())
        .await
        .expect("cached client");
    assert_eq!(first.pid(), second.pid());
    assert_eq!(registry.paths().await, vec!["sh".to_owned()]);
    assert!(registry.lookup("sh").await.is_some());
    assert!(registry.lookup("clangd").await.is_none());

    drop(first);
    drop(second);
    registry.shutdown_all().await;
    assert!(registry.paths().await.is_empty());
    assert_eq!(
        server
            .methods()
            .iter()
            .filter(|method| method.as_str() == "initialize")
            .count(),
        1
    );
}
