//! Unit tests for the length-prefixed frame codec.

use bytes::BytesMut;
use serde_json::{json, Value};
use tokio_util::codec::{Decoder, Encoder};

use sce_toolhost::lsp::codec::{encode_body, CONTENT_TYPE, MAX_FRAME_BYTES};
use sce_toolhost::lsp::{decode, encode, is_complete, FrameCodec, Message};
use sce_toolhost::AppError;

fn frame(body: &str) -> Vec<u8> {
    format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
}

// ── Encoding ────────────────────────────────────────────────────────────────

#[test]
fn encoded_frame_declares_body_length() {
    let bytes = encode(&Message::notification("exit", Value::Null)).expect("encode");
    let text = String::from_utf8(bytes).expect("utf8");

    let (header, body) = text.split_once("\r\n\r\n").expect("header end");
    assert!(header.contains(&format!("Content-Length: {}", body.len())));
    assert!(header.contains(&format!("Content-Type: {CONTENT_TYPE}")));
}

#[test]
fn call_carries_string_id_and_notification_has_none() {
    let call = Message::call(7, "textDocument/hover", json!({"line": 1})).to_json();
    assert_eq!(call["id"], json!("7"));
    assert_eq!(call["jsonrpc"], json!("2.0"));
    assert_eq!(call["method"], json!("textDocument/hover"));

    let note = Message::notification("initialized", json!({})).to_json();
    assert!(note.get("id").is_none());
}

#[test]
fn scalar_params_are_wrapped_in_an_array() {
    let body = Message::call(1, "echo", json!("hi")).to_json();
    assert_eq!(body["params"], json!(["hi"]));
}

#[test]
fn absent_params_are_omitted() {
    let body = Message::call(1, "shutdown", Value::Null).to_json();
    assert!(body.get("params").is_none());
}

#[test]
fn encode_then_decode_recovers_method_and_params() {
    let message = Message::call(3, "workspace/symbol", json!({"query": "main"}));
    let bytes = encode(&message).expect("encode");

    let decoded = decode(&bytes).expect("decode");
    assert_eq!(decoded.consumed, bytes.len());
    assert_eq!(decoded.body["method"], json!("workspace/symbol"));
    assert_eq!(decoded.body["params"], json!({"query": "main"}));
}

// ── Completeness ────────────────────────────────────────────────────────────

#[test]
fn is_complete_at_exact_boundary() {
    let bytes = frame(r#"{"a":1}"#);
    assert!(is_complete(&bytes));
    assert!(!is_complete(&bytes[..bytes.len() - 1]));
    assert!(!is_complete(b"Content-Length: 5\r\n"));
    assert!(!is_complete(b""));
}

#[test]
fn trailing_bytes_do_not_affect_completeness() {
    let mut bytes = frame(r#"{"a":1}"#);
    let first_len = bytes.len();
    bytes.extend_from_slice(b"Content-Length: 99\r\n");

    assert!(is_complete(&bytes));
    let decoded = decode(&bytes).expect("decode first frame");
    assert_eq!(decoded.consumed, first_len);
    assert_eq!(decoded.body, json!({"a": 1}));
}

#[test]
fn header_name_is_case_insensitive() {
    let bytes = b"content-length: 2\r\n\r\n{}";
    assert!(is_complete(bytes));
    assert_eq!(decode(bytes).expect("decode").body, json!({}));
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[test]
fn missing_content_length_is_protocol_error() {
    let result = decode(b"Content-Type: x\r\n\r\n{}");
    assert!(matches!(result, Err(AppError::Protocol(_))));
}

#[test]
fn incomplete_body_is_protocol_error() {
    let result = decode(b"Content-Length: 10\r\n\r\n{}");
    assert!(matches!(result, Err(AppError::Protocol(_))));
}

#[test]
fn oversize_frame_is_rejected() {
    let header = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_BYTES + 1);
    let result = decode(header.as_bytes());
    assert!(matches!(result, Err(AppError::Protocol(_))));
}

#[test]
fn invalid_json_body_is_protocol_error() {
    let result = decode(&frame("{nope"));
    assert!(matches!(result, Err(AppError::Protocol(_))));
}

// ── Codec ───────────────────────────────────────────────────────────────────

#[test]
fn codec_waits_for_full_frame() {
    let bytes = frame(r#"{"id":"1","result":null}"#);
    let mut codec = FrameCodec::new();
    let mut src = BytesMut::from(&bytes[..10]);

    assert!(codec.decode(&mut src).expect("partial").is_none());
    src.extend_from_slice(&bytes[10..]);
    let body = codec.decode(&mut src).expect("complete").expect("one frame");
    assert_eq!(body["id"], json!("1"));
    assert!(src.is_empty());
}

#[test]
fn codec_decodes_back_to_back_frames() {
    let mut src = BytesMut::new();
    src.extend_from_slice(&frame(r#"{"n":1}"#));
    src.extend_from_slice(&frame(r#"{"n":2}"#));
    let mut codec = FrameCodec::new();

    let first = codec.decode(&mut src).expect("first").expect("frame");
    let second = codec.decode(&mut src).expect("second").expect("frame");
    assert_eq!(first["n"], json!(1));
    assert_eq!(second["n"], json!(2));
    assert!(codec.decode(&mut src).expect("empty").is_none());
}

#[test]
fn codec_skips_frame_with_invalid_body() {
    let mut src = BytesMut::new();
    src.extend_from_slice(&frame("{bad"));
    src.extend_from_slice(&frame(r#"{"ok":true}"#));
    let mut codec = FrameCodec::new();

    assert!(codec.decode(&mut src).is_err());
    let next = codec.decode(&mut src).expect("next frame").expect("frame");
    assert_eq!(next["ok"], json!(true));
}

#[test]
fn codec_encoder_matches_free_function() {
    let message = Message::notification("exit", Value::Null);
    let mut dst = BytesMut::new();
    FrameCodec::new()
        .encode(message.clone(), &mut dst)
        .expect("encode message");
    assert_eq!(&dst[..], &encode(&message).expect("encode")[..]);

    let mut raw = BytesMut::new();
    FrameCodec::new()
        .encode(json!({"id": "4", "result": 1}), &mut raw)
        .expect("encode value");
    assert_eq!(
        &raw[..],
        &encode_body(&json!({"id": "4", "result": 1})).expect("encode body")[..]
    );
}
