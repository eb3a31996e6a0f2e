//! Unit tests for classifying incoming protocol messages.

use serde_json::json;

use sce_toolhost::lsp::{ErrorCode, Incoming, Params, Response, ResponseError};
use sce_toolhost::AppError;

#[test]
fn result_body_is_a_response() {
    let incoming = Incoming::from_body(json!({"jsonrpc": "2.0", "id": "5", "result": {"ok": 1}}))
        .expect("classify");
    assert_eq!(
        incoming,
        Incoming::Response {
            id: 5,
            response: Response::Result(json!({"ok": 1})),
        }
    );
}

#[test]
fn numeric_id_is_accepted() {
    let incoming = Incoming::from_body(json!({"id": 9, "result": null})).expect("classify");
    assert!(matches!(incoming, Incoming::Response { id: 9, .. }));
}

#[test]
fn error_takes_precedence_over_result() {
    let incoming = Incoming::from_body(json!({
        "id": "2",
        "result": 1,
        "error": {"code": -32601, "message": "no such method"}
    }))
    .expect("classify");

    let Incoming::Response { response, .. } = incoming else {
        panic!("expected a response");
    };
    let error = response.into_result().expect_err("error response");
    assert_eq!(ErrorCode::from_code(error.code), Some(ErrorCode::MethodNotFound));
    assert_eq!(error.to_string(), "no such method (-32601)");
}

#[test]
fn method_without_id_is_a_notification() {
    let incoming = Incoming::from_body(json!({
        "method": "window/logMessage",
        "params": {"message": "hi"}
    }))
    .expect("classify");
    assert_eq!(
        incoming,
        Incoming::Notification {
            method: "window/logMessage".into(),
            params: Some(json!({"message": "hi"})),
        }
    );
}

#[test]
fn method_with_id_is_a_server_request() {
    let incoming = Incoming::from_body(json!({
        "id": "11",
        "method": "workspace/configuration"
    }))
    .expect("classify");
    assert_eq!(
        incoming,
        Incoming::Request {
            id: 11,
            method: "workspace/configuration".into(),
            params: None,
        }
    );
}

#[test]
fn response_without_result_or_error_is_rejected() {
    let result = Incoming::from_body(json!({"id": "1"}));
    assert!(matches!(result, Err(AppError::Protocol(_))));
}

#[test]
fn non_object_body_is_rejected() {
    assert!(Incoming::from_body(json!([1, 2])).is_err());
    assert!(Incoming::from_body(json!({"id": "abc", "result": 1})).is_err());
}

#[test]
fn error_codes_round_trip_their_numbers() {
    for code in [
        ErrorCode::ParseError,
        ErrorCode::InvalidRequest,
        ErrorCode::MethodNotFound,
        ErrorCode::InvalidParams,
        ErrorCode::InternalError,
        ErrorCode::ServerNotInitialized,
        ErrorCode::UnknownErrorCode,
        ErrorCode::RequestCancelled,
    ] {
        assert_eq!(ErrorCode::from_code(code.code()), Some(code));
    }
    assert!(ErrorCode::is_server_error(-32050));
    assert!(!ErrorCode::is_server_error(-32700));
}

#[test]
fn response_error_constructor_uses_wire_code() {
    let error = ResponseError::new(ErrorCode::InvalidParams, "bad");
    assert_eq!(error.code, -32602);
    assert!(Response::Error(error).is_error());
}

#[test]
fn params_classification() {
    assert_eq!(Params::from(json!(null)), Params::Absent);
    assert_eq!(Params::from(None::<serde_json::Value>), Params::Absent);
    assert_eq!(Params::from(json!(3)).into_value(), Some(json!([3])));
    assert_eq!(Params::from(json!([1, 2])).into_value(), Some(json!([1, 2])));
    assert_eq!(Params::from(json!({"a": 1})).into_value(), Some(json!({"a": 1})));
}
