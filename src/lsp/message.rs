//! Protocol message types.
//!
//! Outgoing traffic is a [`Message`] (a call when it carries an id, a
//! notification otherwise). Incoming bodies are classified by
//! [`Incoming::from_body`] into responses, notifications and server requests.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AppError, Result};

/// Value of the `jsonrpc` field.
pub const JSONRPC_VERSION: &str = "2.0";

/// Parameters of an outgoing message, classified once at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Named parameters, sent as is.
    Object(Map<String, Value>),
    /// Positional parameters, sent as is.
    Array(Vec<Value>),
    /// A single string, number or boolean; sent as a one-element array.
    Scalar(Value),
    /// No parameters; the `params` key is omitted.
    Absent,
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Absent,
            Value::Object(map) => Self::Object(map),
            Value::Array(items) => Self::Array(items),
            scalar => Self::Scalar(scalar),
        }
    }
}

impl From<Option<Value>> for Params {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Absent, Self::from)
    }
}

impl Params {
    /// The JSON sent in the `params` field, or `None` to omit it.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Object(map) => Some(Value::Object(map)),
            Self::Array(items) => Some(Value::Array(items)),
            Self::Scalar(value) => Some(Value::Array(vec![value])),
            Self::Absent => None,
        }
    }
}

/// An outgoing call or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Method name.
    pub method: String,
    /// Call id; `None` for notifications.
    pub id: Option<u64>,
    /// Parameters.
    pub params: Params,
}

impl Message {
    /// A call expecting a response with the same `id`.
    pub fn call(id: u64, method: impl Into<String>, params: impl Into<Params>) -> Self {
        Self {
            method: method.into(),
            id: Some(id),
            params: params.into(),
        }
    }

    /// A notification; no response is expected.
    pub fn notification(method: impl Into<String>, params: impl Into<Params>) -> Self {
        Self {
            method: method.into(),
            id: None,
            params: params.into(),
        }
    }

    /// Whether this is a notification.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// JSON body. The id is sent as a decimal string.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        body.insert("method".into(), Value::from(self.method.as_str()));
        if let Some(id) = self.id {
            body.insert("id".into(), Value::from(id.to_string()));
        }
        if let Some(params) = self.params.clone().into_value() {
            body.insert("params".into(), params);
        }
        Value::Object(body)
    }
}

/// Standard error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received.
    ParseError,
    /// The JSON is not a valid request.
    InvalidRequest,
    /// The method does not exist.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal error.
    InternalError,
    /// A request arrived before `initialize`.
    ServerNotInitialized,
    /// Unknown error.
    UnknownErrorCode,
    /// The request was cancelled.
    RequestCancelled,
}

impl ErrorCode {
    /// Numeric code on the wire.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerNotInitialized => -32002,
            Self::UnknownErrorCode => -32001,
            Self::RequestCancelled => -32800,
        }
    }

    /// Code for a wire value, if it is one of the standard ones.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32002 => Self::ServerNotInitialized,
            -32001 => Self::UnknownErrorCode,
            -32800 => Self::RequestCancelled,
            _ => return None,
        })
    }

    /// Whether `code` lies in the range reserved for server errors.
    #[must_use]
    pub fn is_server_error(code: i64) -> bool {
        (-32099..=-32000).contains(&code)
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional additional information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    /// Error with a standard code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }
}

impl Display for ResponseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Outcome of a call: exactly one of result or error.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The call succeeded.
    Result(Value),
    /// The call failed.
    Error(ResponseError),
}

impl Response {
    /// Convert into a standard `Result`.
    ///
    /// # Errors
    ///
    /// Returns the [`ResponseError`] of a failed call.
    pub fn into_result(self) -> std::result::Result<Value, ResponseError> {
        match self {
            Self::Result(value) => Ok(value),
            Self::Error(error) => Err(error),
        }
    }

    /// Whether the call failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// A decoded message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to one of our calls.
    Response {
        /// Id of the call.
        id: u64,
        /// Its outcome.
        response: Response,
    },
    /// A notification from the server; its id is always 0.
    Notification {
        /// Method name.
        method: String,
        /// Raw parameters, if any.
        params: Option<Value>,
    },
    /// A request from the server expecting our response.
    Request {
        /// Request id.
        id: u64,
        /// Method name.
        method: String,
        /// Raw parameters, if any.
        params: Option<Value>,
    },
}

impl Incoming {
    /// Classify a decoded JSON body.
    ///
    /// A missing `id` counts as 0. A body with `method` is a notification
    /// (id 0) or a server request. Any other body is a response: `error`
    /// takes precedence over `result`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the body is not an object, the id is
    /// not a non-negative integer, the error member is malformed or a
    /// response carries neither `result` nor `error`.
    pub fn from_body(body: Value) -> Result<Self> {
        let Value::Object(mut body) = body else {
            return Err(AppError::Protocol("message body is not an object".into()));
        };
        let id = parse_id(body.get("id"))?;

        if let Some(method) = body.remove("method") {
            let Value::String(method) = method else {
                return Err(AppError::Protocol("method is not a string".into()));
            };
            let params = body.remove("params");
            return Ok(if id == 0 {
                Self::Notification { method, params }
            } else {
                Self::Request { id, method, params }
            });
        }

        let response = if let Some(error) = body.remove("error") {
            let error: ResponseError = serde_json::from_value(error)
                .map_err(|err| AppError::Protocol(format!("malformed error member: {err}")))?;
            Response::Error(error)
        } else if let Some(result) = body.remove("result") {
            Response::Result(result)
        } else {
            return Err(AppError::Protocol(format!(
                "response {id} has neither result nor error"
            )));
        };
        Ok(Self::Response { id, response })
    }
}

fn parse_id(id: Option<&Value>) -> Result<u64> {
    match id {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(number)) => number
            .as_u64()
            .ok_or_else(|| AppError::Protocol(format!("invalid id {number}"))),
        Some(Value::String(text)) => text
            .trim()
            .parse()
            .map_err(|_| AppError::Protocol(format!("invalid id {text:?}"))),
        Some(other) => Err(AppError::Protocol(format!("invalid id {other}"))),
    }
}
