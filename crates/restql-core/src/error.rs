//! Wire error object and the `PGRST` error code space.
//!
//! Every failure the compiler can produce is reported to clients as a JSON
//! object `{code, message, details, hint}`. The HTTP status is derived from
//! the code, so transports never invent their own mapping.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable error codes exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Parse error in a query-string parameter.
    ParseError,
    /// HTTP verb not allowed for this function call.
    RpcMethodNotAllowed,
    /// Request payload could not be decoded.
    MalformedPayload,
    /// Filter value is missing its operator.
    FilterMissingOperator,
    /// None of the requested media types can be produced.
    NoAcceptableMediaType,
    /// Dotted filter references a resource that is not embedded.
    NotAnEmbeddedResource,
    /// Limited mutation without an explicit unique ordering.
    LimitWithoutOrder,
    /// Limited mutation affected more rows than the limit.
    LimitViolated,
    /// Malformed `response.headers` GUC.
    MalformedResponseHeaders,
    /// Malformed `response.status` GUC.
    MalformedResponseStatus,
    /// Binary output requested for more than one column.
    BinaryWithMultipleColumns,
    /// Singular response requested but row count was not exactly one.
    SingularityViolation,
    /// Unknown column named in `?columns=`.
    UnknownColumnInColumns,
    /// No relationship found between the two resources.
    NoRelationship,
    /// No function matches the request.
    NoMatchingFunction,
    /// More than one function overload matches the request.
    AmbiguousFunction,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PGRST100",
            ErrorCode::RpcMethodNotAllowed => "PGRST101",
            ErrorCode::MalformedPayload => "PGRST102",
            ErrorCode::FilterMissingOperator => "PGRST104",
            ErrorCode::NoAcceptableMediaType => "PGRST107",
            ErrorCode::NotAnEmbeddedResource => "PGRST108",
            ErrorCode::LimitWithoutOrder => "PGRST109",
            ErrorCode::LimitViolated => "PGRST110",
            ErrorCode::MalformedResponseHeaders => "PGRST111",
            ErrorCode::MalformedResponseStatus => "PGRST112",
            ErrorCode::BinaryWithMultipleColumns => "PGRST113",
            ErrorCode::SingularityViolation => "PGRST116",
            ErrorCode::UnknownColumnInColumns => "PGRST118",
            ErrorCode::NoRelationship => "PGRST200",
            ErrorCode::NoMatchingFunction => "PGRST202",
            ErrorCode::AmbiguousFunction => "PGRST203",
        }
    }

    /// HTTP status implied by this code.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::ParseError
            | ErrorCode::MalformedPayload
            | ErrorCode::FilterMissingOperator
            | ErrorCode::NotAnEmbeddedResource
            | ErrorCode::LimitWithoutOrder
            | ErrorCode::LimitViolated
            | ErrorCode::UnknownColumnInColumns
            | ErrorCode::NoRelationship => 400,
            ErrorCode::RpcMethodNotAllowed => 405,
            ErrorCode::NoAcceptableMediaType
            | ErrorCode::BinaryWithMultipleColumns
            | ErrorCode::SingularityViolation => 406,
            ErrorCode::MalformedResponseHeaders | ErrorCode::MalformedResponseStatus => 500,
            ErrorCode::NoMatchingFunction => 404,
            ErrorCode::AmbiguousFunction => 300,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error object written to the response body.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn status(&self) -> u16 {
        self.code.status()
    }
}
