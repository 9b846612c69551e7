// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a routing attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoAgentAvailable,
    IssuerUnavailable,
    StoreUnavailable,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAgentAvailable => "no_agent_available",
            Self::IssuerUnavailable => "issuer_unavailable",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the store, issuer, and assignment engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Key absent. Callers may treat this as empty.
    NotFound,
    /// No candidate agent could be reserved.
    NoAgentAvailable,
    /// The credential service timed out or answered badly.
    IssuerUnavailable(String),
    /// The state store cannot be reached. Fatal for the current operation.
    StoreUnavailable(String),
    /// A routing attempt failed; `reason` tells which dependency gave out.
    AssignmentFailed { room_id: String, reason: FailureReason, detail: String },
}

impl CoreError {
    pub fn assignment_failed(room_id: &str, cause: CoreError) -> Self {
        let reason = cause.reason();
        Self::AssignmentFailed { room_id: room_id.to_owned(), reason, detail: cause.to_string() }
    }

    /// Classify this error as a routing failure reason.
    ///
    /// `NotFound` surfacing during routing means the candidate vanished, which
    /// is reported the same way as an empty pool.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::NotFound | Self::NoAgentAvailable => FailureReason::NoAgentAvailable,
            Self::IssuerUnavailable(_) => FailureReason::IssuerUnavailable,
            Self::StoreUnavailable(_) => FailureReason::StoreUnavailable,
            Self::AssignmentFailed { reason, .. } => *reason,
        }
    }

    /// Front-door code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound => ErrorCode::NotFound,
            other => match other.reason() {
                FailureReason::NoAgentAvailable => ErrorCode::NoAgentAvailable,
                FailureReason::IssuerUnavailable => ErrorCode::TryAgain,
                FailureReason::StoreUnavailable => ErrorCode::Internal,
            },
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::NoAgentAvailable => f.write_str("no agent available"),
            Self::IssuerUnavailable(detail) => write!(f, "issuer unavailable: {detail}"),
            Self::StoreUnavailable(detail) => write!(f, "store unavailable: {detail}"),
            Self::AssignmentFailed { room_id, reason, detail } => {
                write!(f, "assignment failed for room {room_id} ({reason}): {detail}")
            }
        }
    }
}

impl std::error::Error for CoreError {}

/// Error codes for the dispatch API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    BadRequest,
    NotFound,
    NoAgentAvailable,
    TryAgain,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::NoAgentAvailable => 503,
            Self::TryAgain => 503,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::NoAgentAvailable => "NO_AGENT_AVAILABLE",
            Self::TryAgain => "TRY_AGAIN",
            Self::Internal => "INTERNAL",
        }
    }

    /// Caller-facing message. Never includes store or issuer internals.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::BadRequest => "bad request",
            Self::NotFound => "not found",
            Self::NoAgentAvailable => "no agent available, try later",
            Self::TryAgain => "credential service unavailable, try again",
            Self::Internal => "internal error",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
