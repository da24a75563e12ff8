use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

/// Policy store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode store: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Store file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the chain query client and transaction executor
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Invalid transaction input: {0}")]
    InvalidInput(String),

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ChainError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ChainError::Request(format!("HTTP request timed out: {}", error))
        } else {
            ChainError::Request(format!("HTTP request error: {}", error))
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

pub type StoreResult<T> = Result<T, StoreError>;

pub type ChainResult<T> = Result<T, ChainError>;

/// Error envelope returned by every HTTP handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::Store(StoreError::InvalidPolicy(msg)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_POLICY",
                msg.clone(),
                None,
            ),
            AppError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "Failed to persist auto-top-up configuration".to_string(),
                None,
            ),
            AppError::Chain(ChainError::NotFound(address)) => (
                StatusCode::NOT_FOUND,
                "ACCOUNT_NOT_FOUND",
                format!("Account not found: {}", address),
                Some(serde_json::json!({ "address": address })),
            ),
            AppError::Chain(ChainError::Timeout(_)) => (
                StatusCode::GATEWAY_TIMEOUT,
                "UPSTREAM_TIMEOUT",
                "Upstream call timed out".to_string(),
                None,
            ),
            AppError::Chain(ChainError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone(), None)
            }
            AppError::Chain(_) => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                "Failed to query the network".to_string(),
                None,
            ),
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone(), None)
            }
            AppError::InvalidAddress(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_ADDRESS",
                "invalid address format".to_string(),
                None,
            ),
            AppError::UnknownNetwork(network) => (
                StatusCode::BAD_REQUEST,
                "INVALID_NETWORK",
                "invalid network".to_string(),
                Some(serde_json::json!({ "network": network })),
            ),
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}
