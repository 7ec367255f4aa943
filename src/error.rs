use crate::device::imei::{DeviceId, ImeiError};
use crate::device::reading::FrameLengthError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Accept loop failed: {0}")]
    Accept(std::io::Error),

    #[error("Invalid IMEI: {0}")]
    InvalidImei(#[from] ImeiError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ref e @ AppError::InvalidImei(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            ref other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Reasons a device session ends. None of them leave the session task.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("login deadline of {0:?} exceeded")]
    LoginTimeout(Duration),

    #[error("message deadline of {0:?} exceeded")]
    MessageTimeout(Duration),

    #[error("peer closed the connection")]
    Disconnected,

    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("login rejected: {0}")]
    Imei(#[from] ImeiError),

    #[error("bad reading frame: {0}")]
    Frame(#[from] FrameLengthError),

    #[error("device with imei {0} already registered")]
    Duplicate(DeviceId),
}

impl SessionError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SessionError::LoginTimeout(_) | SessionError::MessageTimeout(_)
        )
    }
}
