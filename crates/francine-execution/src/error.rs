use std::sync::PoisonError;

use francine_common::error::CommonError;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),
    /// The peer could not be reached, so the request was never delivered.
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("RPC error: {0}")]
    RpcError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("error in common module: {0}")]
    CommonError(#[from] CommonError),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ExecutionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ExecutionError::InvalidRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ExecutionError::InternalError(message.into())
    }

    /// Whether sending the request again cannot deliver it twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::ConnectionError(_))
    }
}

impl From<JoinError> for ExecutionError {
    fn from(error: JoinError) -> Self {
        ExecutionError::InternalError(error.to_string())
    }
}

impl<T> From<PoisonError<T>> for ExecutionError {
    fn from(error: PoisonError<T>) -> Self {
        ExecutionError::InternalError(error.to_string())
    }
}

impl<T> From<mpsc::error::SendError<T>> for ExecutionError {
    fn from(error: mpsc::error::SendError<T>) -> Self {
        ExecutionError::InternalError(error.to_string())
    }
}

impl From<oneshot::error::RecvError> for ExecutionError {
    fn from(error: oneshot::error::RecvError) -> Self {
        ExecutionError::InternalError(error.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ExecutionError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        ExecutionError::RpcError(error.to_string())
    }
}
