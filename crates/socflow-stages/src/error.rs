//! Errors raised by analysis backends and action executors
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("BACKEND/UNREACHABLE: {0}")]
    Unreachable(String),

    #[error("BACKEND/REJECTED: {0}")]
    Rejected(String),

    #[error("BACKEND/CONTEXT: {0}")]
    InvalidContext(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("EXEC/UNSUPPORTED: {0}")]
    Unsupported(String),

    #[error("EXEC/FAILED: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    #[error("PAYLOAD/NO_JSON: no JSON object found in backend output")]
    NoJson,

    #[error("PAYLOAD/SHAPE: {0}")]
    Shape(String),
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("TEMPLATE/LOAD: {0}")]
    Load(String),

    #[error("TEMPLATE/RENDER: {0}")]
    Render(String),
}
