//! Error types for BrainCrate
//!
//! All errors use thiserror for structured error handling.
//! `ErrorKind` keeps the taxonomy intact up to the caller boundary,
//! which decides how each kind is rendered.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image error: {0}")]
    Image(String),

    #[error("HTML rewrite error: {0}")]
    Html(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Generic(String),
}

/// Coarse classification of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Storage,
    FileIo,
    Internal,
}

impl AppError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        AppError::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Validation(_) | AppError::Base64(_) => ErrorKind::Validation,
            AppError::Database(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            AppError::Database(_) => ErrorKind::Storage,
            AppError::Io(_) | AppError::Image(_) => ErrorKind::FileIo,
            AppError::Html(_)
            | AppError::Config(_)
            | AppError::Generic(_) => ErrorKind::Internal,
        }
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(err.to_string())
    }
}

impl From<lol_html::errors::RewritingError> for AppError {
    fn from(err: lol_html::errors::RewritingError) -> Self {
        AppError::Html(err.to_string())
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
