//! Operations exposed to callers
//!
//! This module organizes commands into logical submodules:
//! - `notes`: Note mutations, review actions and listings
//! - `tags`: Tag navigation
//! - `images`: Image maintenance
//!
//! Note mutations never fail outright: failures are logged and reported in
//! the `errors` field of [`NoteOperationResponse`].

pub mod images;
pub mod notes;
pub mod tags;

use crate::app::AppState;
use crate::database::{NoteDetail, TagSummary};
use crate::error::{AppError, ErrorKind, Result};
use crate::services::NoteOperation;
use serde::Serialize;

pub use images::*;
pub use notes::*;
pub use tags::*;

/// Failure reported to the caller of a note mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AppError> for OperationError {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Response envelope of every note mutation
#[derive(Debug, Clone, Default, Serialize)]
pub struct NoteOperationResponse {
    pub errors: Option<OperationError>,
    pub note: Option<NoteDetail>,
    pub tags: Option<Vec<TagSummary>>,
}

impl NoteOperationResponse {
    pub fn from_result(operation: &str, result: Result<NoteOperation>) -> Self {
        match result {
            Ok(op) => Self {
                errors: None,
                note: op.note,
                tags: Some(op.tags),
            },
            Err(e) => {
                tracing::error!("{} failed: {}", operation, e);
                Self {
                    errors: Some(OperationError::from(&e)),
                    note: None,
                    tags: None,
                }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_none()
    }
}

// ===== General Commands =====

/// Get application information
pub fn get_app_info(state: &AppState) -> AppInfo {
    AppInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        data_dir: state.config.data_dir.to_string_lossy().to_string(),
        image_dir: state.config.image_dir.to_string_lossy().to_string(),
    }
}

/// Application information structure
#[derive(Debug, serde::Serialize)]
pub struct AppInfo {
    pub version: String,
    pub data_dir: String,
    pub image_dir: String,
}
