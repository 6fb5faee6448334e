//! Application configuration
//!
//! Central location for the review schedules, image limits and validation
//! boundaries, plus the runtime paths loaded from the environment.

use crate::error::{AppError, Result};
use std::path::PathBuf;

// ===== Review Schedules =====

/// Day offsets between reviews for easy notes
pub const EASY_REVIEW_SCHEDULE: &[i64] = &[1, 4, 7, 21];
/// Day offsets between reviews for medium notes
pub const MEDIUM_REVIEW_SCHEDULE: &[i64] = &[1, 3, 7, 21, 60];
/// Day offsets between reviews for hard notes
pub const HARD_REVIEW_SCHEDULE: &[i64] = &[1, 3, 7, 21, 60, 90, 182];

// ===== Image Limits =====

/// Bounding box for the inline variant of an embedded image
pub const MAX_INITIAL_IMAGE_WIDTH: u32 = 800;
pub const MAX_INITIAL_IMAGE_HEIGHT: u32 = 600;

/// Bounding box for the optional large variant
pub const MAX_LARGE_IMAGE_WIDTH: u32 = 1600;
pub const MAX_LARGE_IMAGE_HEIGHT: u32 = 1200;

/// Data URI prefix accepted for new inline images
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64";

/// Prefix of the large variant file name
pub const LARGE_IMAGE_PREFIX: &str = "large_";

// ===== Note Validation =====

pub const MIN_TITLE_LENGTH: usize = 2;
pub const MAX_TITLE_LENGTH: usize = 255;

/// A note carries between 1 and 13 tags
pub const MIN_TAGS_PER_NOTE: usize = 1;
pub const MAX_TAGS_PER_NOTE: usize = 13;

pub const MIN_TAG_NAME_LENGTH: usize = 2;
pub const MAX_TAG_NAME_LENGTH: usize = 20;

/// Separator used for the removed-tags snapshot; forbidden inside tag names
pub const REMOVED_TAGS_SEPARATOR: char = ',';

// ===== Pagination =====

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 50;

// ===== Runtime Paths =====

/// Environment variable naming the data directory
pub const DATA_DIR_ENV: &str = "BRAINCRATE_DATA_DIR";
/// Optional override for the SQLite database file
pub const DATABASE_PATH_ENV: &str = "BRAINCRATE_DATABASE_PATH";
/// Optional override for the image directory
pub const IMAGE_DIR_ENV: &str = "BRAINCRATE_IMAGE_DIR";

/// Runtime configuration resolved at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub image_dir: PathBuf,
}

impl AppConfig {
    /// Derive every path from a single data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            database_path: data_dir.join("braincrate.db"),
            image_dir: data_dir.join("image_files"),
            data_dir,
        }
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::Config(format!("{} is not set", DATA_DIR_ENV)))?;

        let mut config = Self::with_data_dir(data_dir);

        if let Some(path) = lookup(DATABASE_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(IMAGE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            config.image_dir = PathBuf::from(path);
        }

        Ok(config)
    }
}
