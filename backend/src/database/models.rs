//! Database models
//!
//! Rust structs representing database entities and the request payloads
//! that create or change them. All models use serde for serialization to
//! the caller.

use crate::config;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Review schedule tier of a note, stored by its integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum Difficulty {
    #[default]
    None = 0,
    Easy = 1,
    Medium = 2,
    Hard = 3,
}

impl From<Difficulty> for i32 {
    fn from(difficulty: Difficulty) -> Self {
        difficulty as i32
    }
}

impl TryFrom<i32> for Difficulty {
    type Error = AppError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Difficulty::None),
            1 => Ok(Difficulty::Easy),
            2 => Ok(Difficulty::Medium),
            3 => Ok(Difficulty::Hard),
            other => Err(AppError::Validation(format!(
                "Unknown difficulty code: {}",
                other
            ))),
        }
    }
}

/// Owner of notes, tags and images
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A note with HTML content
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    /// HTML fragment; embedded images reference stored files
    pub content: String,
    pub difficulty: Difficulty,
    pub reviews_left: i64,
    pub next_review_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub remove_after_reviews: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
    /// Comma-joined tag names captured when the note was removed
    pub removed_tags: Option<String>,
}

impl Note {
    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    pub fn is_due_for_review(&self, now: DateTime<Utc>) -> bool {
        self.removed_at.is_none()
            && self.reviews_left >= 1
            && self.next_review_at.is_some_and(|at| at <= now)
    }
}

/// Per-user tag with its reference count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub notes_count: i64,
}

/// Tag state reported back to callers after a mutation or a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TagSummary {
    pub id: i64,
    pub name: String,
    pub notes_count: i64,
}

impl From<&Tag> for TagSummary {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
            notes_count: tag.notes_count,
        }
    }
}

/// Stored image belonging to a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Image {
    pub id: i64,
    pub user_id: i64,
    pub note_id: Option<i64>,
    pub file_name: String,
    pub large_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

/// A note together with its live tags and images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteDetail {
    #[serde(flatten)]
    pub note: Note,
    pub tags: Vec<Tag>,
    pub images: Vec<Image>,
}

/// Listing entry: a note with its live tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteWithTags {
    #[serde(flatten)]
    pub note: Note,
    pub tags: Vec<Tag>,
}

/// Create note request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNoteRequest {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub remove_after_reviews: bool,
}

impl CreateNoteRequest {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_tag_names(&self.tags)
    }
}

/// Update note request; absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub remove_after_reviews: Option<bool>,
}

impl UpdateNoteRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(tags) = &self.tags {
            validate_tag_names(tags)?;
        }
        Ok(())
    }
}

/// Action applied to a note's review schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewAction {
    MarkAsReviewed,
    CancelReviews,
    ResetReviewsCount,
}

impl FromStr for ReviewAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "markAsReviewed" => Ok(ReviewAction::MarkAsReviewed),
            "cancelReviews" => Ok(ReviewAction::CancelReviews),
            "resetReviewsCount" => Ok(ReviewAction::ResetReviewsCount),
            other => Err(AppError::Validation(format!("Invalid action: {}", other))),
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReviewAction::MarkAsReviewed => "markAsReviewed",
            ReviewAction::CancelReviews => "cancelReviews",
            ReviewAction::ResetReviewsCount => "resetReviewsCount",
        };
        f.write_str(name)
    }
}

/// Limit/offset window over a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn resolve(limit: Option<i64>, offset: Option<i64>) -> Result<Self> {
        let limit = limit.unwrap_or(config::DEFAULT_PAGE_LIMIT);
        if limit < 1 || limit > config::MAX_PAGE_LIMIT {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                config::MAX_PAGE_LIMIT
            )));
        }

        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(AppError::Validation("offset must not be negative".to_string()));
        }

        Ok(Self { limit, offset })
    }
}

/// Note listing query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetNotesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub search_term: Option<String>,
    /// Only notes carrying all of these tags
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

/// Review queue query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetNotesForReviewQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

/// Tag navigation filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagFilter {
    /// Only tags co-occurring on notes that carry all of these tags
    #[serde(default)]
    pub parent_tag_ids: Vec<i64>,
    pub search_term: Option<String>,
}

impl TagFilter {
    pub fn is_empty(&self) -> bool {
        self.parent_tag_ids.is_empty() && non_blank(&self.search_term).is_none()
    }
}

/// Trimmed, lowercased form under which a tag is stored
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn validate_title(title: &str) -> Result<()> {
    let length = title.trim().chars().count();
    if length < config::MIN_TITLE_LENGTH || length > config::MAX_TITLE_LENGTH {
        return Err(AppError::Validation(format!(
            "title must be between {} and {} characters",
            config::MIN_TITLE_LENGTH,
            config::MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

fn validate_tag_names(tags: &[String]) -> Result<()> {
    if tags.len() < config::MIN_TAGS_PER_NOTE || tags.len() > config::MAX_TAGS_PER_NOTE {
        return Err(AppError::Validation(format!(
            "a note needs between {} and {} tags",
            config::MIN_TAGS_PER_NOTE,
            config::MAX_TAGS_PER_NOTE
        )));
    }

    for tag in tags {
        let name = normalize_tag_name(tag);
        let length = name.chars().count();
        if length < config::MIN_TAG_NAME_LENGTH || length > config::MAX_TAG_NAME_LENGTH {
            return Err(AppError::Validation(format!(
                "tag `{}` must be between {} and {} characters",
                tag,
                config::MIN_TAG_NAME_LENGTH,
                config::MAX_TAG_NAME_LENGTH
            )));
        }
        if name.contains(config::REMOVED_TAGS_SEPARATOR) {
            return Err(AppError::Validation(format!(
                "tag `{}` must not contain `{}`",
                tag,
                config::REMOVED_TAGS_SEPARATOR
            )));
        }
    }

    Ok(())
}
