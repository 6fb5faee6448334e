//! Tag-related commands

use crate::app::AppState;
use crate::database::{TagFilter, TagSummary};
use crate::error::Result;

/// List tags, optionally narrowed to those sharing notes with `parent_tag_ids`
/// or found on notes matching `search_term`
pub async fn list_tags(state: &AppState, user_id: i64, filter: TagFilter) -> Result<Vec<TagSummary>> {
    state.tags_service.find_all(user_id, &filter).await
}

/// List tags of notes currently due for review
pub async fn list_tags_for_review(
    state: &AppState,
    user_id: i64,
    parent_tag_ids: Vec<i64>,
) -> Result<Vec<TagSummary>> {
    state
        .tags_service
        .find_for_review(user_id, &parent_tag_ids)
        .await
}
