//! Image maintenance commands

use crate::app::AppState;
use crate::error::Result;

/// Permanently delete images and their files; returns how many were deleted
pub async fn purge_images(state: &AppState, user_id: i64, ids: Vec<i64>) -> Result<usize> {
    tracing::info!("Purging {} images for user {}", ids.len(), user_id);
    state.images_service.purge(user_id, &ids).await
}
