//! Note-related commands
//!
//! Mutations, review actions and listings for notes.

use super::NoteOperationResponse;
use crate::app::AppState;
use crate::database::{
    CreateNoteRequest, GetNotesForReviewQuery, GetNotesQuery, Note, NoteDetail, NoteWithTags,
    ReviewAction, UpdateNoteRequest,
};
use crate::error::Result;

/// Create a new note
pub async fn create_note(
    state: &AppState,
    user_id: i64,
    req: CreateNoteRequest,
) -> NoteOperationResponse {
    NoteOperationResponse::from_result(
        "create_note",
        state.notes_service.create(user_id, req).await,
    )
}

/// Update a note
pub async fn update_note(
    state: &AppState,
    user_id: i64,
    id: i64,
    req: UpdateNoteRequest,
) -> NoteOperationResponse {
    NoteOperationResponse::from_result(
        "update_note",
        state.notes_service.update(user_id, id, req).await,
    )
}

/// Apply a review action given by name (`markAsReviewed`, `cancelReviews`,
/// `resetReviewsCount`)
pub async fn update_note_review_status(
    state: &AppState,
    user_id: i64,
    id: i64,
    action: &str,
) -> NoteOperationResponse {
    let result = match action.parse::<ReviewAction>() {
        Ok(action) => {
            state
                .notes_service
                .update_review_status(user_id, id, action)
                .await
        }
        Err(e) => Err(e),
    };

    NoteOperationResponse::from_result("update_note_review_status", result)
}

/// Move a note to the trash
pub async fn remove_note(state: &AppState, user_id: i64, id: i64) -> NoteOperationResponse {
    NoteOperationResponse::from_result("remove_note", state.notes_service.remove(user_id, id).await)
}

/// Restore a note from the trash
pub async fn restore_note(state: &AppState, user_id: i64, id: i64) -> NoteOperationResponse {
    NoteOperationResponse::from_result(
        "restore_note",
        state.notes_service.restore(user_id, id).await,
    )
}

/// Get a note by ID
pub async fn get_note(state: &AppState, user_id: i64, id: i64) -> Result<NoteDetail> {
    state.notes_service.find_one(user_id, id).await
}

/// List active notes
pub async fn list_notes(
    state: &AppState,
    user_id: i64,
    query: GetNotesQuery,
) -> Result<Vec<NoteWithTags>> {
    state.notes_service.find_all(user_id, &query).await
}

/// List notes due for review
pub async fn list_notes_for_review(
    state: &AppState,
    user_id: i64,
    query: GetNotesForReviewQuery,
) -> Result<Vec<NoteWithTags>> {
    state.notes_service.find_all_for_review(user_id, &query).await
}

/// List notes in the trash
pub async fn list_removed_notes(
    state: &AppState,
    user_id: i64,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<Note>> {
    state.notes_service.find_removed(user_id, limit, offset).await
}
