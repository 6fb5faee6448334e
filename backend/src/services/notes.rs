//! Notes service
//!
//! High-level business logic for notes operations.
//! Each mutation runs in one transaction covering the note row, its tag
//! counters and links, and its image records. Image files are written
//! before commit and discarded if the transaction does not commit; orphaned
//! images are cleared only after a successful commit.

use crate::config::REMOVED_TAGS_SEPARATOR;
use crate::database::repository::NewNote;
use crate::database::{
    non_blank, CreateNoteRequest, GetNotesForReviewQuery, GetNotesQuery, Note, NoteDetail,
    NoteWithTags, Page, Repository, ReviewAction, TagSummary, UpdateNoteRequest,
};
use crate::error::{AppError, Result};
use crate::services::images::ImagesService;
use crate::services::reviews::ReviewScheduler;
use crate::services::tags::TagsService;
use chrono::Utc;
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, Transaction};

/// Outcome of a note mutation
#[derive(Debug, Clone, Default, Serialize)]
pub struct NoteOperation {
    /// The note after the mutation; `None` for remove, restore and no-ops
    pub note: Option<NoteDetail>,
    /// Tags whose state the caller should refresh
    pub tags: Vec<TagSummary>,
}

impl NoteOperation {
    fn unchanged() -> Self {
        Self::default()
    }
}

/// Service for managing notes
#[derive(Clone)]
pub struct NotesService {
    repo: Repository,
    tags: TagsService,
    images: ImagesService,
    scheduler: ReviewScheduler,
}

impl NotesService {
    pub fn new(
        repo: Repository,
        tags: TagsService,
        images: ImagesService,
        scheduler: ReviewScheduler,
    ) -> Self {
        Self {
            repo,
            tags,
            images,
            scheduler,
        }
    }

    /// Create a new note
    pub async fn create(&self, user_id: i64, req: CreateNoteRequest) -> Result<NoteOperation> {
        req.validate()?;
        tracing::info!("Creating note for user {}: {}", user_id, req.title);

        let now = Utc::now();
        let reviews_left = self.scheduler.total_reviews(req.difficulty);
        let new_note = NewNote {
            title: req.title.clone(),
            content: String::new(),
            difficulty: req.difficulty,
            reviews_left,
            next_review_at: self.scheduler.schedule_next_at(now, req.difficulty, reviews_left),
            remove_after_reviews: req.remove_after_reviews,
        };

        let mut tx = self.repo.begin().await?;
        let extracted = self.images.extract(&mut tx, user_id, &req.content, &[]).await?;

        let result = async {
            let reconciliation = self.tags.reconcile_tx(&mut tx, user_id, &[], &req.tags).await?;

            let new_note = NewNote {
                content: extracted.html.clone(),
                ..new_note
            };
            let note = self.repo.insert_note_tx(&mut tx, user_id, &new_note).await?;

            let image_ids: Vec<i64> = extracted.images.iter().map(|i| i.id).collect();
            self.repo
                .attach_images_tx(&mut tx, user_id, note.id, &image_ids)
                .await?;

            let tag_ids: Vec<i64> = reconciliation.result_tags.iter().map(|t| t.id).collect();
            self.repo.set_note_tags_tx(&mut tx, note.id, &tag_ids).await?;

            Ok::<_, AppError>((note, reconciliation.touched_tags))
        }
        .await;

        let (note, touched) = self
            .commit_or_discard(tx, result, &extracted.written_files)
            .await?;

        tracing::info!("Note created successfully: {}", note.id);

        Ok(NoteOperation {
            note: Some(self.repo.get_note_detail(user_id, note.id).await?),
            tags: touched,
        })
    }

    /// Update an active note; absent fields keep their current value
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        req: UpdateNoteRequest,
    ) -> Result<NoteOperation> {
        req.validate()?;
        tracing::debug!("Updating note: {}", id);

        let mut tx = self.repo.begin().await?;
        let mut note = self.repo.get_active_note_tx(&mut tx, user_id, id).await?;

        let extracted = match &req.content {
            Some(content) => {
                let previous = self.repo.list_note_images_tx(&mut tx, note.id).await?;
                Some(self.images.extract(&mut tx, user_id, content, &previous).await?)
            }
            None => None,
        };
        let written_files = extracted
            .as_ref()
            .map(|e| e.written_files.clone())
            .unwrap_or_default();

        let result = async {
            let mut touched = Vec::new();
            if let Some(names) = &req.tags {
                let old_tags = self.repo.list_note_tags_tx(&mut tx, note.id).await?;
                let reconciliation = self.tags.reconcile_tx(&mut tx, user_id, &old_tags, names).await?;

                let tag_ids: Vec<i64> = reconciliation.result_tags.iter().map(|t| t.id).collect();
                self.repo.set_note_tags_tx(&mut tx, note.id, &tag_ids).await?;
                touched = reconciliation.touched_tags;
            }

            if let Some(title) = &req.title {
                note.title = title.clone();
            }
            if let Some(remove_after_reviews) = req.remove_after_reviews {
                note.remove_after_reviews = remove_after_reviews;
            }
            if let Some(extracted) = &extracted {
                note.content = extracted.html.clone();

                let image_ids: Vec<i64> = extracted.images.iter().map(|i| i.id).collect();
                self.repo
                    .attach_images_tx(&mut tx, user_id, note.id, &image_ids)
                    .await?;
            }

            self.repo.save_note_tx(&mut tx, &note).await?;
            Ok::<_, AppError>(touched)
        }
        .await;

        let touched = self.commit_or_discard(tx, result, &written_files).await?;

        if let Some(extracted) = &extracted {
            if let Err(e) = self
                .images
                .clear_orphaned(user_id, &extracted.previously_known_ids, &extracted.images)
                .await
            {
                tracing::warn!("Failed to clear orphaned images of note {}: {}", id, e);
            }
        }

        tracing::info!("Note updated successfully: {}", id);

        Ok(NoteOperation {
            note: Some(self.repo.get_note_detail(user_id, id).await?),
            tags: touched,
        })
    }

    /// Apply a review action to an active note.
    ///
    /// Only the review columns change; tags and images are left alone.
    pub async fn update_review_status(
        &self,
        user_id: i64,
        id: i64,
        action: ReviewAction,
    ) -> Result<NoteOperation> {
        tracing::debug!("Applying review action {} to note: {}", action, id);

        let now = Utc::now();
        let mut tx = self.repo.begin().await?;
        let mut note = self.repo.get_active_note_tx(&mut tx, user_id, id).await?;

        match action {
            ReviewAction::MarkAsReviewed => {
                note.reviews_left = (note.reviews_left - 1).max(0);
                note.reviewed_at = Some(now);
            }
            ReviewAction::CancelReviews => {
                note.reviews_left = 0;
            }
            ReviewAction::ResetReviewsCount => {
                note.reviews_left = self.scheduler.total_reviews(note.difficulty);
            }
        }
        note.next_review_at = self
            .scheduler
            .schedule_next_at(now, note.difficulty, note.reviews_left);

        let note_tag_ids: Vec<i64> = self
            .repo
            .list_note_tags_tx(&mut tx, note.id)
            .await?
            .iter()
            .map(|t| t.id)
            .collect();

        self.repo.save_note_tx(&mut tx, &note).await?;
        tx.commit().await?;

        let drained = self
            .tags
            .find_without_notes_for_review(user_id, &note_tag_ids)
            .await?;

        Ok(NoteOperation {
            note: Some(self.repo.get_note_detail(user_id, id).await?),
            tags: drained,
        })
    }

    /// Move a note to the trash; removing a removed note is a no-op
    pub async fn remove(&self, user_id: i64, id: i64) -> Result<NoteOperation> {
        let mut tx = self.repo.begin().await?;
        let note = self
            .repo
            .find_note_tx(&mut tx, user_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Note", id))?;

        if note.is_removed() {
            tracing::debug!("Note already removed: {}", id);
            return Ok(NoteOperation::unchanged());
        }

        let touched = self.remove_tx(&mut tx, user_id, &note).await?;
        tx.commit().await?;

        tracing::info!("Note removed: {}", id);

        Ok(NoteOperation {
            note: None,
            tags: touched,
        })
    }

    /// Bring a note back from the trash; restoring an active note is a no-op
    pub async fn restore(&self, user_id: i64, id: i64) -> Result<NoteOperation> {
        let mut tx = self.repo.begin().await?;
        let mut note = self
            .repo
            .find_note_tx(&mut tx, user_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Note", id))?;

        if !note.is_removed() {
            tracing::debug!("Note not removed: {}", id);
            return Ok(NoteOperation::unchanged());
        }

        let names: Vec<String> = note
            .removed_tags
            .as_deref()
            .unwrap_or_default()
            .split(REMOVED_TAGS_SEPARATOR)
            .map(String::from)
            .collect();

        let reconciliation = self.tags.reconcile_tx(&mut tx, user_id, &[], &names).await?;
        let tag_ids: Vec<i64> = reconciliation.result_tags.iter().map(|t| t.id).collect();
        self.repo.set_note_tags_tx(&mut tx, note.id, &tag_ids).await?;

        note.removed_at = None;
        note.removed_tags = None;
        self.repo.save_note_tx(&mut tx, &note).await?;
        self.images.restore_by_note_tx(&mut tx, user_id, note.id).await?;

        tx.commit().await?;

        tracing::info!("Note restored: {}", id);

        Ok(NoteOperation {
            note: None,
            tags: reconciliation.touched_tags,
        })
    }

    /// Get a note with its tags and images, removed or not
    pub async fn find_one(&self, user_id: i64, id: i64) -> Result<NoteDetail> {
        self.repo.get_note_detail(user_id, id).await
    }

    /// List active notes
    pub async fn find_all(&self, user_id: i64, query: &GetNotesQuery) -> Result<Vec<NoteWithTags>> {
        let page = Page::resolve(query.limit, query.offset)?;
        let notes = self
            .repo
            .list_notes(user_id, non_blank(&query.search_term), &query.tag_ids, page)
            .await?;

        self.with_tags(notes).await
    }

    /// List notes due for review
    pub async fn find_all_for_review(
        &self,
        user_id: i64,
        query: &GetNotesForReviewQuery,
    ) -> Result<Vec<NoteWithTags>> {
        let page = Page::resolve(query.limit, query.offset)?;
        let notes = self
            .repo
            .list_notes_for_review(user_id, &query.tag_ids, Utc::now(), page)
            .await?;

        self.with_tags(notes).await
    }

    /// List notes in the trash
    pub async fn find_removed(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Note>> {
        let page = Page::resolve(limit, offset)?;
        self.repo.list_removed_notes(user_id, page).await
    }

    /// Release a note's tags, snapshot their names and flag its images
    async fn remove_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        note: &Note,
    ) -> Result<Vec<TagSummary>> {
        let old_tags = self.repo.list_note_tags_tx(conn, note.id).await?;
        let snapshot = old_tags
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(REMOVED_TAGS_SEPARATOR.to_string().as_str());

        let reconciliation = self.tags.reconcile_tx(conn, user_id, &old_tags, &[]).await?;
        self.repo.set_note_tags_tx(conn, note.id, &[]).await?;

        let mut note = note.clone();
        note.removed_at = Some(Utc::now());
        note.removed_tags = Some(snapshot);
        self.repo.save_note_tx(conn, &note).await?;

        self.images.mark_removed_by_note_tx(conn, user_id, note.id).await?;

        Ok(reconciliation.touched_tags)
    }

    async fn with_tags(&self, notes: Vec<Note>) -> Result<Vec<NoteWithTags>> {
        let ids: Vec<i64> = notes.iter().map(|n| n.id).collect();
        let mut tags = self.repo.tags_by_note(&ids).await?;

        Ok(notes
            .into_iter()
            .map(|note| NoteWithTags {
                tags: tags.remove(&note.id).unwrap_or_default(),
                note,
            })
            .collect())
    }

    /// Commit on success; otherwise roll back and delete the files the
    /// operation wrote.
    async fn commit_or_discard<T>(
        &self,
        tx: Transaction<'static, Sqlite>,
        result: Result<T>,
        written_files: &[String],
    ) -> Result<T> {
        let committed = match result {
            Ok(value) => tx.commit().await.map(|()| value).map_err(AppError::from),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        };

        if committed.is_err() {
            self.images.discard_files(written_files).await;
        }

        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::*;
    use crate::database::{Difficulty, TagFilter, User};
    use crate::storage::image_store::sample_jpeg;
    use crate::storage::ImageStore;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixture {
        service: NotesService,
        tags: TagsService,
        images: ImagesService,
        repo: Repository,
        user: User,
        _temp: TempDir,
    }

    async fn setup() -> Fixture {
        let (repo, user) = create_test_repo_with_user().await;
        let temp = TempDir::new().unwrap();
        let store = ImageStore::new(temp.path().join("image_files"));
        store.initialize().await.unwrap();

        let tags = TagsService::new(repo.clone());
        let images = ImagesService::new(repo.clone(), store);
        let service = NotesService::new(
            repo.clone(),
            tags.clone(),
            images.clone(),
            ReviewScheduler::new(),
        );

        Fixture {
            service,
            tags,
            images,
            repo,
            user,
            _temp: temp,
        }
    }

    fn create_request(title: &str, tags: &[&str], difficulty: Difficulty) -> CreateNoteRequest {
        CreateNoteRequest {
            title: title.to_string(),
            content: "<p>body</p>".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            difficulty,
            remove_after_reviews: false,
        }
    }

    fn image_html() -> String {
        format!(
            r#"<p>figure</p><img src="data:image/jpeg;base64,{}">"#,
            STANDARD.encode(sample_jpeg(16, 16))
        )
    }

    async fn tag_count(f: &Fixture, name: &str) -> Option<i64> {
        f.tags
            .find_by_name(f.user.id, name)
            .await
            .unwrap()
            .map(|t| t.notes_count)
    }

    async fn make_due(f: &Fixture, id: i64) {
        let mut conn = f.repo.acquire().await.unwrap();
        let mut note = f.repo.get_active_note_tx(&mut conn, f.user.id, id).await.unwrap();
        note.next_review_at = Some(Utc::now() - Duration::hours(1));
        f.repo.save_note_tx(&mut conn, &note).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_schedules_reviews() {
        let f = setup().await;
        let before = Utc::now();

        let op = f
            .service
            .create(f.user.id, create_request("Ownership", &["Rust"], Difficulty::Medium))
            .await
            .unwrap();

        let detail = op.note.unwrap();
        assert_eq!(detail.note.reviews_left, 5);
        let next = detail.note.next_review_at.unwrap();
        assert!(next >= before + Duration::days(1));
        assert!(next <= Utc::now() + Duration::days(1));
        assert_eq!(detail.tags.len(), 1);
        assert_eq!(detail.tags[0].name, "rust");
        assert_eq!(op.tags.len(), 1);
        assert_eq!(op.tags[0].notes_count, 1);
    }

    #[tokio::test]
    async fn test_create_without_difficulty_has_no_schedule() {
        let f = setup().await;

        let op = f
            .service
            .create(f.user.id, create_request("Scratch", &["misc"], Difficulty::None))
            .await
            .unwrap();

        let note = op.note.unwrap().note;
        assert_eq!(note.reviews_left, 0);
        assert!(note.next_review_at.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_payload() {
        let f = setup().await;

        let result = f
            .service
            .create(f.user.id, create_request("x", &["rust"], Difficulty::Easy))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(tag_count(&f, "rust").await, None);
    }

    #[tokio::test]
    async fn test_create_stores_images() {
        let f = setup().await;
        let mut req = create_request("Diagram", &["draw"], Difficulty::None);
        req.content = image_html();

        let detail = f.service.create(f.user.id, req).await.unwrap().note.unwrap();

        assert_eq!(detail.images.len(), 1);
        assert_eq!(detail.images[0].note_id, Some(detail.note.id));
        assert!(detail.note.content.contains(&detail.images[0].file_name));
    }

    #[tokio::test]
    async fn test_update_tags_scenario() {
        let f = setup().await;
        let created = f
            .service
            .create(f.user.id, create_request("Languages", &["go", "rust"], Difficulty::None))
            .await
            .unwrap();
        let id = created.note.unwrap().note.id;

        let updated = f
            .service
            .update(
                f.user.id,
                id,
                UpdateNoteRequest {
                    tags: Some(vec!["go".to_string()]),
                    ..UpdateNoteRequest::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.tags.len(), 1);
        assert_eq!(updated.tags[0].name, "rust");
        assert_eq!(updated.tags[0].notes_count, 0);
        assert_eq!(tag_count(&f, "rust").await, None);
        assert_eq!(tag_count(&f, "go").await, Some(1));

        let detail = updated.note.unwrap();
        assert_eq!(detail.note.title, "Languages");
        assert_eq!(detail.tags.len(), 1);
    }

    #[tokio::test]
    async fn test_update_content_clears_orphaned_images() {
        let f = setup().await;
        let mut req = create_request("Diagram", &["draw"], Difficulty::None);
        req.content = image_html();
        let detail = f.service.create(f.user.id, req).await.unwrap().note.unwrap();
        let image = detail.images[0].clone();

        let updated = f
            .service
            .update(
                f.user.id,
                detail.note.id,
                UpdateNoteRequest {
                    content: Some("<p>no more figure</p>".to_string()),
                    ..UpdateNoteRequest::default()
                },
            )
            .await
            .unwrap();

        let detail = updated.note.unwrap();
        assert!(detail.images.is_empty());
        assert_eq!(detail.note.content, "<p>no more figure</p>");
        assert!(!f.images.store().exists(&image.file_name).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_removed_note_fails() {
        let f = setup().await;
        let id = f
            .service
            .create(f.user.id, create_request("Gone", &["tmp"], Difficulty::None))
            .await
            .unwrap()
            .note
            .unwrap()
            .note
            .id;
        f.service.remove(f.user.id, id).await.unwrap();

        let result = f
            .service
            .update(
                f.user.id,
                id,
                UpdateNoteRequest {
                    title: Some("Back".to_string()),
                    ..UpdateNoteRequest::default()
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::NotFound { entity: "Note", .. })));
    }

    #[tokio::test]
    async fn test_review_actions() {
        let f = setup().await;
        let id = f
            .service
            .create(f.user.id, create_request("Lifetimes", &["rust"], Difficulty::Easy))
            .await
            .unwrap()
            .note
            .unwrap()
            .note
            .id;

        let reviewed = f
            .service
            .update_review_status(f.user.id, id, ReviewAction::MarkAsReviewed)
            .await
            .unwrap()
            .note
            .unwrap()
            .note;
        assert_eq!(reviewed.reviews_left, 3);
        assert!(reviewed.reviewed_at.is_some());
        assert!(reviewed.next_review_at.unwrap() > Utc::now() + Duration::days(3));

        let cancelled = f
            .service
            .update_review_status(f.user.id, id, ReviewAction::CancelReviews)
            .await
            .unwrap()
            .note
            .unwrap()
            .note;
        assert_eq!(cancelled.reviews_left, 0);
        assert!(cancelled.next_review_at.is_none());

        let again = f
            .service
            .update_review_status(f.user.id, id, ReviewAction::MarkAsReviewed)
            .await
            .unwrap()
            .note
            .unwrap()
            .note;
        assert_eq!(again.reviews_left, 0);

        let reset = f
            .service
            .update_review_status(f.user.id, id, ReviewAction::ResetReviewsCount)
            .await
            .unwrap()
            .note
            .unwrap()
            .note;
        assert_eq!(reset.reviews_left, 4);
        assert!(reset.next_review_at.is_some());
    }

    #[tokio::test]
    async fn test_review_reports_drained_tags() {
        let f = setup().await;
        let id = f
            .service
            .create(f.user.id, create_request("Traits", &["rust"], Difficulty::Easy))
            .await
            .unwrap()
            .note
            .unwrap()
            .note
            .id;
        make_due(&f, id).await;

        let op = f
            .service
            .update_review_status(f.user.id, id, ReviewAction::MarkAsReviewed)
            .await
            .unwrap();

        assert_eq!(op.tags.len(), 1);
        assert_eq!(op.tags[0].name, "rust");
        assert_eq!(op.tags[0].notes_count, 0);
    }

    #[tokio::test]
    async fn test_last_review_keeps_note_and_tags() {
        let f = setup().await;
        let mut req = create_request("Temporary", &["rust"], Difficulty::Easy);
        req.remove_after_reviews = true;
        req.content = image_html();
        let id = f.service.create(f.user.id, req).await.unwrap().note.unwrap().note.id;

        for _ in 0..3 {
            f.service
                .update_review_status(f.user.id, id, ReviewAction::MarkAsReviewed)
                .await
                .unwrap();
        }
        let last = f
            .service
            .update_review_status(f.user.id, id, ReviewAction::MarkAsReviewed)
            .await
            .unwrap();

        let detail = last.note.unwrap();
        assert_eq!(detail.note.reviews_left, 0);
        assert!(detail.note.next_review_at.is_none());
        assert!(detail.note.removed_at.is_none());
        assert!(detail.note.removed_tags.is_none());
        assert_eq!(detail.tags.len(), 1);
        assert!(detail.images[0].removed_at.is_none());
        assert_eq!(tag_count(&f, "rust").await, Some(1));
    }

    #[tokio::test]
    async fn test_restore_increments_tag_still_in_use() {
        let f = setup().await;
        let first = f
            .service
            .create(f.user.id, create_request("First", &["shared"], Difficulty::None))
            .await
            .unwrap();
        let id = first.note.unwrap().note.id;
        let shared_id = first.tags[0].id;
        f.service
            .create(f.user.id, create_request("Second", &["shared"], Difficulty::None))
            .await
            .unwrap();

        let removed = f.service.remove(f.user.id, id).await.unwrap();
        assert_eq!(removed.tags.len(), 1);
        assert_eq!(removed.tags[0].id, shared_id);
        assert_eq!(removed.tags[0].notes_count, 1);

        let restored = f.service.restore(f.user.id, id).await.unwrap();
        assert_eq!(restored.tags.len(), 1);
        assert_eq!(restored.tags[0].id, shared_id);
        assert_eq!(restored.tags[0].notes_count, 2);

        let shared = f.tags.find_by_name(f.user.id, "shared").await.unwrap().unwrap();
        assert_eq!((shared.id, shared.notes_count), (shared_id, 2));
        let detail = f.service.find_one(f.user.id, id).await.unwrap();
        assert_eq!(detail.tags[0].id, shared_id);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let f = setup().await;
        let id = f
            .service
            .create(f.user.id, create_request("Trash me", &["a1", "b2"], Difficulty::None))
            .await
            .unwrap()
            .note
            .unwrap()
            .note
            .id;

        let first = f.service.remove(f.user.id, id).await.unwrap();
        assert!(first.note.is_none());
        assert_eq!(first.tags.len(), 2);
        assert!(first.tags.iter().all(|t| t.notes_count == 0));

        let second = f.service.remove(f.user.id, id).await.unwrap();
        assert!(second.note.is_none());
        assert!(second.tags.is_empty());

        let removed = f.service.find_removed(f.user.id, None, None).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].removed_tags.as_deref(), Some("a1,b2"));
    }

    #[tokio::test]
    async fn test_restore_reverses_remove() {
        let f = setup().await;
        let mut req = create_request("Round trip", &["keep", "cycle"], Difficulty::None);
        req.content = image_html();
        let created = f.service.create(f.user.id, req).await.unwrap();
        let id = created.note.unwrap().note.id;
        let old_ids: Vec<i64> = created.tags.iter().map(|t| t.id).collect();

        f.service.remove(f.user.id, id).await.unwrap();
        let removed = f.service.find_one(f.user.id, id).await.unwrap();
        assert!(removed.tags.is_empty());
        assert!(removed.images[0].removed_at.is_some());

        let restored = f.service.restore(f.user.id, id).await.unwrap();
        assert!(restored.note.is_none());
        assert_eq!(restored.tags.len(), 2);
        assert!(restored.tags.iter().all(|t| t.notes_count == 1));
        assert!(restored.tags.iter().all(|t| !old_ids.contains(&t.id)));

        let detail = f.service.find_one(f.user.id, id).await.unwrap();
        assert!(!detail.note.is_removed());
        assert!(detail.note.removed_tags.is_none());
        assert_eq!(detail.tags.len(), 2);
        assert!(detail.images[0].removed_at.is_none());

        let again = f.service.restore(f.user.id, id).await.unwrap();
        assert!(again.tags.is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_note() {
        let f = setup().await;

        let result = f.service.remove(f.user.id, 404).await;

        assert!(matches!(result, Err(AppError::NotFound { entity: "Note", id: 404 })));
    }

    #[tokio::test]
    async fn test_find_all_filters_by_every_tag() {
        let f = setup().await;
        for (title, tags) in [
            ("Both", vec!["rust", "async"]),
            ("Only rust", vec!["rust"]),
            ("Only async", vec!["async"]),
        ] {
            f.service
                .create(f.user.id, create_request(title, &tags, Difficulty::None))
                .await
                .unwrap();
        }
        let rust = f.tags.find_by_name(f.user.id, "rust").await.unwrap().unwrap();
        let async_tag = f.tags.find_by_name(f.user.id, "async").await.unwrap().unwrap();

        let both = f
            .service
            .find_all(
                f.user.id,
                &GetNotesQuery {
                    tag_ids: vec![rust.id, async_tag.id],
                    ..GetNotesQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].note.title, "Both");
        assert_eq!(both[0].tags.len(), 2);

        let searched = f
            .service
            .find_all(
                f.user.id,
                &GetNotesQuery {
                    search_term: Some("only".to_string()),
                    limit: Some(1),
                    ..GetNotesQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(searched.len(), 1);

        let bad_page = f
            .service
            .find_all(
                f.user.id,
                &GetNotesQuery {
                    limit: Some(51),
                    ..GetNotesQuery::default()
                },
            )
            .await;
        assert!(matches!(bad_page, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_review_queue_and_review_tags() {
        let f = setup().await;
        let due = f
            .service
            .create(f.user.id, create_request("Due", &["rust", "memory"], Difficulty::Hard))
            .await
            .unwrap()
            .note
            .unwrap()
            .note
            .id;
        f.service
            .create(f.user.id, create_request("Later", &["go"], Difficulty::Hard))
            .await
            .unwrap();
        make_due(&f, due).await;

        let queue = f
            .service
            .find_all_for_review(f.user.id, &GetNotesForReviewQuery::default())
            .await
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].note.id, due);

        let review_tags = f.tags.find_for_review(f.user.id, &[]).await.unwrap();
        let names: Vec<&str> = review_tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["memory", "rust"]);

        let rust = f.tags.find_by_name(f.user.id, "rust").await.unwrap().unwrap();
        let narrowed = f
            .tags
            .find_all(
                f.user.id,
                &TagFilter {
                    parent_tag_ids: vec![rust.id],
                    search_term: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(narrowed.len(), 2);
    }
}
