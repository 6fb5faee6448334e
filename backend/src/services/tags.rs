//! Tags service
//!
//! Per-user tag ledger. Every active note holds one reference on each of its
//! tags; a tag lives exactly as long as its reference count is positive.
//! Mutations run on the caller's transaction so that counters and note-tag
//! links commit together.

use crate::database::repository::NoteScope;
use crate::database::{non_blank, normalize_tag_name, Repository, Tag, TagFilter, TagSummary};
use crate::error::Result;
use chrono::Utc;
use sqlx::SqliteConnection;

/// Outcome of reconciling a note's tags against a desired name list
#[derive(Debug, Clone, Default)]
pub struct TagReconciliation {
    /// Tags the note should be linked to, in desired-name order
    pub result_tags: Vec<Tag>,
    /// Tags whose counters changed, with their post-change state
    pub touched_tags: Vec<TagSummary>,
}

/// Service for the tag ledger and tag navigation queries
#[derive(Clone)]
pub struct TagsService {
    repo: Repository,
}

impl TagsService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Move a note from `old_tags` to `desired_names`.
    ///
    /// New names gain a reference (creating the tag at 1), shared names are
    /// left alone, dropped tags lose a reference and are deleted at 0.
    pub async fn reconcile_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        old_tags: &[Tag],
        desired_names: &[String],
    ) -> Result<TagReconciliation> {
        let desired = normalize_names(desired_names);
        let mut reconciliation = TagReconciliation::default();

        for name in &desired {
            match old_tags.iter().find(|tag| &tag.name == name) {
                Some(existing) => reconciliation.result_tags.push(existing.clone()),
                None => {
                    let tag = self.repo.increment_or_create_tag_tx(conn, user_id, name).await?;
                    reconciliation.touched_tags.push(TagSummary::from(&tag));
                    reconciliation.result_tags.push(tag);
                }
            }
        }

        for tag in old_tags.iter().filter(|tag| !desired.contains(&tag.name)) {
            let decremented = self.repo.decrement_or_remove_tag_tx(conn, tag).await?;
            reconciliation.touched_tags.push(decremented);
        }

        tracing::debug!(
            "Reconciled tags for user {}: {} linked, {} touched",
            user_id,
            reconciliation.result_tags.len(),
            reconciliation.touched_tags.len()
        );

        Ok(reconciliation)
    }

    /// Tags visible to the user, optionally narrowed through their notes
    pub async fn find_all(&self, user_id: i64, filter: &TagFilter) -> Result<Vec<TagSummary>> {
        let tags = if filter.is_empty() {
            self.repo.list_tags(user_id).await?
        } else {
            self.repo
                .list_tags_through_notes(
                    user_id,
                    &filter.parent_tag_ids,
                    non_blank(&filter.search_term),
                    NoteScope::Active,
                )
                .await?
        };

        Ok(tags.iter().map(TagSummary::from).collect())
    }

    /// Tags linked to notes due for review
    pub async fn find_for_review(
        &self,
        user_id: i64,
        parent_tag_ids: &[i64],
    ) -> Result<Vec<TagSummary>> {
        let tags = self
            .repo
            .list_tags_through_notes(
                user_id,
                parent_tag_ids,
                None,
                NoteScope::DueForReview(Utc::now()),
            )
            .await?;

        Ok(tags.iter().map(TagSummary::from).collect())
    }

    /// Tags among `tag_ids` left without any note due for review.
    ///
    /// Reported with `notes_count = 0`: in this view the count means due
    /// notes, not total references.
    pub async fn find_without_notes_for_review(
        &self,
        user_id: i64,
        tag_ids: &[i64],
    ) -> Result<Vec<TagSummary>> {
        let with_due = self
            .repo
            .tag_ids_with_notes_for_review(user_id, tag_ids, Utc::now())
            .await?;

        let without: Vec<i64> = tag_ids
            .iter()
            .copied()
            .filter(|id| !with_due.contains(id))
            .collect();

        let tags = self.repo.find_tags_by_ids(user_id, &without).await?;

        Ok(tags
            .iter()
            .map(|tag| TagSummary {
                notes_count: 0,
                ..TagSummary::from(tag)
            })
            .collect())
    }

    pub async fn find_by_name(&self, user_id: i64, name: &str) -> Result<Option<Tag>> {
        self.repo.find_tag_by_name(user_id, &normalize_tag_name(name)).await
    }

    pub async fn find_by_ids(&self, user_id: i64, ids: &[i64]) -> Result<Vec<TagSummary>> {
        let tags = self.repo.find_tags_by_ids(user_id, ids).await?;
        Ok(tags.iter().map(TagSummary::from).collect())
    }
}

/// Normalize, drop blanks and keep the first occurrence of each name
fn normalize_names(names: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = normalize_tag_name(name);
        if !name.is_empty() && !normalized.contains(&name) {
            normalized.push(name);
        }
    }
    normalized
}
