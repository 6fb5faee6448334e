use super::{push_id_list, Repository};
use crate::database::models::*;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashSet;

/// Which notes the tag navigation queries walk through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteScope {
    /// Every active note
    Active,
    /// Active notes currently due for review
    DueForReview(DateTime<Utc>),
}

impl Repository {
    /// Add one reference to the (owner, name) tag, creating it at 1.
    ///
    /// A single upsert statement, so concurrent writers cannot lose an
    /// increment.
    pub async fn increment_or_create_tag_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        name: &str,
    ) -> Result<Tag> {
        let tag = sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (user_id, name, notes_count)
            VALUES (?, ?, 1)
            ON CONFLICT(user_id, name) DO UPDATE SET notes_count = notes_count + 1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

        tracing::debug!("Tag {} ({}) now has {} notes", tag.name, tag.id, tag.notes_count);
        Ok(tag)
    }

    /// Drop one reference from a tag and delete it when none remain.
    ///
    /// Returns the post-decrement state. A tag that is already gone is
    /// reported with a count of zero.
    pub async fn decrement_or_remove_tag_tx(
        &self,
        conn: &mut SqliteConnection,
        tag: &Tag,
    ) -> Result<TagSummary> {
        let decremented = sqlx::query_as::<_, TagSummary>(
            r#"
            UPDATE tags SET notes_count = notes_count - 1
            WHERE id = ? AND user_id = ? AND notes_count > 0
            RETURNING id, name, notes_count
            "#,
        )
        .bind(tag.id)
        .bind(tag.user_id)
        .fetch_optional(&mut *conn)
        .await?;

        let summary = match decremented {
            Some(summary) => summary,
            None => {
                tracing::warn!("Tag {} ({}) vanished before decrement", tag.name, tag.id);
                TagSummary {
                    id: tag.id,
                    name: tag.name.clone(),
                    notes_count: 0,
                }
            }
        };

        if summary.notes_count <= 0 {
            sqlx::query("DELETE FROM tags WHERE id = ? AND user_id = ?")
                .bind(tag.id)
                .bind(tag.user_id)
                .execute(&mut *conn)
                .await?;

            tracing::debug!("Deleted tag {} ({})", tag.name, tag.id);
        }

        Ok(summary)
    }

    pub async fn find_tag_by_name(&self, user_id: i64, name: &str) -> Result<Option<Tag>> {
        let tag = sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE user_id = ? AND name = ?")
            .bind(user_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tag)
    }

    pub async fn find_tags_by_ids(&self, user_id: i64, ids: &[i64]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM tags WHERE user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND id IN ");
        push_id_list(&mut qb, ids);
        qb.push(" ORDER BY id");

        let tags = qb.build_query_as::<Tag>().fetch_all(&self.pool).await?;
        Ok(tags)
    }

    /// Every tag of a user, alphabetically
    pub async fn list_tags(&self, user_id: i64) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE user_id = ? ORDER BY name")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(tags)
    }

    /// Distinct tags linked to the notes matching the criteria.
    ///
    /// The note set is the user's notes in `scope`, optionally narrowed by a
    /// title/content search and by carrying every tag in `parent_tag_ids`.
    pub async fn list_tags_through_notes(
        &self,
        user_id: i64,
        parent_tag_ids: &[i64],
        search_term: Option<&str>,
        scope: NoteScope,
    ) -> Result<Vec<Tag>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT t.* FROM tags t INNER JOIN note_tags nt ON nt.tag_id = t.id WHERE nt.note_id IN (",
        );

        qb.push("SELECT n.id FROM notes n");
        if !parent_tag_ids.is_empty() {
            qb.push(" INNER JOIN note_tags pnt ON pnt.note_id = n.id");
        }
        qb.push(" WHERE n.user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND n.removed_at IS NULL");

        if let NoteScope::DueForReview(now) = scope {
            qb.push(" AND n.reviews_left >= 1 AND n.next_review_at <= ");
            qb.push_bind(now);
        }

        if let Some(term) = search_term {
            let pattern = format!("%{}%", term);
            qb.push(" AND (n.title LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR n.content LIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        if !parent_tag_ids.is_empty() {
            qb.push(" AND pnt.tag_id IN ");
            push_id_list(&mut qb, parent_tag_ids);
            qb.push(" GROUP BY n.id HAVING COUNT(DISTINCT pnt.tag_id) = ");
            let distinct: HashSet<i64> = parent_tag_ids.iter().copied().collect();
            qb.push_bind(distinct.len() as i64);
        }

        qb.push(") ORDER BY t.name");

        let tags = qb.build_query_as::<Tag>().fetch_all(&self.pool).await?;
        Ok(tags)
    }

    /// Subset of `tag_ids` still linked to at least one note due for review
    pub async fn tag_ids_with_notes_for_review(
        &self,
        user_id: i64,
        tag_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT nt.tag_id FROM note_tags nt INNER JOIN notes n ON n.id = nt.note_id WHERE nt.tag_id IN ",
        );
        push_id_list(&mut qb, tag_ids);
        qb.push(" AND n.user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND n.removed_at IS NULL AND n.reviews_left >= 1 AND n.next_review_at <= ");
        qb.push_bind(now);

        let ids = qb
            .build_query_scalar::<i64>()
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }
}
