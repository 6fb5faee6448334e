use super::{push_id_list, Repository};
use crate::database::models::*;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use std::collections::{HashMap, HashSet};

/// Column values of a note about to be inserted
#[derive(Debug, Clone)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub difficulty: Difficulty,
    pub reviews_left: i64,
    pub next_review_at: Option<DateTime<Utc>>,
    pub remove_after_reviews: bool,
}

#[derive(FromRow)]
struct NoteTagRow {
    note_id: i64,
    #[sqlx(flatten)]
    tag: Tag,
}

impl Repository {
    /// Insert a note row
    pub async fn insert_note_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        new_note: &NewNote,
    ) -> Result<Note> {
        let now = Utc::now();

        let note = sqlx::query_as::<_, Note>(
            r#"
            INSERT INTO notes (
                user_id, title, content, difficulty, reviews_left, next_review_at,
                remove_after_reviews, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&new_note.title)
        .bind(&new_note.content)
        .bind(new_note.difficulty)
        .bind(new_note.reviews_left)
        .bind(new_note.next_review_at)
        .bind(new_note.remove_after_reviews)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        tracing::debug!("Created note: {} for user: {}", note.id, user_id);
        Ok(note)
    }

    /// Find a note by owner and ID, removed or not
    pub async fn find_note_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        id: i64,
    ) -> Result<Option<Note>> {
        let note = sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(note)
    }

    /// Get a note that has not been removed
    pub async fn get_active_note_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        id: i64,
    ) -> Result<Note> {
        self.find_note_tx(conn, user_id, id)
            .await?
            .filter(|note| !note.is_removed())
            .ok_or_else(|| AppError::not_found("Note", id))
    }

    /// Get a note with its tags and images
    pub async fn get_note_detail(&self, user_id: i64, id: i64) -> Result<NoteDetail> {
        let mut conn = self.acquire().await?;

        let note = self
            .find_note_tx(&mut conn, user_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Note", id))?;
        let tags = self.list_note_tags_tx(&mut conn, note.id).await?;
        let images = self.list_note_images_tx(&mut conn, note.id).await?;

        Ok(NoteDetail { note, tags, images })
    }

    /// Persist every mutable column of a note
    pub async fn save_note_tx(&self, conn: &mut SqliteConnection, note: &Note) -> Result<Note> {
        let saved = sqlx::query_as::<_, Note>(
            r#"
            UPDATE notes SET
                title = ?,
                content = ?,
                reviews_left = ?,
                next_review_at = ?,
                reviewed_at = ?,
                remove_after_reviews = ?,
                removed_at = ?,
                removed_tags = ?,
                updated_at = ?
            WHERE id = ? AND user_id = ?
            RETURNING *
            "#,
        )
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.reviews_left)
        .bind(note.next_review_at)
        .bind(note.reviewed_at)
        .bind(note.remove_after_reviews)
        .bind(note.removed_at)
        .bind(&note.removed_tags)
        .bind(Utc::now())
        .bind(note.id)
        .bind(note.user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Note", note.id))?;

        tracing::debug!("Saved note: {}", saved.id);
        Ok(saved)
    }

    /// Tags currently linked to a note
    pub async fn list_note_tags_tx(
        &self,
        conn: &mut SqliteConnection,
        note_id: i64,
    ) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.* FROM tags t
            INNER JOIN note_tags nt ON nt.tag_id = t.id
            WHERE nt.note_id = ?
            ORDER BY t.id
            "#,
        )
        .bind(note_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(tags)
    }

    /// Replace the tag links of a note
    pub async fn set_note_tags_tx(
        &self,
        conn: &mut SqliteConnection,
        note_id: i64,
        tag_ids: &[i64],
    ) -> Result<()> {
        sqlx::query("DELETE FROM note_tags WHERE note_id = ?")
            .bind(note_id)
            .execute(&mut *conn)
            .await?;

        if !tag_ids.is_empty() {
            let mut qb = QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO note_tags (note_id, tag_id) ");
            qb.push_values(tag_ids, |mut row, tag_id| {
                row.push_bind(note_id).push_bind(*tag_id);
            });
            qb.build().execute(&mut *conn).await?;
        }

        tracing::debug!("Linked {} tags to note: {}", tag_ids.len(), note_id);
        Ok(())
    }

    /// Active notes of a user, newest first
    pub async fn list_notes(
        &self,
        user_id: i64,
        search_term: Option<&str>,
        tag_ids: &[i64],
        page: Page,
    ) -> Result<Vec<Note>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT n.* FROM notes n WHERE n.user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND n.removed_at IS NULL");

        if let Some(term) = search_term {
            let pattern = format!("%{}%", term);
            qb.push(" AND (n.title LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR n.content LIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        push_all_tags_filter(&mut qb, tag_ids);

        qb.push(" ORDER BY n.updated_at DESC, n.id DESC LIMIT ");
        qb.push_bind(page.limit);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset);

        let notes = qb.build_query_as::<Note>().fetch_all(&self.pool).await?;
        Ok(notes)
    }

    /// Notes due for review, earliest first
    pub async fn list_notes_for_review(
        &self,
        user_id: i64,
        tag_ids: &[i64],
        now: DateTime<Utc>,
        page: Page,
    ) -> Result<Vec<Note>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT n.* FROM notes n WHERE n.user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND n.removed_at IS NULL AND n.reviews_left >= 1 AND n.next_review_at <= ");
        qb.push_bind(now);

        push_all_tags_filter(&mut qb, tag_ids);

        qb.push(" ORDER BY n.next_review_at ASC, n.id ASC LIMIT ");
        qb.push_bind(page.limit);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset);

        let notes = qb.build_query_as::<Note>().fetch_all(&self.pool).await?;
        Ok(notes)
    }

    /// Soft-deleted notes, most recently removed first
    pub async fn list_removed_notes(&self, user_id: i64, page: Page) -> Result<Vec<Note>> {
        let notes = sqlx::query_as::<_, Note>(
            r#"
            SELECT * FROM notes
            WHERE user_id = ? AND removed_at IS NOT NULL
            ORDER BY removed_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// Tags of several notes in one round trip, keyed by note ID
    pub async fn tags_by_note(&self, note_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>> {
        let mut by_note: HashMap<i64, Vec<Tag>> = HashMap::new();
        if note_ids.is_empty() {
            return Ok(by_note);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT nt.note_id, t.* FROM note_tags nt INNER JOIN tags t ON t.id = nt.tag_id WHERE nt.note_id IN ",
        );
        push_id_list(&mut qb, note_ids);
        qb.push(" ORDER BY nt.note_id, t.id");

        let rows = qb.build_query_as::<NoteTagRow>().fetch_all(&self.pool).await?;
        for row in rows {
            by_note.entry(row.note_id).or_default().push(row.tag);
        }

        Ok(by_note)
    }
}

/// Restrict `n` to notes linked to every tag in `tag_ids`.
fn push_all_tags_filter(qb: &mut QueryBuilder<'_, Sqlite>, tag_ids: &[i64]) {
    if tag_ids.is_empty() {
        return;
    }

    let distinct: HashSet<i64> = tag_ids.iter().copied().collect();

    qb.push(" AND n.id IN (SELECT nt.note_id FROM note_tags nt WHERE nt.tag_id IN ");
    push_id_list(qb, tag_ids);
    qb.push(" GROUP BY nt.note_id HAVING COUNT(DISTINCT nt.tag_id) = ");
    qb.push_bind(distinct.len() as i64);
    qb.push(")");
}
