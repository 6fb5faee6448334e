use super::{push_id_list, Repository};
use crate::database::models::Image;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

impl Repository {
    /// Record a stored image; the owning note is attached later
    pub async fn insert_image_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        file_name: &str,
        large_image: Option<&str>,
    ) -> Result<Image> {
        let image = sqlx::query_as::<_, Image>(
            r#"
            INSERT INTO images (user_id, file_name, large_image, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(file_name)
        .bind(large_image)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        tracing::debug!("Created image: {} ({})", image.id, image.file_name);
        Ok(image)
    }

    pub async fn find_image_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        id: i64,
    ) -> Result<Option<Image>> {
        let image = sqlx::query_as::<_, Image>("SELECT * FROM images WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(image)
    }

    pub async fn find_images_by_ids(&self, user_id: i64, ids: &[i64]) -> Result<Vec<Image>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM images WHERE user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND id IN ");
        push_id_list(&mut qb, ids);
        qb.push(" ORDER BY id");

        let images = qb.build_query_as::<Image>().fetch_all(&self.pool).await?;
        Ok(images)
    }

    /// Images attached to a note, removed or not
    pub async fn list_note_images_tx(
        &self,
        conn: &mut SqliteConnection,
        note_id: i64,
    ) -> Result<Vec<Image>> {
        let images = sqlx::query_as::<_, Image>(
            "SELECT * FROM images WHERE note_id = ? ORDER BY id",
        )
        .bind(note_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(images)
    }

    /// Point the given images at a note
    pub async fn attach_images_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        note_id: i64,
        image_ids: &[i64],
    ) -> Result<()> {
        if image_ids.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE images SET note_id = ");
        qb.push_bind(note_id);
        qb.push(" WHERE user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND id IN ");
        push_id_list(&mut qb, image_ids);
        qb.build().execute(&mut *conn).await?;

        tracing::debug!("Attached {} images to note: {}", image_ids.len(), note_id);
        Ok(())
    }

    /// Set or clear the soft-delete marker on every image of a note
    pub async fn set_note_images_removed_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        note_id: i64,
        removed_at: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let rows = sqlx::query("UPDATE images SET removed_at = ? WHERE note_id = ? AND user_id = ?")
            .bind(removed_at)
            .bind(note_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        tracing::debug!("Updated removed_at on {} images of note: {}", rows, note_id);
        Ok(rows)
    }

    /// Permanently delete an image record
    pub async fn delete_image(&self, id: i64) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!("Deleted image record: {}", id);
        Ok(rows > 0)
    }
}
