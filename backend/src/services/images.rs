//! Images service
//!
//! Finds the `<img>` elements of a note's HTML, stores newly pasted JPEG
//! data URIs as files, confirms references to images already stored and
//! drops anything that is neither stored locally nor an absolute URL.

use crate::config::{
    JPEG_DATA_URI_PREFIX, MAX_INITIAL_IMAGE_HEIGHT, MAX_INITIAL_IMAGE_WIDTH,
    MAX_LARGE_IMAGE_HEIGHT, MAX_LARGE_IMAGE_WIDTH,
};
use crate::database::{Image, Repository};
use crate::error::{AppError, Result};
use crate::storage::ImageStore;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::SqliteConnection;
use std::collections::HashSet;

static LOCAL_IMAGE_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(large_)?\d+_\d+\.jpg$").expect("valid local image pattern"));

/// Attributes of one `<img>` element as written by the editor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImgTag {
    pub id: Option<String>,
    pub src: Option<String>,
    pub large_image: Option<String>,
}

/// What an `<img>` element refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource<'a> {
    /// Freshly pasted JPEG data URI, optionally with a large variant
    Inline { src: &'a str, large_image: Option<&'a str> },
    /// Reference to an image already stored for this user
    Stored { id: &'a str },
    /// Absolute http(s) URL
    Remote,
    /// Anything else; dropped from the output
    Unknown,
}

/// Result of reconciling a note's HTML with its stored images
#[derive(Debug, Clone, Default)]
pub struct ExtractedImages {
    /// Rewritten HTML without document wrappers
    pub html: String,
    /// Images the HTML refers to, in document order
    pub images: Vec<Image>,
    /// Images the note held before plus confirmed stored references
    pub previously_known_ids: Vec<i64>,
    /// Files written by this extraction
    pub written_files: Vec<String>,
}

#[derive(Debug)]
enum ImgAction {
    Keep,
    Remove,
    Rewrite(Image),
}

/// Classify an `<img>` by its `id`, `src` and `largeimage` attributes
pub fn classify(tag: &ImgTag) -> ImageSource<'_> {
    let id = tag.id.as_deref().filter(|id| !id.is_empty());
    let src = tag.src.as_deref().unwrap_or_default();
    let large_image = tag.large_image.as_deref().filter(|l| !l.is_empty());

    let large_is_jpeg = large_image.map_or(true, |l| l.starts_with(JPEG_DATA_URI_PREFIX));

    match id {
        None if src.starts_with(JPEG_DATA_URI_PREFIX) && large_is_jpeg => {
            ImageSource::Inline { src, large_image }
        }
        Some(id) if LOCAL_IMAGE_SRC.is_match(src) => ImageSource::Stored { id },
        _ if src.starts_with("http://") || src.starts_with("https://") => ImageSource::Remote,
        _ => ImageSource::Unknown,
    }
}

/// Service for note images
#[derive(Clone)]
pub struct ImagesService {
    repo: Repository,
    store: ImageStore,
}

impl ImagesService {
    pub fn new(repo: Repository, store: ImageStore) -> Self {
        Self { repo, store }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Reconcile `html` with the images stored for `user_id`.
    ///
    /// New inline images are written and recorded on `conn`; if anything
    /// fails, files already written here are deleted before returning.
    pub async fn extract(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        html: &str,
        previous_images: &[Image],
    ) -> Result<ExtractedImages> {
        let mut written_files = Vec::new();

        match self
            .extract_inner(conn, user_id, html, previous_images, &mut written_files)
            .await
        {
            Ok(mut extracted) => {
                extracted.written_files = written_files;
                Ok(extracted)
            }
            Err(e) => {
                self.discard_files(&written_files).await;
                Err(e)
            }
        }
    }

    async fn extract_inner(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        html: &str,
        previous_images: &[Image],
        written_files: &mut Vec<String>,
    ) -> Result<ExtractedImages> {
        let tags = scan_images(html)?;

        let mut images: Vec<Image> = Vec::new();
        let mut previously_known_ids: Vec<i64> = previous_images.iter().map(|i| i.id).collect();
        let mut actions = Vec::with_capacity(tags.len());

        for tag in &tags {
            let action = match classify(tag) {
                ImageSource::Inline { src, large_image } => {
                    let image = self
                        .store_inline(conn, user_id, src, large_image, written_files)
                        .await?;
                    images.push(image.clone());
                    ImgAction::Rewrite(image)
                }
                ImageSource::Stored { id } => {
                    let id: i64 = id
                        .parse()
                        .map_err(|_| AppError::Validation(format!("Invalid image id: {}", id)))?;

                    let image = self
                        .repo
                        .find_image_tx(conn, user_id, id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Image", id))?;

                    if !images.iter().any(|i| i.id == id) {
                        images.push(image);
                    }
                    if !previously_known_ids.contains(&id) {
                        previously_known_ids.push(id);
                    }
                    ImgAction::Keep
                }
                ImageSource::Remote => ImgAction::Keep,
                ImageSource::Unknown => {
                    tracing::debug!("Dropping unknown image: {:?}", tag.src);
                    ImgAction::Remove
                }
            };
            actions.push(action);
        }

        let html = rewrite_images(html, &actions)?;

        Ok(ExtractedImages {
            html,
            images,
            previously_known_ids,
            written_files: Vec::new(),
        })
    }

    async fn store_inline(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        src: &str,
        large_image: Option<&str>,
        written_files: &mut Vec<String>,
    ) -> Result<Image> {
        let names = self.store.generate_names(user_id);

        self.store
            .save_jpeg(
                &names.initial,
                decode_data_uri(src)?,
                MAX_INITIAL_IMAGE_WIDTH,
                MAX_INITIAL_IMAGE_HEIGHT,
            )
            .await?;
        written_files.push(names.initial.clone());

        let large_name = match large_image {
            Some(uri) => {
                self.store
                    .save_jpeg(
                        &names.large,
                        decode_data_uri(uri)?,
                        MAX_LARGE_IMAGE_WIDTH,
                        MAX_LARGE_IMAGE_HEIGHT,
                    )
                    .await?;
                written_files.push(names.large.clone());
                Some(names.large)
            }
            None => None,
        };

        self.repo
            .insert_image_tx(conn, user_id, &names.initial, large_name.as_deref())
            .await
    }

    /// Delete every image in `previously_known_ids` that is no longer in
    /// `current_images`, files first, then the record.
    pub async fn clear_orphaned(
        &self,
        user_id: i64,
        previously_known_ids: &[i64],
        current_images: &[Image],
    ) -> Result<usize> {
        let mut seen = HashSet::new();
        let orphaned: Vec<i64> = previously_known_ids
            .iter()
            .copied()
            .filter(|id| !current_images.iter().any(|image| image.id == *id))
            .filter(|id| seen.insert(*id))
            .collect();

        if orphaned.is_empty() {
            return Ok(0);
        }

        let cleared = self.purge(user_id, &orphaned).await?;
        tracing::info!("Cleared {} orphaned images for user {}", cleared, user_id);

        Ok(cleared)
    }

    /// Hard-delete images and their files
    pub async fn purge(&self, user_id: i64, ids: &[i64]) -> Result<usize> {
        let images = self.repo.find_images_by_ids(user_id, ids).await?;

        let mut purged = 0;
        for image in &images {
            self.delete_files(image).await;
            if self.repo.delete_image(image.id).await? {
                purged += 1;
            }
        }

        Ok(purged)
    }

    /// Remove files written by an extraction that was not committed
    pub async fn discard_files(&self, names: &[String]) {
        for name in names {
            if let Err(e) = self.store.delete(name).await {
                tracing::warn!("Failed to discard image file {}: {}", name, e);
            }
        }
    }

    pub async fn mark_removed_by_note_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        note_id: i64,
    ) -> Result<u64> {
        self.repo
            .set_note_images_removed_tx(conn, user_id, note_id, Some(Utc::now()))
            .await
    }

    pub async fn restore_by_note_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        note_id: i64,
    ) -> Result<u64> {
        self.repo
            .set_note_images_removed_tx(conn, user_id, note_id, None)
            .await
    }

    async fn delete_files(&self, image: &Image) {
        let names = std::iter::once(&image.file_name).chain(image.large_image.as_ref());
        for name in names {
            if let Err(e) = self.store.delete(name).await {
                tracing::warn!("Failed to delete image file {}: {}", name, e);
            }
        }
    }
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let payload = uri
        .strip_prefix(JPEG_DATA_URI_PREFIX)
        .map(|rest| rest.trim_start_matches(','))
        .unwrap_or(uri);

    Ok(STANDARD.decode(payload.trim())?)
}

/// Collect the attributes of every `<img>` in document order
fn scan_images(html: &str) -> Result<Vec<ImgTag>> {
    let mut tags = Vec::new();

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img", |el| {
                tags.push(ImgTag {
                    id: el.get_attribute("id"),
                    src: el.get_attribute("src"),
                    large_image: el.get_attribute("largeimage"),
                });
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )?;

    Ok(tags)
}

/// Apply one action per `<img>`, in the order `scan_images` found them,
/// and unwrap `<html>`, `<head>` and `<body>`.
fn rewrite_images(html: &str, actions: &[ImgAction]) -> Result<String> {
    let mut index = 0;

    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("img", |el| {
                    match actions.get(index) {
                        Some(ImgAction::Remove) => el.remove(),
                        Some(ImgAction::Rewrite(image)) => {
                            el.set_attribute("src", &image.file_name)?;
                            el.set_attribute("id", &image.id.to_string())?;
                            match &image.large_image {
                                Some(large) => el.set_attribute("largeimage", large)?,
                                None => el.remove_attribute("largeimage"),
                            }
                        }
                        Some(ImgAction::Keep) | None => {}
                    }
                    index += 1;
                    Ok(())
                }),
                element!("html, head, body", |el| {
                    el.remove_and_keep_content();
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::*;
    use crate::database::User;
    use crate::storage::image_store::sample_jpeg;
    use tempfile::TempDir;

    async fn create_test_service() -> (ImagesService, Repository, User, TempDir) {
        let (repo, user) = create_test_repo_with_user().await;
        let temp_dir = TempDir::new().unwrap();
        let store = ImageStore::new(temp_dir.path().join("image_files"));
        store.initialize().await.unwrap();
        (ImagesService::new(repo.clone(), store), repo, user, temp_dir)
    }

    fn data_uri(width: u32, height: u32) -> String {
        format!(
            "{},{}",
            JPEG_DATA_URI_PREFIX,
            STANDARD.encode(sample_jpeg(width, height))
        )
    }

    fn stored_files(service: &ImagesService) -> usize {
        std::fs::read_dir(service.store().root()).unwrap().count()
    }

    fn tag(id: Option<&str>, src: &str, large: Option<&str>) -> ImgTag {
        ImgTag {
            id: id.map(String::from),
            src: Some(src.to_string()),
            large_image: large.map(String::from),
        }
    }

    #[test]
    fn test_classify() {
        let inline = tag(None, "data:image/jpeg;base64,AAAA", None);
        assert!(matches!(classify(&inline), ImageSource::Inline { large_image: None, .. }));

        let png_large = tag(None, "data:image/jpeg;base64,AAAA", Some("data:image/png;base64,AA"));
        assert_eq!(classify(&png_large), ImageSource::Unknown);

        let stored = tag(Some("4"), "/images/large_1_1700000000000.jpg", None);
        assert_eq!(classify(&stored), ImageSource::Stored { id: "4" });

        let stored_without_id = tag(None, "1_1700000000000.jpg", None);
        assert_eq!(classify(&stored_without_id), ImageSource::Unknown);

        let remote = tag(None, "https://example.com/cat.png", None);
        assert_eq!(classify(&remote), ImageSource::Remote);

        let relative = tag(None, "/static/cat.png", None);
        assert_eq!(classify(&relative), ImageSource::Unknown);

        assert_eq!(classify(&ImgTag::default()), ImageSource::Unknown);
    }

    #[tokio::test]
    async fn test_inline_image_is_stored_and_rewritten() {
        let (service, repo, user, _temp) = create_test_service().await;
        let html = format!(r#"<p>Graph</p><img src="{}">"#, data_uri(1000, 500));

        let mut conn = repo.acquire().await.unwrap();
        let extracted = service.extract(&mut conn, user.id, &html, &[]).await.unwrap();

        assert_eq!(extracted.images.len(), 1);
        let image = &extracted.images[0];
        assert!(image.large_image.is_none());
        assert!(extracted.html.contains(&format!(r#"src="{}""#, image.file_name)));
        assert!(extracted.html.contains(&format!(r#"id="{}""#, image.id)));
        assert!(extracted.html.starts_with("<p>Graph</p>"));
        assert_eq!(extracted.written_files, vec![image.file_name.clone()]);
        assert!(extracted.previously_known_ids.is_empty());

        let saved = image::open(service.store().root().join(&image.file_name)).unwrap();
        assert_eq!((saved.width(), saved.height()), (800, 600));
    }

    #[tokio::test]
    async fn test_inline_image_with_large_variant() {
        let (service, repo, user, _temp) = create_test_service().await;
        let html = format!(
            r#"<img src="{}" largeimage="{}">"#,
            data_uri(40, 30),
            data_uri(2000, 1500)
        );

        let mut conn = repo.acquire().await.unwrap();
        let extracted = service.extract(&mut conn, user.id, &html, &[]).await.unwrap();

        let image = &extracted.images[0];
        let large = image.large_image.clone().unwrap();
        assert!(large.starts_with("large_"));
        assert!(extracted.html.contains(&format!(r#"largeimage="{}""#, large)));
        assert_eq!(extracted.written_files.len(), 2);

        let saved = image::open(service.store().root().join(&large)).unwrap();
        assert_eq!((saved.width(), saved.height()), (1600, 1200));
    }

    #[tokio::test]
    async fn test_remote_image_passes_through() {
        let (service, repo, user, _temp) = create_test_service().await;
        let html = r#"<p><img src="https://example.com/cat.png" alt="cat"></p>"#;

        let mut conn = repo.acquire().await.unwrap();
        let extracted = service.extract(&mut conn, user.id, html, &[]).await.unwrap();

        assert_eq!(extracted.html, html);
        assert!(extracted.images.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_images_are_stripped() {
        let (service, repo, user, _temp) = create_test_service().await;
        let html = r#"<p>a</p><img src="/static/cat.png"><img id="3" src="data:image/jpeg;base64,AAAA"><p>b</p>"#;

        let mut conn = repo.acquire().await.unwrap();
        let extracted = service.extract(&mut conn, user.id, html, &[]).await.unwrap();

        assert_eq!(extracted.html, "<p>a</p><p>b</p>");
        assert!(extracted.images.is_empty());
    }

    #[tokio::test]
    async fn test_document_wrappers_are_removed() {
        let (service, repo, user, _temp) = create_test_service().await;
        let html = "<html><head></head><body><p>Plain</p></body></html>";

        let mut conn = repo.acquire().await.unwrap();
        let extracted = service.extract(&mut conn, user.id, html, &[]).await.unwrap();

        assert_eq!(extracted.html, "<p>Plain</p>");
    }

    #[tokio::test]
    async fn test_stored_image_is_confirmed() {
        let (service, repo, user, _temp) = create_test_service().await;
        let mut conn = repo.acquire().await.unwrap();

        let first = service
            .extract(&mut conn, user.id, &format!(r#"<img src="{}">"#, data_uri(10, 10)), &[])
            .await
            .unwrap();
        let image = first.images[0].clone();

        let html = format!(r#"<img id="{}" src="/image_files/{}">"#, image.id, image.file_name);
        let second = service.extract(&mut conn, user.id, &html, &[]).await.unwrap();

        assert_eq!(second.html, html);
        assert_eq!(second.images, vec![image.clone()]);
        assert_eq!(second.previously_known_ids, vec![image.id]);
        assert!(second.written_files.is_empty());
    }

    #[tokio::test]
    async fn test_missing_stored_image_fails() {
        let (service, repo, user, _temp) = create_test_service().await;
        let mut conn = repo.acquire().await.unwrap();

        let result = service
            .extract(&mut conn, user.id, r#"<img id="42" src="1_1700000000000.jpg">"#, &[])
            .await;

        assert!(matches!(
            result,
            Err(AppError::NotFound { entity: "Image", id: 42 })
        ));
    }

    #[tokio::test]
    async fn test_failed_extraction_removes_written_files() {
        let (service, repo, user, _temp) = create_test_service().await;
        let html = format!(
            r#"<img src="{}"><img src="data:image/jpeg;base64,bm90IGEganBlZw==">"#,
            data_uri(10, 10)
        );

        let mut conn = repo.acquire().await.unwrap();
        let result = service.extract(&mut conn, user.id, &html, &[]).await;

        assert!(matches!(result, Err(AppError::Image(_))));
        assert_eq!(stored_files(&service), 0);
    }

    #[tokio::test]
    async fn test_clear_orphaned_deletes_once() {
        let (service, repo, user, _temp) = create_test_service().await;
        let html = format!(
            r#"<img src="{}" largeimage="{}"><img src="{}">"#,
            data_uri(10, 10),
            data_uri(20, 20),
            data_uri(10, 10)
        );

        let mut conn = repo.acquire().await.unwrap();
        let extracted = service.extract(&mut conn, user.id, &html, &[]).await.unwrap();
        drop(conn);
        assert_eq!(stored_files(&service), 3);

        let orphan = extracted.images[0].id;
        let kept = extracted.images[1].clone();

        let cleared = service
            .clear_orphaned(user.id, &[orphan, kept.id, orphan], &[kept.clone()])
            .await
            .unwrap();

        assert_eq!(cleared, 1);
        assert_eq!(stored_files(&service), 1);
        assert!(service.store().exists(&kept.file_name).await.unwrap());
        let remaining = repo.find_images_by_ids(user.id, &[orphan, kept.id]).await.unwrap();
        assert_eq!(remaining, vec![kept]);
    }
}
