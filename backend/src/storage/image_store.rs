//! Image file storage
//!
//! Stores the JPEG files referenced from note HTML under a single flat
//! directory. File names follow `<owner>_<millis>.jpg` for the inline
//! variant and `large_<owner>_<millis>.jpg` for the large one; the
//! timestamp part is kept strictly increasing per store so two images saved
//! in the same millisecond never share a name.

use crate::config::LARGE_IMAGE_PREFIX;
use crate::error::{AppError, Result};
use chrono::Utc;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File names generated for one stored image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFileNames {
    pub initial: String,
    pub large: String,
}

/// Flat directory of resized JPEG files
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
    last_stamp: Arc<AtomicI64>,
}

impl ImageStore {
    /// Create an image store at the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            last_stamp: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Initialize the image store (create directory if needed)
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        tracing::info!("Image store initialized at: {:?}", self.root);
        Ok(())
    }

    /// Reserve file names for a new image owned by `user_id`
    pub fn generate_names(&self, user_id: i64) -> ImageFileNames {
        let stamp = self.next_stamp();
        ImageFileNames {
            initial: format!("{}_{}.jpg", user_id, stamp),
            large: format!("{}{}_{}.jpg", LARGE_IMAGE_PREFIX, user_id, stamp),
        }
    }

    /// Decode a JPEG, shrink it to fit `max_width` x `max_height` and store it.
    ///
    /// Images larger than the box in either dimension are resized to exactly
    /// the box. The file appears atomically under `name`.
    pub async fn save_jpeg(
        &self,
        name: &str,
        data: Vec<u8>,
        max_width: u32,
        max_height: u32,
    ) -> Result<()> {
        let path = self.resolve(name)?;
        let label = name.to_string();

        let encoded = tokio::task::spawn_blocking(move || {
            fit_jpeg(&label, &data, max_width, max_height)
        })
        .await
        .map_err(|e| AppError::Generic(format!("Image task failed: {}", e)))??;

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&encoded).await?;
        file.sync_all().await?;

        fs::rename(temp_path, &path).await?;

        tracing::debug!("Wrote image: {} ({} bytes)", name, encoded.len());

        Ok(())
    }

    /// Check if an image file exists
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        Ok(fs::try_exists(path).await?)
    }

    /// Delete an image file; a missing file is not an error
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted image file: {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Get image store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a stored file, rejecting anything but a bare name
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let is_bare = !name.is_empty()
            && !name.contains('/')
            && !name.contains('\\')
            && !name.contains('\0')
            && name != "."
            && name != "..";

        if !is_bare {
            return Err(AppError::Validation(format!(
                "Invalid image file name: {:?}",
                name
            )));
        }

        Ok(self.root.join(name))
    }

    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }
}

fn fit_jpeg(label: &str, data: &[u8], max_width: u32, max_height: u32) -> Result<Vec<u8>> {
    let mut image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;

    let (width, height) = (image.width(), image.height());
    if width > max_width || height > max_height {
        tracing::debug!(
            "Resizing image {} from {}x{} to {}x{}",
            label,
            width,
            height,
            max_width,
            max_height
        );
        image = image.resize_exact(max_width, max_height, FilterType::Lanczos3);
    }

    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)?;

    Ok(encoded)
}

#[cfg(test)]
pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)
        .unwrap();
    encoded
}
