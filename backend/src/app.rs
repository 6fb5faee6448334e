//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::AppConfig;
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::services::{ImagesService, NotesService, ReviewScheduler, TagsService};
use crate::storage::ImageStore;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub repo: Repository,
    pub notes_service: NotesService,
    pub tags_service: TagsService,
    pub images_service: ImagesService,
}

impl AppState {
    /// Wire services around an existing repository and image store
    pub fn new(config: AppConfig, repo: Repository, image_store: ImageStore) -> Self {
        let tags_service = TagsService::new(repo.clone());
        let images_service = ImagesService::new(repo.clone(), image_store);
        let notes_service = NotesService::new(
            repo.clone(),
            tags_service.clone(),
            images_service.clone(),
            ReviewScheduler::new(),
        );

        Self {
            config,
            repo,
            notes_service,
            tags_service,
            images_service,
        }
    }

    /// Create directories, open the database and build the services
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        tracing::info!("Initializing application");
        tracing::info!("Data directory: {:?}", config.data_dir);

        tokio::fs::create_dir_all(&config.data_dir).await?;

        let pool = create_pool(&config.database_path).await?;
        let repo = Repository::new(pool);

        let image_store = ImageStore::new(config.image_dir.clone());
        image_store.initialize().await?;

        let state = Self::new(config, repo, image_store);

        tracing::info!("Application initialized successfully");

        Ok(state)
    }
}
