use std::sync::Arc;

use crate::config::{Config, StoreKind};
use crate::db::FeedbackQueries;
use crate::db::memory::InMemoryFeedbackStore;
use crate::db::postgres::PostgresFeedbackStore;
use crate::db::postgrest::PostgrestFeedbackStore;
use crate::error::{Error, ErrorDetails};
use crate::storage::PhotoStorageInfo;

/// State shared by every handler. Built once at startup and never mutated.
#[derive(Clone)]
pub struct AppStateData {
    pub config: Arc<Config>,
    pub feedback_store: Arc<dyn FeedbackQueries + Send + Sync>,
    pub photo_storage: Arc<PhotoStorageInfo>,
}
pub type AppState = axum::extract::State<AppStateData>;

impl AppStateData {
    /// Connect to the configured store and photo storage.
    /// Credentials come from the environment.
    pub async fn new(config: Arc<Config>) -> Result<Self, Error> {
        let table = &config.store.table;
        let feedback_store: Arc<dyn FeedbackQueries + Send + Sync> = match config.store.kind {
            StoreKind::Postgrest => Arc::new(PostgrestFeedbackStore::from_env(table).map_err(
                |e| {
                    Error::new(ErrorDetails::AppState {
                        message: format!("Failed to set up the PostgREST store: {e}"),
                    })
                },
            )?),
            StoreKind::Postgres => Arc::new(PostgresFeedbackStore::from_env(table).await.map_err(
                |e| {
                    Error::new(ErrorDetails::AppState {
                        message: format!("Failed to connect to Postgres: {e}"),
                    })
                },
            )?),
            StoreKind::Memory => {
                tracing::warn!(
                    "Using the in-memory feedback store. Submitted feedback is lost when the gateway exits."
                );
                Arc::new(InMemoryFeedbackStore::new())
            }
        };
        let photo_storage = PhotoStorageInfo::new(&config.photo_storage)?;
        Ok(Self::new_with_store(config, feedback_store, photo_storage))
    }

    pub fn new_with_store(
        config: Arc<Config>,
        feedback_store: Arc<dyn FeedbackQueries + Send + Sync>,
        photo_storage: PhotoStorageInfo,
    ) -> Self {
        Self {
            config,
            feedback_store,
            photo_storage: Arc::new(photo_storage),
        }
    }
}
