// src/handlers/mod.rs
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::db::DbStore;
use crate::services::ingestion::RateIngestor;
use crate::services::notifications::MemoryNotifier;
use crate::services::rate_source::DocumentSource;

pub mod brokers;
pub mod calculator;
pub mod error;
pub mod rates;

/// Everything the HTTP handlers share.
pub struct AppState<S: DocumentSource> {
    pub config: AppConfig,
    pub store: Arc<DbStore>,
    pub ingestor: RateIngestor<S>,
    pub notifier: MemoryNotifier,
}

impl<S: DocumentSource> AppState<S> {
    pub fn new(config: AppConfig, store: Arc<DbStore>, source: S) -> Self {
        let ingestor = RateIngestor::from_config(source, store.clone(), &config);
        AppState {
            config,
            store,
            ingestor,
            notifier: MemoryNotifier::new(),
        }
    }
}
