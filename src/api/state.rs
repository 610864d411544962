use std::sync::Arc;

use crate::{
    config::Config,
    db::BlobStore,
    services::{
        providers::{BookLookup, ListProvider},
        Pipeline,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn BlobStore>,
        lists: Arc<dyn ListProvider>,
        lookup: Arc<dyn BookLookup>,
    ) -> Self {
        let pipeline = Pipeline::new(&config, store, lists, lookup);
        Self {
            config: Arc::new(config),
            pipeline,
        }
    }

    pub fn store(&self) -> &dyn BlobStore {
        self.pipeline.store().as_ref()
    }
}
