use serde::Serialize;
use std::sync::Arc;

use crate::{
    config::Config,
    db::blob::{keys::enriched_key, BlobStore},
    error::AppResult,
    services::{
        enrichment::{Enricher, EnrichmentReport},
        history::{AppendReport, HistoryBuilder},
        ingest::{FetchedSnapshot, SnapshotFetcher},
        providers::{BookLookup, ListProvider},
        recommendations::RecommendationService,
        weekly::{build_weekly_view, WeeklyView},
    },
};

/// Everything one weekly run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub raw: FetchedSnapshot,
    pub weekly: WeeklyView,
    pub enriched: EnrichmentReport,
    pub history: AppendReport,
    pub recommendations_key: String,
    pub recommendations: usize,
}

/// Wires the weekly batch steps together over one store
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn BlobStore>,
    fetcher: SnapshotFetcher,
    enricher: Enricher,
    history: HistoryBuilder,
    recommendations: RecommendationService,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        store: Arc<dyn BlobStore>,
        lists: Arc<dyn ListProvider>,
        lookup: Arc<dyn BookLookup>,
    ) -> Self {
        Self {
            fetcher: SnapshotFetcher::from_config(store.clone(), lists, config),
            enricher: Enricher::from_config(lookup, config),
            history: HistoryBuilder::new(store.clone()),
            recommendations: RecommendationService::new(store.clone()),
            store,
        }
    }

    pub fn fetcher(&self) -> &SnapshotFetcher {
        &self.fetcher
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }

    pub fn history(&self) -> &HistoryBuilder {
        &self.history
    }

    pub fn recommendations(&self) -> &RecommendationService {
        &self.recommendations
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Fetch, flatten, enrich, append to history, rebuild recommendations
    ///
    /// Steps run in order and the first failure aborts the run. A week that
    /// is already in the history is a successful run.
    pub async fn run(&self) -> AppResult<PipelineReport> {
        tracing::info!("Pipeline run started");

        let raw = self.fetcher.fetch_weekly().await?;
        let weekly = build_weekly_view(self.store.as_ref()).await?;

        let output_key = enriched_key(&weekly.key);
        let enriched = self
            .enricher
            .enrich_weekly_file(self.store.as_ref(), &weekly.key, &output_key)
            .await?;

        let history = self.history.append_latest_week().await?;
        let recommendations = self.recommendations.rebuild().await?;

        tracing::info!(
            raw = %raw.key,
            weekly = %weekly.key,
            enriched = %enriched.output_key,
            week = %history.outcome.week(),
            recommendations = recommendations.table.len(),
            "Pipeline run complete"
        );

        Ok(PipelineReport {
            raw,
            weekly,
            enriched,
            history,
            recommendations_key: recommendations.key,
            recommendations: recommendations.table.len(),
        })
    }
}
