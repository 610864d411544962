use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    config::Config,
    db::blob::{
        keys::{
            latest_snapshot_key, raw_historical_key, raw_weekly_key, RAW_HISTORICAL_PREFIX,
            RAW_WEEKLY_PREFIX,
        },
        BlobStore, Precondition,
    },
    error::{AppError, AppResult},
    models::RawSnapshot,
    services::{
        providers::ListProvider,
        retry::{retry_rate_limited, RetryPolicy},
    },
};

/// Reads and parses a raw snapshot
pub async fn load_snapshot(store: &dyn BlobStore, key: &str) -> AppResult<RawSnapshot> {
    let object = store.get(key).await?;
    parse_snapshot(key, &object.bytes)
}

/// The most recent weekly snapshot, by the timestamp embedded in its key
pub async fn latest_weekly_snapshot(store: &dyn BlobStore) -> AppResult<(String, RawSnapshot)> {
    let keys = store.list(RAW_WEEKLY_PREFIX).await?;
    let key = latest_snapshot_key(&keys)?.to_string();
    let snapshot = load_snapshot(store, &key).await?;
    Ok((key, snapshot))
}

fn parse_snapshot(source: &str, bytes: &[u8]) -> AppResult<RawSnapshot> {
    serde_json::from_slice(bytes).map_err(|e| {
        tracing::error!(source = %source, error = %e, "Malformed raw snapshot");
        AppError::Serialization(e)
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchedSnapshot {
    pub key: String,
    pub uri: String,
    pub week: NaiveDate,
    pub books: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    /// Keys written by this run
    pub saved: Vec<String>,
    /// Weeks already stored and therefore not fetched again
    pub already_stored: Vec<NaiveDate>,
    /// Weeks that stayed rate limited after every attempt
    pub skipped: Vec<NaiveDate>,
}

/// Pulls raw list snapshots from the list provider into the store
///
/// Upstream bodies are stored verbatim after checking they parse as a
/// snapshot. Stored snapshots are never overwritten.
#[derive(Clone)]
pub struct SnapshotFetcher {
    store: Arc<dyn BlobStore>,
    provider: Arc<dyn ListProvider>,
    list_name: String,
    retry: RetryPolicy,
}

impl SnapshotFetcher {
    pub fn new(
        store: Arc<dyn BlobStore>,
        provider: Arc<dyn ListProvider>,
        list_name: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            provider,
            list_name,
            retry,
        }
    }

    pub fn from_config(
        store: Arc<dyn BlobStore>,
        provider: Arc<dyn ListProvider>,
        config: &Config,
    ) -> Self {
        Self::new(
            store,
            provider,
            config.list_name.clone(),
            RetryPolicy::new(config.list_max_attempts, config.list_backoff()),
        )
    }

    /// Fetches the current list and stores it under a timestamped weekly key
    pub async fn fetch_weekly(&self) -> AppResult<FetchedSnapshot> {
        self.fetch_weekly_at(Utc::now().naive_utc()).await
    }

    pub async fn fetch_weekly_at(&self, fetched_at: NaiveDateTime) -> AppResult<FetchedSnapshot> {
        let body = retry_rate_limited(self.retry, "current_list", || {
            self.provider.current_list(&self.list_name)
        })
        .await?;

        let key = raw_weekly_key(&self.list_name, fetched_at);
        let snapshot = parse_snapshot(&key, body.as_bytes())?;
        let uri = self
            .store
            .put(&key, body.into_bytes(), Precondition::DoesNotExist)
            .await?;

        tracing::info!(
            key = %key,
            week = %snapshot.published_date(),
            books = snapshot.results.books.len(),
            provider = self.provider.name(),
            "Saved weekly snapshot"
        );

        Ok(FetchedSnapshot {
            key,
            uri,
            week: snapshot.published_date(),
            books: snapshot.results.books.len(),
        })
    }

    /// Fetches the lists of the last `weeks_back` weeks into the historical prefix
    pub async fn fetch_historical(&self, weeks_back: u32) -> AppResult<BackfillReport> {
        self.fetch_historical_from(Utc::now().date_naive(), weeks_back)
            .await
    }

    /// Walks back one week at a time from `today`
    ///
    /// A week that is still rate limited after every attempt is skipped; any
    /// other upstream failure aborts the backfill.
    pub async fn fetch_historical_from(
        &self,
        today: NaiveDate,
        weeks_back: u32,
    ) -> AppResult<BackfillReport> {
        let existing: HashSet<String> = self
            .store
            .list(RAW_HISTORICAL_PREFIX)
            .await?
            .into_iter()
            .collect();
        let mut report = BackfillReport::default();

        for i in 0..weeks_back {
            let date = today - Duration::weeks(i64::from(i));
            let key = raw_historical_key(&self.list_name, date);

            if existing.contains(&key) {
                tracing::debug!(date = %date, key = %key, "Historical week already stored");
                report.already_stored.push(date);
                continue;
            }

            let body = match retry_rate_limited(self.retry, "list_for_date", || {
                self.provider.list_for_date(&self.list_name, date)
            })
            .await
            {
                Ok(body) => body,
                Err(e) if e.is_rate_limited() => {
                    tracing::warn!(date = %date, "Could not fetch week after retries, continuing");
                    report.skipped.push(date);
                    continue;
                }
                Err(e) => return Err(e),
            };

            parse_snapshot(&key, body.as_bytes())?;
            self.store
                .put(&key, body.into_bytes(), Precondition::DoesNotExist)
                .await?;
            report.saved.push(key);
        }

        tracing::info!(
            saved = report.saved.len(),
            already_stored = report.already_stored.len(),
            skipped = report.skipped.len(),
            "Historical backfill finished"
        );

        Ok(report)
    }
}
