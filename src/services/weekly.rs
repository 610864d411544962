use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    db::blob::{keys::weekly_view_key, BlobStore, Precondition},
    error::AppResult,
    models::enrichment::weekly_to_csv,
    services::ingest::latest_weekly_snapshot,
};

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyView {
    pub snapshot_key: String,
    pub key: String,
    pub uri: String,
    pub week: NaiveDate,
    pub rows: usize,
}

/// Flattens the latest weekly snapshot into the weekly CSV view
///
/// The view is keyed by the list's week and rewritten on every call.
pub async fn build_weekly_view(store: &dyn BlobStore) -> AppResult<WeeklyView> {
    let (snapshot_key, snapshot) = latest_weekly_snapshot(store).await?;
    let week = snapshot.published_date();
    let rows = snapshot.to_weekly_rows();

    let key = weekly_view_key(week);
    let uri = store
        .put(&key, weekly_to_csv(&rows)?, Precondition::None)
        .await?;

    tracing::info!(
        snapshot = %snapshot_key,
        key = %key,
        rows = rows.len(),
        "Built weekly view"
    );

    Ok(WeeklyView {
        snapshot_key,
        key,
        uri,
        week,
        rows: rows.len(),
    })
}
