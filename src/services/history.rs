use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    db::blob::{
        keys::{snapshot_timestamp, HISTORY_KEY, RAW_HISTORICAL_PREFIX},
        BlobStore, Precondition, StoredObject,
    },
    error::{AppError, AppResult},
    models::{history::encode_rows, HistoryRow, HistoryTable},
    services::ingest::{latest_weekly_snapshot, load_snapshot},
};

/// Result of an incremental append
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppendOutcome {
    Appended {
        week: NaiveDate,
        rows_added: usize,
        total_rows: usize,
    },
    /// The week was already in the table; nothing was written
    AlreadyPresent { week: NaiveDate },
}

impl AppendOutcome {
    pub fn week(&self) -> NaiveDate {
        match self {
            AppendOutcome::Appended { week, .. } | AppendOutcome::AlreadyPresent { week } => *week,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppendReport {
    pub history_key: String,
    pub snapshot_key: String,
    #[serde(flatten)]
    pub outcome: AppendOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub history_key: String,
    pub uri: String,
    pub snapshots: usize,
    pub rows: usize,
    pub duplicates_skipped: usize,
}

/// Reads the historical table; a missing table is an empty one
pub async fn read_history(store: &dyn BlobStore) -> AppResult<HistoryTable> {
    match store.get(HISTORY_KEY).await {
        Ok(object) => HistoryTable::from_csv(&object.bytes),
        Err(AppError::NotFound(_)) => Ok(HistoryTable::default()),
        Err(e) => Err(e),
    }
}

/// Maintains the append-only historical table
#[derive(Clone)]
pub struct HistoryBuilder {
    store: Arc<dyn BlobStore>,
}

impl HistoryBuilder {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Appends the most recent weekly snapshot unless its week is already present
    ///
    /// The write is conditional on the table being unchanged since it was
    /// read, so two concurrent runs cannot both append the same week.
    pub async fn append_latest_week(&self) -> AppResult<AppendReport> {
        let (snapshot_key, snapshot) = latest_weekly_snapshot(self.store.as_ref()).await?;
        let week = snapshot.published_date();
        let new_rows = snapshot.to_history_rows();

        tracing::info!(
            snapshot = %snapshot_key,
            week = %week,
            rows = new_rows.len(),
            "Selected latest raw snapshot"
        );

        let outcome = match self.try_append(week, &new_rows).await {
            Err(AppError::Conflict(msg)) => {
                // Lost a race; the winner may have appended this very week
                let current = read_history(self.store.as_ref()).await?;
                if current.contains_week(week) {
                    AppendOutcome::AlreadyPresent { week }
                } else {
                    return Err(AppError::Conflict(msg));
                }
            }
            other => other?,
        };

        match &outcome {
            AppendOutcome::Appended {
                rows_added,
                total_rows,
                ..
            } => tracing::info!(
                week = %week,
                rows_added,
                total_rows,
                "Appended week to history"
            ),
            AppendOutcome::AlreadyPresent { .. } => {
                tracing::info!(week = %week, "Week already present in history, skipping append")
            }
        }

        Ok(AppendReport {
            history_key: HISTORY_KEY.to_string(),
            snapshot_key,
            outcome,
        })
    }

    async fn try_append(&self, week: NaiveDate, new_rows: &[HistoryRow]) -> AppResult<AppendOutcome> {
        let existing = match self.store.get(HISTORY_KEY).await {
            Ok(object) => Some(object),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let (bytes, precondition, existing_rows) = match existing {
            Some(StoredObject { bytes, generation }) if !bytes.is_empty() => {
                let table = HistoryTable::from_csv(&bytes)?;
                if table.contains_week(week) {
                    return Ok(AppendOutcome::AlreadyPresent { week });
                }

                // Existing bytes are kept verbatim; only the new rows are encoded
                let mut combined = bytes;
                if !combined.ends_with(b"\n") {
                    combined.push(b'\n');
                }
                combined.extend(encode_rows(new_rows, false)?);
                (combined, Precondition::GenerationMatch(generation), table.len())
            }
            Some(StoredObject { generation, .. }) => (
                encode_rows(new_rows, true)?,
                Precondition::GenerationMatch(generation),
                0,
            ),
            None => (encode_rows(new_rows, true)?, Precondition::DoesNotExist, 0),
        };

        self.store.put(HISTORY_KEY, bytes, precondition).await?;

        Ok(AppendOutcome::Appended {
            week,
            rows_added: new_rows.len(),
            total_rows: existing_rows + new_rows.len(),
        })
    }

    /// Rebuilds the whole table from every historical snapshot
    ///
    /// Rows are deduplicated on (week, title, author), first occurrence wins.
    /// Snapshots are read oldest first.
    pub async fn bootstrap(&self) -> AppResult<BootstrapReport> {
        let mut snapshot_keys: Vec<(chrono::NaiveDateTime, String)> = Vec::new();
        for key in self.store.list(RAW_HISTORICAL_PREFIX).await? {
            match snapshot_timestamp(&key) {
                Some(ts) => snapshot_keys.push((ts, key)),
                None => tracing::warn!(key = %key, "Ignoring historical key without sortable date"),
            }
        }
        snapshot_keys.sort();

        if snapshot_keys.is_empty() {
            return Err(AppError::NotFound(
                "No historical raw snapshots found".to_string(),
            ));
        }

        let mut seen: HashSet<(NaiveDate, String, String)> = HashSet::new();
        let mut rows = Vec::new();
        let mut duplicates_skipped = 0;

        for (_, key) in &snapshot_keys {
            let snapshot = load_snapshot(self.store.as_ref(), key).await?;
            for row in snapshot.to_history_rows() {
                let (week, title, author) = row.dedup_key();
                if seen.insert((week, title.to_string(), author.to_string())) {
                    rows.push(row);
                } else {
                    duplicates_skipped += 1;
                }
            }
        }

        let table = HistoryTable::new(rows);
        let uri = self
            .store
            .put(HISTORY_KEY, table.to_csv()?, Precondition::None)
            .await?;

        tracing::info!(
            snapshots = snapshot_keys.len(),
            rows = table.len(),
            weeks = table.weeks().len(),
            duplicates_skipped,
            "Built history from historical snapshots"
        );

        Ok(BootstrapReport {
            history_key: HISTORY_KEY.to_string(),
            uri,
            snapshots: snapshot_keys.len(),
            rows: table.len(),
            duplicates_skipped,
        })
    }
}
