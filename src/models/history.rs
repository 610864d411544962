use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::AppResult;

/// Header of the historical table, in column order
pub const HISTORY_COLUMNS: [&str; 13] = [
    "published_date",
    "bestsellers_date",
    "list_name",
    "title",
    "author",
    "primary_isbn13",
    "publisher",
    "rank",
    "rank_last_week",
    "weeks_on_list",
    "amazon_product_url",
    "book_image",
    "description",
];

/// One (week, title, author) observation of the historical table
///
/// Field order matches [`HISTORY_COLUMNS`]; the CSV codec relies on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRow {
    pub published_date: NaiveDate,
    pub bestsellers_date: NaiveDate,
    pub list_name: String,
    pub title: String,
    pub author: String,
    pub primary_isbn13: String,
    pub publisher: String,
    pub rank: u32,
    /// `Some(0)` marks a new entrant; `None` means the table lacks the value
    pub rank_last_week: Option<u32>,
    pub weeks_on_list: u32,
    pub amazon_product_url: String,
    pub book_image: String,
    pub description: String,
}

impl HistoryRow {
    /// Key used by the bulk backfill to drop repeated observations
    pub fn dedup_key(&self) -> (NaiveDate, &str, &str) {
        (self.published_date, &self.title, &self.author)
    }
}

/// The append-only historical table, held in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryTable {
    rows: Vec<HistoryRow>,
}

impl HistoryTable {
    pub fn new(rows: Vec<HistoryRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[HistoryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Week keys present in the table
    pub fn weeks(&self) -> BTreeSet<NaiveDate> {
        self.rows.iter().map(|row| row.published_date).collect()
    }

    pub fn contains_week(&self, week: NaiveDate) -> bool {
        self.rows.iter().any(|row| row.published_date == week)
    }

    /// Parses a table from CSV bytes; an empty body is an empty table
    pub fn from_csv(bytes: &[u8]) -> AppResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.deserialize::<HistoryRow>() {
            rows.push(record?);
        }

        Ok(Self { rows })
    }

    /// Serializes the full table, header first
    pub fn to_csv(&self) -> AppResult<Vec<u8>> {
        encode_rows(&self.rows, true)
    }
}

/// Encodes rows as CSV, optionally preceded by the header row
///
/// Writing a body without a header lets new rows be appended after existing
/// bytes without re-encoding them.
pub fn encode_rows(rows: &[HistoryRow], with_header: bool) -> AppResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    if with_header {
        writer.write_record(HISTORY_COLUMNS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| crate::error::AppError::Internal(format!("CSV flush failed: {}", e)))
}
