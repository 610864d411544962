use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Header of the weekly view
pub const WEEKLY_COLUMNS: [&str; 8] = [
    "week",
    "rank",
    "title",
    "author",
    "isbn13",
    "publisher",
    "description",
    "amazon_url",
];

/// Columns appended by enrichment; an empty cell is the absent marker
pub const ENRICHMENT_COLUMNS: [&str; 4] = [
    "apple_price",
    "apple_rating",
    "apple_ratings_count",
    "apple_store_link",
];

/// One row of the transient weekly view fed to enrichment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyRow {
    pub week: NaiveDate,
    pub rank: u32,
    pub title: String,
    pub author: String,
    pub isbn13: String,
    pub publisher: String,
    pub description: String,
    pub amazon_url: String,
}

/// Fields consumed from a lookup collaborator match
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LookupRecord {
    pub title: Option<String>,
    pub author: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<u64>,
    pub store_link: Option<String>,
}

/// The four enrichment columns; `None` is the explicit absent marker
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnrichmentFields {
    pub apple_price: Option<f64>,
    pub apple_rating: Option<f64>,
    pub apple_ratings_count: Option<u64>,
    pub apple_store_link: Option<String>,
}

impl EnrichmentFields {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        *self == Self::absent()
    }
}

impl From<&LookupRecord> for EnrichmentFields {
    fn from(record: &LookupRecord) -> Self {
        Self {
            apple_price: record.price,
            apple_rating: record.rating,
            apple_ratings_count: record.rating_count,
            apple_store_link: record.store_link.clone(),
        }
    }
}

/// A weekly row with the enrichment columns appended
///
/// Kept flat rather than nesting [`WeeklyRow`] so the CSV codec can encode it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedRow {
    pub week: NaiveDate,
    pub rank: u32,
    pub title: String,
    pub author: String,
    pub isbn13: String,
    pub publisher: String,
    pub description: String,
    pub amazon_url: String,
    pub apple_price: Option<f64>,
    pub apple_rating: Option<f64>,
    pub apple_ratings_count: Option<u64>,
    pub apple_store_link: Option<String>,
}

impl EnrichedRow {
    pub fn new(row: WeeklyRow, fields: EnrichmentFields) -> Self {
        Self {
            week: row.week,
            rank: row.rank,
            title: row.title,
            author: row.author,
            isbn13: row.isbn13,
            publisher: row.publisher,
            description: row.description,
            amazon_url: row.amazon_url,
            apple_price: fields.apple_price,
            apple_rating: fields.apple_rating,
            apple_ratings_count: fields.apple_ratings_count,
            apple_store_link: fields.apple_store_link,
        }
    }

    pub fn fields(&self) -> EnrichmentFields {
        EnrichmentFields {
            apple_price: self.apple_price,
            apple_rating: self.apple_rating,
            apple_ratings_count: self.apple_ratings_count,
            apple_store_link: self.apple_store_link.clone(),
        }
    }
}

/// Encodes rows under an explicit header, so an empty view still has one
fn encode_with_header<T: Serialize>(header: &[&str], rows: &[T]) -> AppResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV flush failed: {}", e)))
}

pub fn weekly_to_csv(rows: &[WeeklyRow]) -> AppResult<Vec<u8>> {
    encode_with_header(&WEEKLY_COLUMNS, rows)
}

pub fn weekly_from_csv(bytes: &[u8]) -> AppResult<Vec<WeeklyRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.deserialize::<WeeklyRow>() {
        rows.push(record?);
    }
    Ok(rows)
}

pub fn enriched_to_csv(rows: &[EnrichedRow]) -> AppResult<Vec<u8>> {
    let header: Vec<&str> = WEEKLY_COLUMNS
        .iter()
        .chain(ENRICHMENT_COLUMNS.iter())
        .copied()
        .collect();
    encode_with_header(&header, rows)
}
