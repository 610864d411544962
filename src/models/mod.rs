use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

pub mod enrichment;
pub mod history;
pub mod recommendation;

pub use enrichment::{EnrichedRow, EnrichmentFields, LookupRecord, WeeklyRow, WEEKLY_COLUMNS};
pub use history::{HistoryRow, HistoryTable, HISTORY_COLUMNS};
pub use recommendation::{
    Category, CategoryMetrics, ConsistentMetrics, FastMoverMetrics, MomentumMetrics,
    RecommendationRow, RecommendationTable,
};

/// Treats an explicit JSON `null` the same as a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// NYT Books API Types
// ============================================================================

/// One weekly list response as returned by `lists/{date}/{list}.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub results: ListResults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResults {
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    /// Week identity of the list
    pub published_date: NaiveDate,
    pub bestsellers_date: NaiveDate,
    #[serde(default, deserialize_with = "null_as_default")]
    pub books: Vec<Book>,
}

/// A single ranked entry of a weekly list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub rank: u32,
    /// 0 when the title was not ranked the previous week
    #[serde(default)]
    pub rank_last_week: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub weeks_on_list: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub primary_isbn13: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub publisher: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub amazon_product_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub book_image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

impl RawSnapshot {
    pub fn published_date(&self) -> NaiveDate {
        self.results.published_date
    }

    /// Flattens the list into history rows stamped with the list's week identity
    pub fn to_history_rows(&self) -> Vec<HistoryRow> {
        let results = &self.results;
        results
            .books
            .iter()
            .map(|book| HistoryRow {
                published_date: results.published_date,
                bestsellers_date: results.bestsellers_date,
                list_name: results.display_name.clone(),
                title: book.title.clone(),
                author: book.author.clone(),
                primary_isbn13: book.primary_isbn13.clone(),
                publisher: book.publisher.clone(),
                rank: book.rank,
                rank_last_week: book.rank_last_week,
                weeks_on_list: book.weeks_on_list,
                amazon_product_url: book.amazon_product_url.clone(),
                book_image: book.book_image.clone(),
                description: book.description.clone(),
            })
            .collect()
    }

    /// Flattens the list into the transient weekly view used for enrichment
    pub fn to_weekly_rows(&self) -> Vec<WeeklyRow> {
        let week = self.results.published_date;
        self.results
            .books
            .iter()
            .map(|book| WeeklyRow {
                week,
                rank: book.rank,
                title: book.title.clone(),
                author: book.author.clone(),
                isbn13: book.primary_isbn13.clone(),
                publisher: book.publisher.clone(),
                description: book.description.clone(),
                amazon_url: book.amazon_product_url.clone(),
            })
            .collect()
    }
}

// ============================================================================
// Apple Books (iTunes Search) API Types
// ============================================================================

/// Search response from the iTunes search endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItunesSearchResponse {
    #[serde(default)]
    pub result_count: u32,
    #[serde(default)]
    pub results: Vec<ItunesItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItunesItem {
    #[serde(default)]
    pub track_name: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub track_price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub average_user_rating: Option<f64>,
    #[serde(default)]
    pub user_rating_count: Option<u64>,
    #[serde(default)]
    pub track_view_url: Option<String>,
}

impl From<ItunesItem> for LookupRecord {
    fn from(item: ItunesItem) -> Self {
        // A zero list price is treated as missing and the track price used instead
        let price = item
            .price
            .filter(|p| *p != 0.0)
            .or(item.track_price);

        LookupRecord {
            title: item.track_name,
            author: item.artist_name,
            price,
            currency: item.currency,
            rating: item.average_user_rating,
            rating_count: item.user_rating_count,
            store_link: item.track_view_url,
        }
    }
}
