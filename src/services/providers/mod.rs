/// Upstream data collaborators
///
/// The list provider supplies raw weekly bestseller lists; the book lookup
/// supplies secondary pricing and rating data for the enrichment step. Both
/// sit behind traits so the pipeline can run against stubs.
use chrono::NaiveDate;
use reqwest::{Response, StatusCode};

use crate::{
    error::{AppError, AppResult},
    models::LookupRecord,
};

pub mod apple_books;
pub mod nyt;

pub use apple_books::AppleBooksLookup;
pub use nyt::NytListProvider;

/// Source of raw weekly bestseller lists
///
/// Bodies are returned verbatim so stored snapshots are exact copies of what
/// the upstream sent.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ListProvider: Send + Sync {
    /// Fetch the current list
    async fn current_list(&self, list_name: &str) -> AppResult<String>;

    /// Fetch the list as published for a given date
    async fn list_for_date(&self, list_name: &str, date: NaiveDate) -> AppResult<String>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Secondary metadata lookup used by enrichment
///
/// `Ok(None)` means the upstream answered but had no match.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BookLookup: Send + Sync {
    /// Look up a book by normalized identifier (ISBN-13)
    async fn by_identifier(&self, identifier: &str) -> AppResult<Option<LookupRecord>>;

    /// Look up a book by free-text query
    async fn by_query(&self, query: &str) -> AppResult<Option<LookupRecord>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Maps non-success responses onto the upstream error taxonomy
pub(crate) async fn check_status(provider: &str, response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::UpstreamRateLimited(format!(
            "{} returned status {}",
            provider, status
        )));
    }

    Err(AppError::Upstream(format!(
        "{} returned status {}: {}",
        provider, status, body
    )))
}
