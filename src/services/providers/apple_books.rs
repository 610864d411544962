/// Apple Books lookup via the iTunes search endpoint
///
/// Both lookups hit the same endpoint with `media=ebook&entity=ebook`; the
/// identifier lookup passes the ISBN as the search term. The first result
/// is taken as the match.
use reqwest::Client as HttpClient;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{ItunesSearchResponse, LookupRecord},
    services::providers::{check_status, BookLookup},
};

const PROVIDER: &str = "apple_books";
const LOOKUP_CACHE_TTL: u64 = 604800; // 1 week
const RESULT_LIMIT: &str = "5";

#[derive(Clone)]
pub struct AppleBooksLookup {
    http_client: HttpClient,
    api_url: String,
    cache: Option<Cache>,
}

impl AppleBooksLookup {
    pub fn new(api_url: String, cache: Option<Cache>) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
            cache,
        }
    }

    async fn search(&self, term: &str) -> AppResult<Option<LookupRecord>> {
        let response = self
            .http_client
            .get(&self.api_url)
            .query(&[
                ("term", term),
                ("media", "ebook"),
                ("entity", "ebook"),
                ("limit", RESULT_LIMIT),
            ])
            .send()
            .await?;

        let search: ItunesSearchResponse = check_status(PROVIDER, response).await?.json().await?;
        let record = search.results.into_iter().next().map(LookupRecord::from);

        tracing::debug!(
            term = %term,
            result_count = search.result_count,
            matched = record.is_some(),
            provider = PROVIDER,
            "Lookup completed"
        );

        Ok(record)
    }

    async fn search_cached(&self, key: CacheKey, term: &str) -> AppResult<Option<LookupRecord>> {
        match &self.cache {
            Some(cache) => cached!(cache, key, LOOKUP_CACHE_TTL, self.search(term)),
            None => self.search(term).await,
        }
    }
}

#[async_trait::async_trait]
impl BookLookup for AppleBooksLookup {
    async fn by_identifier(&self, identifier: &str) -> AppResult<Option<LookupRecord>> {
        if identifier.is_empty() {
            return Err(AppError::InvalidInput(
                "Lookup identifier cannot be empty".to_string(),
            ));
        }

        self.search_cached(CacheKey::LookupByIdentifier(identifier.to_string()), identifier)
            .await
    }

    async fn by_query(&self, query: &str) -> AppResult<Option<LookupRecord>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput(
                "Lookup query cannot be empty".to_string(),
            ));
        }

        self.search_cached(CacheKey::LookupByQuery(query.to_string()), query)
            .await
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}
