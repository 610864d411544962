use serde::Serialize;
use std::sync::Arc;

use crate::{
    config::Config,
    db::blob::{BlobStore, Precondition},
    error::AppResult,
    models::{
        enrichment::{enriched_to_csv, weekly_from_csv},
        EnrichedRow, EnrichmentFields, LookupRecord, WeeklyRow,
    },
    services::{
        providers::BookLookup,
        retry::{retry_rate_limited, RetryPolicy},
    },
};

/// Uppercased alphanumerics of an ISBN-like string ("978-0-59..." -> "9780...")
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// "title author" query used when the identifier finds nothing
pub fn fallback_query(title: &str, author: &str) -> Option<String> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    Some(format!("{} {}", title, author.trim()).trim_end().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Matched,
    NoMatch,
    /// Abandoned after the lookup stayed rate limited
    Degraded,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EnrichmentStats {
    pub rows: usize,
    pub matched: usize,
    pub absent: usize,
    pub degraded: usize,
}

impl EnrichmentStats {
    fn record(&mut self, outcome: RowOutcome) {
        self.rows += 1;
        match outcome {
            RowOutcome::Matched => self.matched += 1,
            RowOutcome::NoMatch => self.absent += 1,
            RowOutcome::Degraded => {
                self.absent += 1;
                self.degraded += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentReport {
    pub input_key: String,
    pub output_key: String,
    pub uri: String,
    #[serde(flatten)]
    pub stats: EnrichmentStats,
}

/// Joins weekly rows against the book lookup, one row at a time
#[derive(Clone)]
pub struct Enricher {
    lookup: Arc<dyn BookLookup>,
    retry: RetryPolicy,
}

impl Enricher {
    pub fn new(lookup: Arc<dyn BookLookup>, retry: RetryPolicy) -> Self {
        Self { lookup, retry }
    }

    pub fn from_config(lookup: Arc<dyn BookLookup>, config: &Config) -> Self {
        Self::new(
            lookup,
            RetryPolicy::new(config.lookup_max_attempts, config.lookup_backoff()),
        )
    }

    /// Enriches every row; output has exactly one row per input row, in order
    pub async fn enrich(
        &self,
        rows: Vec<WeeklyRow>,
    ) -> AppResult<(Vec<EnrichedRow>, EnrichmentStats)> {
        let mut stats = EnrichmentStats::default();
        let mut enriched = Vec::with_capacity(rows.len());

        for row in rows {
            let (fields, outcome) = self.enrich_row(&row).await?;
            stats.record(outcome);
            enriched.push(EnrichedRow::new(row, fields));
        }

        tracing::info!(
            rows = stats.rows,
            matched = stats.matched,
            absent = stats.absent,
            degraded = stats.degraded,
            provider = self.lookup.name(),
            "Enrichment finished"
        );

        Ok((enriched, stats))
    }

    /// Identifier lookup first, then at most one title/author fallback
    ///
    /// A lookup that stays rate limited abandons the row with absent fields.
    /// Any other upstream failure is returned and aborts the run.
    async fn enrich_row(&self, row: &WeeklyRow) -> AppResult<(EnrichmentFields, RowOutcome)> {
        let identifier = normalize_identifier(&row.isbn13);

        let mut record: Option<LookupRecord> = None;
        if !identifier.is_empty() {
            match retry_rate_limited(self.retry, "lookup_by_identifier", || {
                self.lookup.by_identifier(&identifier)
            })
            .await
            {
                Ok(found) => record = found,
                Err(e) if e.is_rate_limited() => return Ok(Self::degraded(row)),
                Err(e) => return Err(e),
            }
        }

        if record.is_none() {
            if let Some(query) = fallback_query(&row.title, &row.author) {
                match retry_rate_limited(self.retry, "lookup_by_query", || {
                    self.lookup.by_query(&query)
                })
                .await
                {
                    Ok(found) => record = found,
                    Err(e) if e.is_rate_limited() => return Ok(Self::degraded(row)),
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(match record {
            Some(record) => (EnrichmentFields::from(&record), RowOutcome::Matched),
            None => {
                tracing::debug!(title = %row.title, isbn = %row.isbn13, "No lookup match");
                (EnrichmentFields::absent(), RowOutcome::NoMatch)
            }
        })
    }

    fn degraded(row: &WeeklyRow) -> (EnrichmentFields, RowOutcome) {
        tracing::warn!(
            title = %row.title,
            isbn = %row.isbn13,
            "Lookup still rate limited, marking row absent"
        );
        (EnrichmentFields::absent(), RowOutcome::Degraded)
    }

    /// Reads a weekly CSV, enriches it, and writes the enriched CSV
    pub async fn enrich_weekly_file(
        &self,
        store: &dyn BlobStore,
        input_key: &str,
        output_key: &str,
    ) -> AppResult<EnrichmentReport> {
        let input = store.get(input_key).await?;
        let rows = weekly_from_csv(&input.bytes)?;

        let (enriched, stats) = self.enrich(rows).await?;
        let uri = store
            .put(output_key, enriched_to_csv(&enriched)?, Precondition::None)
            .await?;

        tracing::info!(input = %input_key, output = %output_key, "Wrote enriched weekly view");

        Ok(EnrichmentReport {
            input_key: input_key.to_string(),
            output_key: output_key.to_string(),
            uri,
            stats,
        })
    }
}
