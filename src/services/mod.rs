pub mod aggregation;
pub mod enrichment;
pub mod history;
pub mod ingest;
pub mod pipeline;
pub mod providers;
pub mod recommendations;
pub mod retry;
pub mod weekly;

pub use enrichment::{Enricher, EnrichmentReport, EnrichmentStats};
pub use history::{read_history, AppendOutcome, AppendReport, BootstrapReport, HistoryBuilder};
pub use ingest::{BackfillReport, FetchedSnapshot, SnapshotFetcher};
pub use pipeline::{Pipeline, PipelineReport};
pub use providers::{AppleBooksLookup, BookLookup, ListProvider, NytListProvider};
pub use recommendations::{build_recommendations, RecommendationEngine, RecommendationService};
pub use retry::RetryPolicy;
pub use weekly::{build_weekly_view, WeeklyView};
