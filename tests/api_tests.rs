use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::NaiveDate;
use serde_json::{json, Value};

use shelfwatch::{
    api::{create_router, AppState},
    db::{BlobStore, MemoryBlobStore},
    models::LookupRecord,
    services::{BookLookup, ListProvider},
    AppError, AppResult, Config,
};

const HISTORY_KEY: &str = "processed/history/nyt_history_weekly.csv";

fn list_body(week: &str, books: &[(&str, u32, u32)]) -> String {
    let books: Vec<Value> = books
        .iter()
        .map(|(title, rank, rank_last_week)| {
            json!({
                "rank": rank,
                "rank_last_week": rank_last_week,
                "weeks_on_list": 1,
                "title": title,
                "author": format!("{} Author", title),
                "primary_isbn13": "9780000000001",
                "publisher": "Bloom",
                "amazon_product_url": "https://amazon.example/a",
                "book_image": "",
                "description": "A novel."
            })
        })
        .collect();

    json!({
        "status": "OK",
        "results": {
            "display_name": "Hardcover Fiction",
            "published_date": week,
            "bestsellers_date": week,
            "books": books
        }
    })
    .to_string()
}

/// Serves a fixed current list; historical calls alternate between a
/// climbing latest week and an older week
#[derive(Default)]
struct StubLists {
    historical_calls: AtomicU32,
}

#[async_trait::async_trait]
impl ListProvider for StubLists {
    async fn current_list(&self, _list_name: &str) -> AppResult<String> {
        Ok(list_body("2024-02-11", &[("The Housemaid", 1, 0)]))
    }

    async fn list_for_date(&self, _list_name: &str, date: NaiveDate) -> AppResult<String> {
        let call = self.historical_calls.fetch_add(1, Ordering::SeqCst);
        let (rank, rank_last_week) = if call == 0 { (1, 3) } else { (3, 0) };
        Ok(list_body(
            &date.to_string(),
            &[("The Housemaid", rank, rank_last_week)],
        ))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

struct StubLookup {
    rate_limited: bool,
}

#[async_trait::async_trait]
impl BookLookup for StubLookup {
    async fn by_identifier(&self, _identifier: &str) -> AppResult<Option<LookupRecord>> {
        if self.rate_limited {
            return Err(AppError::UpstreamRateLimited("429".to_string()));
        }
        Ok(Some(LookupRecord {
            title: Some("The Housemaid".to_string()),
            author: Some("Freida McFadden".to_string()),
            price: Some(9.99),
            currency: Some("USD".to_string()),
            rating: Some(4.5),
            rating_count: Some(1200),
            store_link: Some("https://books.apple.com/1".to_string()),
        }))
    }

    async fn by_query(&self, _query: &str) -> AppResult<Option<LookupRecord>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

fn create_test_server_with(store: Arc<MemoryBlobStore>, lookup: StubLookup) -> TestServer {
    let state = AppState::new(
        Config::for_testing("unused"),
        store,
        Arc::new(StubLists::default()),
        Arc::new(lookup),
    );
    TestServer::new(create_router(state)).unwrap()
}

fn create_test_server(store: Arc<MemoryBlobStore>) -> TestServer {
    create_test_server_with(store, StubLookup { rate_limited: false })
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(Arc::new(MemoryBlobStore::new()));

    let response = server.get("/health").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({ "status": "healthy" }));
    assert!(!response.header("x-request-id").is_empty());
}

#[tokio::test]
async fn test_append_without_snapshots_is_not_found() {
    let server = create_test_server(Arc::new(MemoryBlobStore::new()));

    let response = server.post("/api/v1/history/append").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_pipeline_run_then_append_is_idempotent() {
    let store = Arc::new(MemoryBlobStore::new());
    let server = create_test_server(store.clone());

    let response = server.post("/api/v1/pipeline/run").await;
    response.assert_status_ok();
    let report: Value = response.json();

    assert_eq!(report["weekly"]["key"], "processed/weekly/nyt_transformed_2024-02-11.csv");
    assert_eq!(
        report["enriched"]["output_key"],
        "processed/weekly/nyt_transformed_2024-02-11_apple.csv"
    );
    assert_eq!(report["enriched"]["matched"], 1);
    assert_eq!(report["history"]["outcome"], "appended");
    assert_eq!(report["history"]["rows_added"], 1);

    let before = store.get(HISTORY_KEY).await.unwrap().bytes;

    let response = server.post("/api/v1/history/append").await;
    response.assert_status_ok();
    let append: Value = response.json();
    assert_eq!(append["outcome"], "already_present");
    assert_eq!(append["week"], "2024-02-11");

    let after = store.get(HISTORY_KEY).await.unwrap().bytes;
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_pipeline_degrades_rows_when_lookup_stays_rate_limited() {
    let store = Arc::new(MemoryBlobStore::new());
    let server = create_test_server_with(store.clone(), StubLookup { rate_limited: true });

    let response = server.post("/api/v1/pipeline/run").await;
    response.assert_status_ok();
    let report: Value = response.json();

    assert_eq!(report["enriched"]["degraded"], 1);
    assert_eq!(report["enriched"]["matched"], 0);

    let enriched = store
        .get("processed/weekly/nyt_transformed_2024-02-11_apple.csv")
        .await
        .unwrap();
    let text = String::from_utf8(enriched.bytes).unwrap();
    assert!(text.lines().nth(1).unwrap().ends_with(",,,"));
}

#[tokio::test]
async fn test_recommendations_on_empty_history() {
    let store = Arc::new(MemoryBlobStore::new());
    let server = create_test_server(store.clone());

    let response = server.get("/api/v1/recommendations").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["count"], 0);
    assert_eq!(body["recommendations"], json!([]));

    let response = server.post("/api/v1/recommendations").await;
    response.assert_status_ok();

    let csv = store
        .get("processed/recommendations/recommendations.csv")
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(csv.bytes).unwrap().trim_end(),
        "title,author,publisher,category,reason"
    );
}

#[tokio::test]
async fn test_backfill_bootstrap_and_recommend() {
    let store = Arc::new(MemoryBlobStore::new());
    let server = create_test_server(store.clone());

    let response = server
        .post("/api/v1/history/backfill")
        .add_query_param("weeks_back", 2)
        .await;
    response.assert_status_ok();
    let backfill: Value = response.json();
    assert_eq!(backfill["saved"].as_array().unwrap().len(), 2);

    let response = server.post("/api/v1/history/bootstrap").await;
    response.assert_status_ok();
    let bootstrap: Value = response.json();
    assert_eq!(bootstrap["snapshots"], 2);
    assert_eq!(bootstrap["rows"], 2);

    let response = server.post("/api/v1/recommendations").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["count"], 1);

    let mover = &body["recommendations"][0];
    assert_eq!(mover["title"], "The Housemaid");
    assert_eq!(mover["rank_change"], -2);
    assert_eq!(
        mover["reason"],
        "Rank improved by 2 vs last week (from #3 to #1)."
    );
}

#[tokio::test]
async fn test_backfill_rejects_zero_weeks() {
    let server = create_test_server(Arc::new(MemoryBlobStore::new()));

    let response = server
        .post("/api/v1/history/backfill")
        .add_query_param("weeks_back", 0)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_file_listings() {
    let store = Arc::new(MemoryBlobStore::new());
    let server = create_test_server(store);

    server.post("/api/v1/pipeline/run").await.assert_status_ok();

    let raw: Value = server.get("/api/v1/files/raw").await.json();
    let raw_files = raw["files"].as_array().unwrap();
    assert_eq!(raw_files.len(), 1);
    assert!(raw_files[0]
        .as_str()
        .unwrap()
        .starts_with("raw/weekly/nyt_hardcover-fiction_"));

    let processed: Value = server.get("/api/v1/files/processed").await.json();
    let processed_files: Vec<&str> = processed["files"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(processed_files.contains(&HISTORY_KEY));
    assert!(processed_files.contains(&"processed/recommendations/recommendations.csv"));

    let all: Value = server.get("/api/v1/files").await.json();
    assert_eq!(
        all["files"].as_array().unwrap().len(),
        raw_files.len() + processed_files.len()
    );
}
