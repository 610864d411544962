/// NYT Books API list provider
///
/// API Flow:
/// 1. Current list: /lists/current/{list}.json
/// 2. Dated list: /lists/{YYYY-MM-DD}/{list}.json
use chrono::NaiveDate;
use reqwest::Client as HttpClient;

use crate::{
    error::{AppError, AppResult},
    services::providers::{check_status, ListProvider},
};

const PROVIDER: &str = "nyt";

#[derive(Clone)]
pub struct NytListProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl NytListProvider {
    pub fn new(api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn list_url(&self, list_name: &str, date: Option<NaiveDate>) -> String {
        let segment = match date {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => "current".to_string(),
        };
        format!("{}/lists/{}/{}.json", self.api_url, segment, list_name)
    }

    async fn fetch(&self, list_name: &str, date: Option<NaiveDate>) -> AppResult<String> {
        if list_name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "List name cannot be empty".to_string(),
            ));
        }

        let url = self.list_url(list_name, date);
        let response = self
            .http_client
            .get(&url)
            .query(&[("api-key", self.api_key.as_str())])
            .send()
            .await?;

        let body = check_status(PROVIDER, response).await?.text().await?;

        tracing::info!(
            list = %list_name,
            date = ?date,
            bytes = body.len(),
            provider = PROVIDER,
            "List fetch completed"
        );

        Ok(body)
    }
}

#[async_trait::async_trait]
impl ListProvider for NytListProvider {
    async fn current_list(&self, list_name: &str) -> AppResult<String> {
        self.fetch(list_name, None).await
    }

    async fn list_for_date(&self, list_name: &str, date: NaiveDate) -> AppResult<String> {
        self.fetch(list_name, Some(date)).await
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}
