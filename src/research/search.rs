use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Search API error: {0}")]
    Api(String),
}

/// External search collaborator: a query in, candidate URLs out.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>, SearchError>;
}

/// Tavily-backed search provider.
pub struct TavilySearch {
    api_key: String,
    client: Client,
    max_results: usize,
}

impl TavilySearch {
    pub fn new(api_key: String, max_results: usize) -> Self {
        Self {
            api_key,
            client: Client::new(),
            max_results: max_results.clamp(1, 10),
        }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<String>, SearchError> {
        if self.api_key.trim().is_empty() {
            return Err(SearchError::Api("TAVILY_API_KEY is not configured".to_string()));
        }

        let payload = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
            "include_answer": false,
            "include_raw_content": false,
        });

        tracing::debug!(query, "Tavily search");
        let response = self
            .client
            .post("https://api.tavily.com/search")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let json: serde_json::Value = response.json().await?;

        if !status.is_success() {
            return Err(SearchError::Api(format!("HTTP {} - {}", status, json)));
        }

        let urls = json
            .get("results")
            .and_then(|v| v.as_array())
            .map(|results| {
                results
                    .iter()
                    .filter_map(|item| item.get("url").and_then(|v| v.as_str()))
                    .map(|u| u.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(urls)
    }
}

/// Deterministic fallback when search errors or returns nothing: an
/// encyclopedia lookup keyed by the query text.
pub fn encyclopedia_url(query: &str) -> String {
    let slug: String = query
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!("https://en.wikipedia.org/wiki/{}", slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encyclopedia_url_joins_words_with_underscores() {
        assert_eq!(
            encyclopedia_url("renewable  energy "),
            "https://en.wikipedia.org/wiki/renewable_energy"
        );
    }

    #[tokio::test]
    async fn tavily_without_key_reports_api_error() {
        let provider = TavilySearch::new(String::new(), 5);
        let err = provider.search("anything").await.unwrap_err();
        assert!(matches!(err, SearchError::Api(_)));
    }
}
