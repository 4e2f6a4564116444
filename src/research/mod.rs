//! Multi-stage web research pipeline: query generation, URL discovery,
//! fetch + extraction, per-page relevance analysis, and narrative synthesis.
//! Stages run strictly in order; every stage except the final synthesis
//! degrades to a skip instead of failing the call.

pub mod extract;
pub mod search;

pub use search::{encyclopedia_url, SearchError, SearchProvider, TavilySearch};

use crate::config::ResearchConfig;
use crate::llm::{structured, CompletionBackend, LlmError, Message};
use crate::tools::{ImageAttachment, Tool, ToolError, ToolId};
use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Synthesis failed: {0}")]
    Synthesis(#[source] LlmError),
}

/// Pages scoring at or below this relevance are dropped from the result.
const RELEVANCE_FLOOR: f64 = 3.0;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Fixed-delay pacing between external calls within one pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn from_ms(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResearchOptions {
    /// Override for the configured per-call site cap.
    pub max_sites: Option<usize>,
    /// Caller-supplied emphases steering query generation.
    pub focus_areas: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyData {
    pub category: String,
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    /// AI-condensed content, not raw HTML.
    pub content: String,
    pub relevance_score: f64,
    pub key_data: KeyData,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebSurfingResult {
    pub query: String,
    /// Sorted by relevance, descending; discovery order preserved on ties.
    pub websites: Vec<ScrapedPage>,
    pub summary: String,
    pub total_sources: usize,
}

/// Structured output of the query-generation stage.
#[derive(Debug, Deserialize, JsonSchema)]
struct QueryPlan {
    /// 1 to 5 diversified search queries.
    #[schemars(length(min = 1, max = 5))]
    queries: Vec<String>,
    #[allow(dead_code)]
    reasoning: String,
}

/// Structured output of the per-page analysis stage.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct PageAnalysis {
    key_points: Vec<String>,
    /// Relevance to the original query, 0 to 10.
    #[schemars(range(min = 0, max = 10))]
    relevance_score: f64,
    category: String,
    summary: String,
}

struct FetchedPage {
    url: String,
    title: String,
    text: String,
}

enum PageSkip {
    InvalidUrl,
    FetchFailure(String),
    InsufficientContent(usize),
}

pub struct WebResearcher {
    backend: Arc<dyn CompletionBackend>,
    search: Arc<dyn SearchProvider>,
    http: Client,
    config: ResearchConfig,
    search_pacer: Pacer,
    fetch_pacer: Pacer,
}

impl WebResearcher {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        search: Arc<dyn SearchProvider>,
        config: ResearchConfig,
    ) -> Self {
        let http = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        let search_pacer = Pacer::from_ms(config.search_delay_ms);
        let fetch_pacer = Pacer::from_ms(config.fetch_delay_ms);
        Self {
            backend,
            search,
            http,
            config,
            search_pacer,
            fetch_pacer,
        }
    }

    /// Full pipeline for one research call.
    pub async fn surf_web(
        &self,
        query: &str,
        options: &ResearchOptions,
    ) -> Result<WebSurfingResult, ResearchError> {
        let call_id = uuid::Uuid::new_v4().to_string();
        let max_sites = options.max_sites.unwrap_or(self.config.max_sites);
        tracing::info!(call_id = %call_id, query, max_sites, "web research started");

        let queries = self.generate_queries(query, &options.focus_areas).await;
        let candidates = self.discover_urls(&queries).await;

        let mut pages = Vec::new();
        for (i, candidate) in candidates.iter().take(max_sites).enumerate() {
            if i > 0 {
                self.fetch_pacer.pause().await;
            }
            match self.fetch_and_extract(candidate).await {
                Ok(page) => pages.push(page),
                Err(PageSkip::InvalidUrl) => {
                    tracing::warn!(url = %candidate, "skipping malformed url");
                }
                Err(PageSkip::FetchFailure(reason)) => {
                    tracing::warn!(url = %candidate, %reason, "fetch failed, skipping");
                }
                Err(PageSkip::InsufficientContent(len)) => {
                    tracing::debug!(url = %candidate, len, "page too thin, skipping");
                }
            }
        }

        let mut analyzed = Vec::new();
        for page in pages {
            analyzed.push(self.analyze_page(query, page).await);
        }
        let websites = retain_and_rank(analyzed);

        let summary = self
            .synthesize(query, &websites)
            .await
            .map_err(ResearchError::Synthesis)?;

        tracing::info!(call_id = %call_id, query, sources = websites.len(), "web research finished");
        Ok(WebSurfingResult {
            query: query.to_string(),
            total_sources: websites.len(),
            websites,
            summary,
        })
    }

    /// Same pipeline, with query generation steered toward the caller's
    /// requested data patterns.
    pub async fn surf_for_data(
        &self,
        query: &str,
        data_patterns: &[String],
        options: &ResearchOptions,
    ) -> Result<WebSurfingResult, ResearchError> {
        let mut steered = options.clone();
        steered.focus_areas.extend(data_patterns.iter().cloned());
        steered
            .focus_areas
            .push("statistics, concrete numbers, and research findings".to_string());
        self.surf_web(query, &steered).await
    }

    /// Stage 1: 3-5 diversified queries. Degrades to the topic itself.
    async fn generate_queries(&self, query: &str, focus_areas: &[String]) -> Vec<String> {
        let mut prompt = format!(
            "You are a research assistant. Generate 3 to 5 diverse web search queries \
             that together cover the topic below from different angles. Also give a one \
             sentence reasoning for your choices.\n\nTopic: {}",
            query
        );
        if !focus_areas.is_empty() {
            prompt.push_str(&format!("\nFocus areas: {}", focus_areas.join("; ")));
        }

        match structured::<QueryPlan>(self.backend.as_ref(), &prompt, 500).await {
            Ok(plan) if !plan.queries.is_empty() => {
                plan.queries.into_iter().take(5).collect()
            }
            Ok(_) => vec![query.to_string()],
            Err(e) => {
                tracing::warn!("query generation failed, using raw topic: {}", e);
                vec![query.to_string()]
            }
        }
    }

    /// Stage 2: resolve queries to a deduplicated candidate URL list. A
    /// query whose search errors or comes back empty contributes its
    /// encyclopedia fallback URL instead.
    async fn discover_urls(&self, queries: &[String]) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        for (i, query) in queries.iter().enumerate() {
            if i > 0 {
                self.search_pacer.pause().await;
            }
            let urls = match self.search.search(query).await {
                Ok(urls) if !urls.is_empty() => urls,
                Ok(_) => {
                    tracing::debug!(query = %query, "search returned nothing, deriving fallback url");
                    vec![encyclopedia_url(query)]
                }
                Err(e) => {
                    tracing::warn!(query = %query, "search failed ({}), deriving fallback url", e);
                    vec![encyclopedia_url(query)]
                }
            };
            for url in urls {
                if !candidates.contains(&url) {
                    candidates.push(url);
                }
            }
        }
        candidates
    }

    /// Stage 3: bounded fetch plus readable-text extraction for one URL.
    async fn fetch_and_extract(&self, raw_url: &str) -> Result<FetchedPage, PageSkip> {
        let parsed = Url::parse(raw_url).map_err(|_| PageSkip::InvalidUrl)?;

        let response = self
            .http
            .get(parsed.clone())
            .timeout(Duration::from_secs(self.config.fetch_timeout_secs))
            .send()
            .await
            .map_err(|e| PageSkip::FetchFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PageSkip::FetchFailure(format!("HTTP {}", response.status())));
        }

        let html = response
            .text()
            .await
            .map_err(|e| PageSkip::FetchFailure(e.to_string()))?;

        let text = extract::readable_text(&html, self.config.content_char_cap);
        let len = text.chars().count();
        if len < self.config.min_content_chars {
            return Err(PageSkip::InsufficientContent(len));
        }

        let title = extract::page_title(&html)
            .or_else(|| parsed.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| raw_url.to_string());

        Ok(FetchedPage {
            url: raw_url.to_string(),
            title,
            text,
        })
    }

    /// Stage 4: relevance scoring and key-point extraction for one page.
    /// Analysis failure yields neutral defaults so the page still reaches
    /// the relevance filter.
    async fn analyze_page(&self, query: &str, page: FetchedPage) -> ScrapedPage {
        let prompt = format!(
            "Rate how relevant the following page is to the research query \"{}\" on a \
             scale of 0 to 10. Extract its key points, assign a short category, and write \
             a condensed summary of the content.\n\nTitle: {}\nURL: {}\n\nContent:\n{}",
            query, page.title, page.url, page.text
        );

        match structured::<PageAnalysis>(self.backend.as_ref(), &prompt, 800).await {
            Ok(analysis) => ScrapedPage {
                url: page.url,
                title: page.title,
                content: analysis.summary,
                relevance_score: analysis.relevance_score.clamp(0.0, 10.0),
                key_data: KeyData {
                    category: analysis.category,
                    key_points: analysis.key_points,
                },
            },
            Err(e) => {
                tracing::warn!(url = %page.url, "page analysis failed ({}), keeping neutral score", e);
                ScrapedPage {
                    url: page.url,
                    title: page.title,
                    content: crate::util::truncate_chars(&page.text, 600),
                    relevance_score: 5.0,
                    key_data: KeyData {
                        category: "general".to_string(),
                        key_points: Vec::new(),
                    },
                }
            }
        }
    }

    /// Stage 5: narrative synthesis across all surviving pages. The only
    /// stage whose failure propagates to the caller.
    async fn synthesize(
        &self,
        query: &str,
        websites: &[ScrapedPage],
    ) -> Result<String, LlmError> {
        if websites.is_empty() {
            return Ok(format!(
                "No usable web sources could be retrieved for \"{}\". Try rephrasing \
                 the topic or researching again later.",
                query
            ));
        }

        let mut sources = String::new();
        for (i, page) in websites.iter().enumerate() {
            sources.push_str(&format!(
                "Source {} ({}): {}\nSummary: {}\n",
                i + 1,
                page.url,
                page.title,
                page.content
            ));
            if !page.key_data.key_points.is_empty() {
                sources.push_str(&format!(
                    "Key points: {}\n",
                    page.key_data.key_points.join("; ")
                ));
            }
            sources.push('\n');
        }

        let prompt = format!(
            "You are a research analyst. Synthesize the following source notes into a \
             single narrative report on \"{}\". Cover: an overview, the key findings, any \
             differing viewpoints between sources, and notable trends.\n\n{}",
            query, sources
        );

        self.backend
            .complete(vec![Message::user_text(prompt)], 1500)
            .await
    }
}

/// Drop pages at or below the relevance floor and order the rest by score,
/// descending. The sort is stable: ties keep discovery order.
fn retain_and_rank(mut pages: Vec<ScrapedPage>) -> Vec<ScrapedPage> {
    pages.retain(|p| p.relevance_score > RELEVANCE_FLOOR);
    pages.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    pages
}

/// Adapter exposing the research pipeline through the tool contract.
pub struct WebResearchTool {
    researcher: Arc<WebResearcher>,
}

impl WebResearchTool {
    pub fn new(researcher: Arc<WebResearcher>) -> Self {
        Self { researcher }
    }

    fn render(result: &WebSurfingResult) -> String {
        let mut out = format!("## Web research: {}\n\n{}\n", result.query, result.summary);
        if !result.websites.is_empty() {
            out.push_str(&format!("\n### Sources ({})\n", result.total_sources));
            for page in &result.websites {
                out.push_str(&format!(
                    "- [{}]({}) — relevance {:.1}/10, {}\n",
                    page.title, page.url, page.relevance_score, page.key_data.category
                ));
                for point in &page.key_data.key_points {
                    out.push_str(&format!("  - {}\n", point));
                }
            }
        }
        out
    }
}

#[async_trait]
impl Tool for WebResearchTool {
    fn id(&self) -> ToolId {
        ToolId::WebSurfingAgent
    }

    async fn run(
        &self,
        input: &str,
        _attachment: Option<&ImageAttachment>,
    ) -> Result<String, ToolError> {
        let result = self
            .researcher
            .surf_web(input, &ResearchOptions::default())
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(Self::render(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct DeadBackend;

    #[async_trait]
    impl CompletionBackend for DeadBackend {
        async fn complete(&self, _: Vec<Message>, _: u32) -> Result<String, LlmError> {
            Err(LlmError::Api("down".to_string()))
        }
        async fn complete_structured(&self, _: &str, _: Value, _: u32) -> Result<Value, LlmError> {
            Err(LlmError::Api("down".to_string()))
        }
    }

    struct EmptySearch;

    #[async_trait]
    impl SearchProvider for EmptySearch {
        async fn search(&self, _: &str) -> Result<Vec<String>, SearchError> {
            Ok(Vec::new())
        }
    }

    struct FixedSearch(Vec<String>);

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _: &str) -> Result<Vec<String>, SearchError> {
            Ok(self.0.clone())
        }
    }

    fn zero_delay_config() -> ResearchConfig {
        ResearchConfig {
            search_delay_ms: 0,
            fetch_delay_ms: 0,
            ..ResearchConfig::default()
        }
    }

    fn page(url: &str, score: f64) -> ScrapedPage {
        ScrapedPage {
            url: url.to_string(),
            title: url.to_string(),
            content: "c".to_string(),
            relevance_score: score,
            key_data: KeyData {
                category: "general".to_string(),
                key_points: Vec::new(),
            },
        }
    }

    #[test]
    fn filter_drops_low_relevance_and_sorts_descending() {
        let ranked = retain_and_rank(vec![
            page("a", 2.0),
            page("b", 7.0),
            page("c", 3.0),
            page("d", 9.5),
        ]);
        let urls: Vec<&str> = ranked.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["d", "b"]);
        assert!(ranked.iter().all(|p| p.relevance_score > 3.0));
    }

    #[test]
    fn ranking_is_stable_on_ties() {
        let ranked = retain_and_rank(vec![page("first", 6.0), page("second", 6.0), page("top", 8.0)]);
        let urls: Vec<&str> = ranked.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["top", "first", "second"]);
    }

    #[tokio::test]
    async fn empty_search_falls_back_to_encyclopedia_url() {
        let researcher = WebResearcher::new(
            Arc::new(DeadBackend),
            Arc::new(EmptySearch),
            zero_delay_config(),
        );
        let urls = researcher
            .discover_urls(&["renewable energy".to_string()])
            .await;
        assert_eq!(urls, vec!["https://en.wikipedia.org/wiki/renewable_energy"]);
    }

    #[tokio::test]
    async fn discovered_urls_are_deduplicated_in_order() {
        let researcher = WebResearcher::new(
            Arc::new(DeadBackend),
            Arc::new(FixedSearch(vec![
                "https://a.example/".to_string(),
                "https://b.example/".to_string(),
                "https://a.example/".to_string(),
            ])),
            zero_delay_config(),
        );
        let urls = researcher
            .discover_urls(&["q1".to_string(), "q2".to_string()])
            .await;
        assert_eq!(urls, vec!["https://a.example/", "https://b.example/"]);
    }

    #[tokio::test]
    async fn query_generation_degrades_to_raw_topic() {
        let researcher = WebResearcher::new(
            Arc::new(DeadBackend),
            Arc::new(EmptySearch),
            zero_delay_config(),
        );
        let queries = researcher.generate_queries("solar panels", &[]).await;
        assert_eq!(queries, vec!["solar panels"]);
    }

    #[test]
    fn pacers_take_delays_from_config() {
        let config = ResearchConfig::default();
        let researcher = WebResearcher::new(
            Arc::new(DeadBackend),
            Arc::new(EmptySearch),
            config.clone(),
        );
        assert_eq!(
            researcher.search_pacer.delay(),
            Duration::from_millis(config.search_delay_ms)
        );
        assert_eq!(
            researcher.fetch_pacer.delay(),
            Duration::from_millis(config.fetch_delay_ms)
        );
    }

    #[test]
    fn structured_schemas_declare_wire_bounds() {
        let root = schemars::gen::SchemaGenerator::default().into_root_schema_for::<QueryPlan>();
        let schema = serde_json::to_value(root).unwrap();
        assert_eq!(schema["properties"]["queries"]["minItems"], 1);
        assert_eq!(schema["properties"]["queries"]["maxItems"], 5);

        let root =
            schemars::gen::SchemaGenerator::default().into_root_schema_for::<PageAnalysis>();
        let schema = serde_json::to_value(root).unwrap();
        assert_eq!(schema["properties"]["relevanceScore"]["minimum"], 0.0);
        assert_eq!(schema["properties"]["relevanceScore"]["maximum"], 10.0);
    }

    #[test]
    fn empty_result_renders_without_sources_section() {
        let result = WebSurfingResult {
            query: "q".to_string(),
            websites: Vec::new(),
            summary: "sparse".to_string(),
            total_sources: 0,
        };
        let text = WebResearchTool::render(&result);
        assert!(text.contains("sparse"));
        assert!(!text.contains("### Sources"));
    }
}
