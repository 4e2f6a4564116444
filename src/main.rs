use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolpilot::config::AppConfig;
use toolpilot::llm::{CompletionBackend, GeminiClient};
use toolpilot::logging::{init_logging, LoggingConfig};
use toolpilot::planner::Planner;
use toolpilot::research::{TavilySearch, WebResearcher};
use toolpilot::server::{serve, AppState};
use toolpilot::tools::ToolRegistry;

#[derive(Parser, Debug)]
#[command(name = "toolpilot", about = "AI tool orchestration server")]
struct Args {
    /// Path to a config file, tried before the default locations.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, overriding the configured one.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _guard = init_logging(LoggingConfig::default())?;
    let config = AppConfig::load(args.config.as_deref());

    let llm_api_key = config.llm_api_key().unwrap_or_default();
    if llm_api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY is not set, model calls will fail");
    }
    let search_api_key = config.search_api_key().unwrap_or_default();
    if search_api_key.is_empty() {
        tracing::warn!("TAVILY_API_KEY is not set, web search will fall back to encyclopedia lookups");
    }

    let backend: Arc<dyn CompletionBackend> = Arc::new(GeminiClient::new(
        llm_api_key,
        config.llm.model.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    ));
    let search = Arc::new(TavilySearch::new(search_api_key, config.search.max_results));
    let researcher = Arc::new(WebResearcher::new(
        backend.clone(),
        search,
        config.research.clone(),
    ));
    let registry = Arc::new(ToolRegistry::new(backend.clone(), researcher));
    let planner = Arc::new(Planner::new(
        backend,
        registry.clone(),
        config.planner.clone(),
    ));

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    serve(AppState { registry, planner }, &bind).await?;
    Ok(())
}
