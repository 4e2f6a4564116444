mod assistants;

pub use assistants::{ImageAnalyzer, PromptTool};

use crate::llm::{CompletionBackend, LlmError};
use crate::research::{WebResearchTool, WebResearcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Closed catalogue of tool identifiers. The registry maps every variant to
/// an implementation at startup; unknown wire strings are rejected here, at
/// the boundary, rather than surfacing as a missing map entry downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    TextGenerator,
    SummaryGenerator,
    CodeAssistant,
    ImageAnalyzer,
    SeoAnalyzer,
    DataProcessor,
    ChatAssistant,
    WebSurfingAgent,
}

impl ToolId {
    pub const ALL: [ToolId; 8] = [
        ToolId::TextGenerator,
        ToolId::SummaryGenerator,
        ToolId::CodeAssistant,
        ToolId::ImageAnalyzer,
        ToolId::SeoAnalyzer,
        ToolId::DataProcessor,
        ToolId::ChatAssistant,
        ToolId::WebSurfingAgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::TextGenerator => "text-generator",
            ToolId::SummaryGenerator => "summary-generator",
            ToolId::CodeAssistant => "code-assistant",
            ToolId::ImageAnalyzer => "image-analyzer",
            ToolId::SeoAnalyzer => "seo-analyzer",
            ToolId::DataProcessor => "data-processor",
            ToolId::ChatAssistant => "chat-assistant",
            ToolId::WebSurfingAgent => "web-surfing-agent",
        }
    }

    /// One-line capability description, used in the planner's catalogue
    /// prompt.
    pub fn describe(&self) -> &'static str {
        match self {
            ToolId::TextGenerator => {
                "Generate text, write content, create articles, blog posts, creative writing"
            }
            ToolId::SummaryGenerator => {
                "Summarize text, articles, documents, create abstracts"
            }
            ToolId::CodeAssistant => "Explain code, debug, write code, programming help",
            ToolId::ImageAnalyzer => {
                "Analyze images, describe visual content, extract text from images"
            }
            ToolId::SeoAnalyzer => "SEO analysis, keyword research, content optimization",
            ToolId::DataProcessor => "Process data, analyze datasets, create reports",
            ToolId::ChatAssistant => "General conversation, Q&A, helpful responses",
            ToolId::WebSurfingAgent => {
                "Research topics on the web, gather and summarize online content"
            }
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}

/// Binary attachment accepted by vision-capable tools.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Uniform invocation contract. Tools are stateless across invocations and
/// are constructed exclusively by the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> ToolId;

    async fn run(
        &self,
        input: &str,
        attachment: Option<&ImageAttachment>,
    ) -> Result<String, ToolError>;
}

/// Static catalogue of tools, immutable after process start.
pub struct ToolRegistry {
    entries: HashMap<ToolId, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(backend: Arc<dyn CompletionBackend>, researcher: Arc<WebResearcher>) -> Self {
        let mut entries: HashMap<ToolId, Arc<dyn Tool>> = HashMap::new();
        for id in ToolId::ALL {
            entries.insert(id, Self::build(id, &backend, &researcher));
        }
        Self { entries }
    }

    // Total over ToolId: adding a variant without a handler fails to compile.
    fn build(
        id: ToolId,
        backend: &Arc<dyn CompletionBackend>,
        researcher: &Arc<WebResearcher>,
    ) -> Arc<dyn Tool> {
        match id {
            ToolId::TextGenerator
            | ToolId::SummaryGenerator
            | ToolId::CodeAssistant
            | ToolId::SeoAnalyzer
            | ToolId::DataProcessor
            | ToolId::ChatAssistant => Arc::new(PromptTool::new(id, backend.clone())),
            ToolId::ImageAnalyzer => Arc::new(ImageAnalyzer::new(backend.clone())),
            ToolId::WebSurfingAgent => Arc::new(WebResearchTool::new(researcher.clone())),
        }
    }

    /// Look up a tool by its wire name. `None` is not an error for the
    /// registry; callers treat it as a per-call failure and continue.
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn Tool>> {
        let id = ToolId::from_str(id).ok()?;
        self.entries.get(&id).cloned()
    }

    pub fn resolve_id(&self, id: ToolId) -> Arc<dyn Tool> {
        // The map is total over ToolId by construction.
        self.entries[&id].clone()
    }

    /// (id, capability) pairs for the planner's catalogue prompt.
    pub fn catalogue(&self) -> impl Iterator<Item = (ToolId, &'static str)> {
        ToolId::ALL.into_iter().map(|id| (id, id.describe()))
    }
}
