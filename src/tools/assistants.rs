use super::{ImageAttachment, Tool, ToolError, ToolId};
use crate::llm::{CompletionBackend, Message};
use async_trait::async_trait;
use std::sync::Arc;

/// Single-prompt tool: each catalogue entry differs only in its template and
/// token budget.
pub struct PromptTool {
    id: ToolId,
    backend: Arc<dyn CompletionBackend>,
}

impl PromptTool {
    pub fn new(id: ToolId, backend: Arc<dyn CompletionBackend>) -> Self {
        debug_assert!(!matches!(
            id,
            ToolId::ImageAnalyzer | ToolId::WebSurfingAgent
        ));
        Self { id, backend }
    }

    fn render(&self, input: &str) -> (String, u32) {
        match self.id {
            ToolId::TextGenerator => {
                (format!("Write professional content based on: {}", input), 1000)
            }
            ToolId::SummaryGenerator => (
                format!(
                    "You are a helpful assistant. Please summarize the following in a clear and concise way:\n\n{}",
                    input
                ),
                500,
            ),
            ToolId::CodeAssistant => (format!("Write clean code and explain: {}", input), 1000),
            ToolId::ChatAssistant => {
                (format!("Respond like a friendly assistant to: {}", input), 1000)
            }
            ToolId::DataProcessor => (format!("Analyze and summarize the data: {}", input), 1000),
            ToolId::SeoAnalyzer => (
                format!(
                    "You are an SEO expert. Analyze the following content and provide SEO improvements:\n\n{}",
                    input
                ),
                600,
            ),
            // Handled by dedicated tool types.
            ToolId::ImageAnalyzer | ToolId::WebSurfingAgent => (input.to_string(), 1000),
        }
    }
}

#[async_trait]
impl Tool for PromptTool {
    fn id(&self) -> ToolId {
        self.id
    }

    async fn run(
        &self,
        input: &str,
        _attachment: Option<&ImageAttachment>,
    ) -> Result<String, ToolError> {
        let (prompt, max_tokens) = self.render(input);
        let text = self
            .backend
            .complete(vec![Message::user_text(prompt)], max_tokens)
            .await?;
        Ok(text)
    }
}

pub struct ImageAnalyzer {
    backend: Arc<dyn CompletionBackend>,
}

impl ImageAnalyzer {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

const DEFAULT_IMAGE_PROMPT: &str = "Analyze this image in detail. Describe what you see, \
identify objects, text, and provide insights.";

#[async_trait]
impl Tool for ImageAnalyzer {
    fn id(&self) -> ToolId {
        ToolId::ImageAnalyzer
    }

    async fn run(
        &self,
        input: &str,
        attachment: Option<&ImageAttachment>,
    ) -> Result<String, ToolError> {
        let Some(image) = attachment else {
            // Contract: no backend call without an image.
            return Ok("Please upload an image to analyze.".to_string());
        };

        let instruction = if input.trim().is_empty() {
            DEFAULT_IMAGE_PROMPT
        } else {
            input
        };
        let message = Message::user_with_image(instruction, &image.mime_type, &image.data);
        let text = self.backend.complete(vec![message], 1000).await?;
        Ok(text)
    }
}
