//! Goal decomposition and sequential step execution. Planning prefers the
//! AI path; when that fails or yields nothing, a deterministic keyword
//! fallback guarantees every goal still maps to at least one step.

use crate::config::PlannerConfig;
use crate::llm::{structured, CompletionBackend, LlmError};
use crate::tools::ToolRegistry;
use crate::util::{preview, tail_chars};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One planned unit of work. `tool_id` stays a plain string on the wire so
/// a hallucinated id degrades to a per-step failure instead of rejecting
/// the whole plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    pub subtask: String,
    #[serde(rename = "toolId")]
    pub tool_id: String,
    pub description: String,
}

/// Wrapper matching the structured-output schema sent to the model.
#[derive(Debug, Deserialize, JsonSchema)]
struct PlanEnvelope {
    plan: Vec<PlanStep>,
}

/// Observable per-step result. A run never aborts on a bad step; the
/// outcome records what happened to each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed { output: String },
    UnknownTool { tool_id: String },
    Failed { tool_id: String, error: String },
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PlannerOutput {
    pub run_id: String,
    pub logs: Vec<String>,
    pub final_result: String,
    pub outcomes: Vec<StepOutcome>,
}

pub struct Planner {
    backend: Arc<dyn CompletionBackend>,
    registry: Arc<ToolRegistry>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        registry: Arc<ToolRegistry>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    /// Decompose a goal into ordered steps. AI planning first, keyword
    /// fallback on any error or an empty plan.
    pub async fn plan(&self, goal: &str) -> Vec<PlanStep> {
        match self.plan_with_ai(goal).await {
            Ok(steps) if !steps.is_empty() => {
                steps.into_iter().take(self.config.max_steps).collect()
            }
            Ok(_) => {
                tracing::warn!("AI planner returned an empty plan, using keyword fallback");
                fallback_plan(goal)
            }
            Err(e) => {
                tracing::warn!("AI planning failed ({}), using keyword fallback", e);
                fallback_plan(goal)
            }
        }
    }

    async fn plan_with_ai(&self, goal: &str) -> Result<Vec<PlanStep>, LlmError> {
        let mut catalogue = String::new();
        for (id, capability) in self.registry.catalogue() {
            catalogue.push_str(&format!("- {}: {}\n", id, capability));
        }

        let prompt = format!(
            "You are a task planner. Break the user's goal into the smallest ordered \
             list of subtasks, each assigned to exactly one of the available tools. \
             Use at most {} subtasks and only the tool ids listed.\n\n\
             Available tools:\n{}\nGoal: {}\n\n\
             For each subtask give the subtask text, the toolId, and a short \
             description of the reasoning.",
            self.config.max_steps, catalogue, goal
        );

        let envelope = structured::<PlanEnvelope>(self.backend.as_ref(), &prompt, 1000).await?;
        Ok(envelope.plan)
    }

    /// Run the steps in order, threading each result into the next step's
    /// input. A step that fails or names an unknown tool is logged and
    /// skipped; later steps still run.
    pub async fn execute(&self, steps: &[PlanStep]) -> (Vec<String>, String, Vec<StepOutcome>) {
        let mut logs = Vec::new();
        let mut outcomes = Vec::new();
        let mut context = String::new();
        let mut final_result = String::new();

        for (i, step) in steps.iter().enumerate() {
            logs.push(format!("\n🔧 Subtask {}: {}", i + 1, step.subtask));
            logs.push(format!("📝 Reasoning: {}", step.description));
            logs.push(format!("🛠️ Assigning to tool: {}", step.tool_id));

            let Some(tool) = self.registry.resolve(&step.tool_id) else {
                logs.push(format!("❌ Unknown tool: {}", step.tool_id));
                outcomes.push(StepOutcome::UnknownTool {
                    tool_id: step.tool_id.clone(),
                });
                continue;
            };

            let input = if context.is_empty() {
                step.subtask.clone()
            } else {
                let ctx = match self.config.context_char_cap {
                    Some(cap) => tail_chars(&context, cap),
                    None => context.clone(),
                };
                format!("{}\n\nContext from previous steps:\n{}", step.subtask, ctx)
            };

            match tool.run(&input, None).await {
                Ok(result) => {
                    logs.push(format!("✅ Result: {}", preview(&result, 200)));
                    context.push_str(&format!("\nStep {} result: {}", i + 1, result));
                    final_result
                        .push_str(&format!("\n\n**Step {}: {}**\n{}", i + 1, step.subtask, result));
                    outcomes.push(StepOutcome::Completed { output: result });
                }
                Err(e) => {
                    logs.push(format!("❌ Error from {}: {}", step.tool_id, e));
                    outcomes.push(StepOutcome::Failed {
                        tool_id: step.tool_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        (logs, final_result.trim().to_string(), outcomes)
    }

    /// Full run: plan, execute, and return the run log alongside the
    /// accumulated result.
    pub async fn run(&self, goal: &str) -> PlannerOutput {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, goal = %goal, "planner run started");

        let mut logs = vec![
            format!("🧠 Planner received task: \"{}\"", goal),
            "🤖 Analyzing task with AI...".to_string(),
        ];

        let steps = self.plan(goal).await;
        logs.push(format!("📋 Decomposed into {} subtasks.", steps.len()));

        let (step_logs, final_result, outcomes) = self.execute(&steps).await;
        logs.extend(step_logs);

        tracing::info!(
            run_id = %run_id,
            steps = steps.len(),
            completed = outcomes.iter().filter(|o| o.is_completed()).count(),
            "planner run finished"
        );

        PlannerOutput {
            run_id,
            logs,
            final_result,
            outcomes,
        }
    }
}

/// Deterministic keyword routing. Rules are checked in a fixed priority
/// order and are non-exclusive: every matching rule contributes a step, so
/// a multi-keyword goal decomposes into several steps. An unmatched goal
/// becomes a single text-generation step carrying the goal verbatim.
pub fn fallback_plan(goal: &str) -> Vec<PlanStep> {
    let lower = goal.to_lowercase();

    let step = |subtask: &str, tool_id: &str, description: &str| PlanStep {
        subtask: subtask.to_string(),
        tool_id: tool_id.to_string(),
        description: description.to_string(),
    };

    let mut plan = Vec::new();

    if lower.contains("get")
        && (lower.contains("article") || lower.contains("web") || lower.contains("scrape"))
    {
        plan.push(step(
            "Scrape web content based on the request",
            "web-surfing-agent",
            "Retrieve content from websites",
        ));
    }
    if lower.contains("summarize") || lower.contains("summary") {
        plan.push(step(
            "Summarize the content",
            "summary-generator",
            "Create concise summary",
        ));
    }
    if lower.contains("generate") || lower.contains("write") || lower.contains("create") {
        plan.push(step(
            "Generate text content",
            "text-generator",
            "Create new text content",
        ));
    }
    if lower.contains("code") || lower.contains("debug") || lower.contains("program") {
        plan.push(step(
            "Assist with code",
            "code-assistant",
            "Help with programming tasks",
        ));
    }
    if lower.contains("image") || lower.contains("photo") || lower.contains("picture") {
        plan.push(step(
            "Analyze image content",
            "image-analyzer",
            "Process and analyze images",
        ));
    }
    if lower.contains("seo") || lower.contains("optimize") {
        plan.push(step(
            "Perform SEO analysis",
            "seo-analyzer",
            "Analyze and optimize for SEO",
        ));
    }
    if lower.contains("data") || lower.contains("analyze") || lower.contains("process") {
        plan.push(step("Process data", "data-processor", "Analyze and process data"));
    }

    if plan.is_empty() {
        plan.push(step(goal, "text-generator", "General text generation task"));
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;
    use crate::llm::Message;
    use crate::research::{SearchError, SearchProvider, WebResearcher};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Fails structured calls (forcing the keyword fallback) and answers
    /// plain completions from a scripted queue, recording every prompt.
    struct ScriptedBackend {
        responses: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<&str>) -> Self {
            let mut queue: Vec<String> = responses.into_iter().map(String::from).collect();
            queue.reverse();
            Self {
                responses: Mutex::new(queue),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, messages: Vec<Message>, _: u32) -> Result<String, LlmError> {
            let prompt = messages[0].parts[0].text.clone().unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::Api("script exhausted".to_string()))
        }
        async fn complete_structured(&self, _: &str, _: Value, _: u32) -> Result<Value, LlmError> {
            Err(LlmError::Api("structured output unavailable".to_string()))
        }
    }

    struct NoSearch;

    #[async_trait]
    impl SearchProvider for NoSearch {
        async fn search(&self, _: &str) -> Result<Vec<String>, SearchError> {
            Ok(Vec::new())
        }
    }

    fn planner_with(backend: Arc<ScriptedBackend>) -> Planner {
        let backend_dyn: Arc<dyn CompletionBackend> = backend;
        let researcher = Arc::new(WebResearcher::new(
            backend_dyn.clone(),
            Arc::new(NoSearch),
            ResearchConfig::default(),
        ));
        let registry = Arc::new(ToolRegistry::new(backend_dyn.clone(), researcher));
        Planner::new(backend_dyn, registry, PlannerConfig::default())
    }

    fn step(subtask: &str, tool_id: &str) -> PlanStep {
        PlanStep {
            subtask: subtask.to_string(),
            tool_id: tool_id.to_string(),
            description: "test step".to_string(),
        }
    }

    fn tool_ids(plan: &[PlanStep]) -> Vec<&str> {
        plan.iter().map(|s| s.tool_id.as_str()).collect()
    }

    #[test]
    fn fallback_routes_scraping_requests() {
        let plan = fallback_plan("get the latest articles about rust");
        assert_eq!(tool_ids(&plan), vec!["web-surfing-agent"]);
        // "get" without a web-ish word skips the scrape rule.
        let plan = fallback_plan("get this summarized");
        assert_eq!(tool_ids(&plan), vec!["summary-generator"]);
    }

    #[test]
    fn fallback_fires_one_step_per_matching_rule() {
        let plan = fallback_plan("get articles about solar power and summarize them");
        assert_eq!(tool_ids(&plan), vec!["web-surfing-agent", "summary-generator"]);

        // Rules fire in priority order regardless of keyword position.
        let plan = fallback_plan("summarize this then write a poem");
        assert_eq!(tool_ids(&plan), vec!["summary-generator", "text-generator"]);
    }

    #[test]
    fn fallback_covers_every_keyword_family() {
        assert_eq!(tool_ids(&fallback_plan("write a blog post")), vec!["text-generator"]);
        assert_eq!(tool_ids(&fallback_plan("debug my script")), vec!["code-assistant"]);
        assert_eq!(tool_ids(&fallback_plan("describe this photo")), vec!["image-analyzer"]);
        assert_eq!(tool_ids(&fallback_plan("optimize my landing page")), vec!["seo-analyzer"]);
        assert_eq!(tool_ids(&fallback_plan("process these numbers")), vec!["data-processor"]);
    }

    #[test]
    fn unmatched_goal_becomes_verbatim_text_step() {
        let plan = fallback_plan("bonjour");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].subtask, "bonjour");
        assert_eq!(plan[0].tool_id, "text-generator");
        assert_eq!(plan[0].description, "General text generation task");
    }

    #[tokio::test]
    async fn plan_falls_back_to_multi_rule_decomposition() {
        // Structured planning is down; the keyword fallback must still
        // decompose a two-intent goal into two steps.
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let planner = planner_with(backend);

        let steps = planner
            .plan("get articles about solar power and summarize them")
            .await;
        assert_eq!(tool_ids(&steps), vec!["web-surfing-agent", "summary-generator"]);
    }

    #[tokio::test]
    async fn context_threads_between_steps() {
        let backend = Arc::new(ScriptedBackend::new(vec!["OUT1", "OUT2"]));
        let planner = planner_with(backend.clone());

        let steps = vec![
            step("first task", "chat-assistant"),
            step("second task", "chat-assistant"),
        ];
        let (logs, final_result, outcomes) = planner.execute(&steps).await;

        assert!(outcomes.iter().all(|o| o.is_completed()));
        assert!(matches!(
            &outcomes[0],
            StepOutcome::Completed { output } if output == "OUT1"
        ));

        let prompts = backend.prompts.lock().unwrap();
        assert!(!prompts[0].contains("Context from previous steps"));
        assert!(prompts[1].contains("Context from previous steps:"));
        assert!(prompts[1].contains("Step 1 result: OUT1"));

        assert!(final_result.contains("**Step 1: first task**\nOUT1"));
        assert!(final_result.contains("**Step 2: second task**\nOUT2"));
        assert!(logs.iter().any(|l| l.contains("✅ Result: OUT1")));
    }

    #[tokio::test]
    async fn unknown_tool_is_logged_and_skipped() {
        let backend = Arc::new(ScriptedBackend::new(vec!["OK"]));
        let planner = planner_with(backend.clone());

        let steps = vec![
            step("bogus task", "pdf-mangler"),
            step("real task", "chat-assistant"),
        ];
        let (logs, final_result, outcomes) = planner.execute(&steps).await;

        assert!(matches!(
            &outcomes[0],
            StepOutcome::UnknownTool { tool_id } if tool_id == "pdf-mangler"
        ));
        assert!(outcomes[1].is_completed());
        assert!(logs.iter().any(|l| l.contains("❌ Unknown tool: pdf-mangler")));
        assert!(final_result.contains("OK"));
        // The skipped step contributes no context to the survivor.
        let prompts = backend.prompts.lock().unwrap();
        assert!(!prompts[0].contains("Context from previous steps"));
    }

    #[tokio::test]
    async fn failed_step_does_not_stop_the_run() {
        // One scripted response: step one drains it, step two errors.
        let backend = Arc::new(ScriptedBackend::new(vec!["ONLY"]));
        let planner = planner_with(backend.clone());

        let steps = vec![
            step("works", "chat-assistant"),
            step("breaks", "chat-assistant"),
            step("unknown", "nope"),
        ];
        let (logs, final_result, outcomes) = planner.execute(&steps).await;

        assert!(outcomes[0].is_completed());
        assert!(matches!(
            &outcomes[1],
            StepOutcome::Failed { tool_id, .. } if tool_id == "chat-assistant"
        ));
        assert!(matches!(&outcomes[2], StepOutcome::UnknownTool { .. }));
        assert!(logs.iter().any(|l| l.contains("❌ Error from chat-assistant")));
        assert_eq!(final_result, "**Step 1: works**\nONLY");
    }

    #[tokio::test]
    async fn context_cap_keeps_the_tail() {
        let backend = Arc::new(ScriptedBackend::new(vec!["AAAA TAIL", "DONE"]));
        let backend_dyn: Arc<dyn CompletionBackend> = backend.clone();
        let researcher = Arc::new(WebResearcher::new(
            backend_dyn.clone(),
            Arc::new(NoSearch),
            ResearchConfig::default(),
        ));
        let registry = Arc::new(ToolRegistry::new(backend_dyn.clone(), researcher));
        let planner = Planner::new(
            backend_dyn,
            registry,
            PlannerConfig {
                max_steps: 5,
                context_char_cap: Some(4),
            },
        );

        let steps = vec![step("one", "chat-assistant"), step("two", "chat-assistant")];
        planner.execute(&steps).await;

        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[1].ends_with("Context from previous steps:\nTAIL"));
    }

    #[tokio::test]
    async fn run_emits_decomposition_logs() {
        let backend = Arc::new(ScriptedBackend::new(vec!["SUMMARY"]));
        let planner = planner_with(backend);

        let output = planner.run("summarize this report").await;
        assert!(output.logs[0].contains("🧠 Planner received task: \"summarize this report\""));
        assert!(output.logs.iter().any(|l| l.contains("🤖 Analyzing task with AI...")));
        assert!(output.logs.iter().any(|l| l.contains("📋 Decomposed into 1 subtasks.")));
        assert!(matches!(
            &output.outcomes[..],
            [StepOutcome::Completed { .. }]
        ));
        assert!(output.final_result.contains("SUMMARY"));
        assert!(!output.run_id.is_empty());
    }
}
