//! Tool-calling agent executor.
//!
//! Runs the bounded think/act loop for one command: each step asks the
//! router for a provider, calls it through the transport with the whole
//! conversation and the tool schemas, then executes any tool calls the
//! model requested.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::error::AgentError;
use super::events::AgentEvent;
use super::memory::Memory;
use super::state::{AgentState, ExecutionResult, FinishReason, FALLBACK_OUTPUT};
use super::streaming::StreamAccumulator;
use crate::config::AgentConfig;
use crate::observability::Logger;
use crate::provider::{ChatRequest, ChatResponse, ChatTransport, Message, ToolCall, ToolChoice};
use crate::router::{ContextType, ProviderRouter, Selection};
use crate::tools::{ToolRegistry, TERMINATE_TOOL};

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_steps: u32,
    /// Sent ahead of the conversation on every request, never stored in memory
    pub system_prompt: Option<String>,
    /// Appended as a user message before each think step
    pub next_step_prompt: Option<String>,
    pub tool_choice: ToolChoice,
    /// Messages kept when memory is truncated after a token-limit error
    pub truncate_keep_recent: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            system_prompt: None,
            next_step_prompt: None,
            tool_choice: ToolChoice::Auto,
            truncate_keep_recent: 10,
        }
    }
}

impl From<&AgentConfig> for ExecutorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            system_prompt: config.system_prompt.clone(),
            next_step_prompt: config.next_step_prompt.clone(),
            tool_choice: ToolChoice::parse(&config.tool_choice),
            truncate_keep_recent: config.truncate_keep_recent,
        }
    }
}

/// Per-run state. Lives only for one `run` call.
struct Run<'a> {
    memory: &'a mut Memory,
    workspace_id: &'a str,
    context: ContextType,
    state: AgentState,
    reason: FinishReason,
    step: u32,
    pending: Vec<ToolCall>,
    answer: Option<String>,
    provider: Option<String>,
    error: Option<String>,
    events: Option<mpsc::Sender<AgentEvent>>,
}

impl Run<'_> {
    async fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is listening any more.
            let _ = events.send(event).await;
        }
    }

    fn finish(&mut self, reason: FinishReason) {
        self.state = AgentState::Finished;
        self.reason = reason;
    }
}

/// Drives commands through the think/act loop.
///
/// The executor holds no per-session state and can be shared by every
/// session; the conversation memory is passed into each run.
pub struct AgentExecutor {
    config: ExecutorConfig,
    transport: Arc<dyn ChatTransport>,
    router: Arc<ProviderRouter>,
    tools: ToolRegistry,
    logger: Option<Arc<Logger>>,
}

impl AgentExecutor {
    pub fn new(
        config: ExecutorConfig,
        transport: Arc<dyn ChatTransport>,
        router: Arc<ProviderRouter>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            config,
            transport,
            router,
            tools,
            logger: None,
        }
    }

    /// Write a markdown transcript of every run.
    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn log<F>(&self, f: F)
    where
        F: FnOnce(&Logger) -> anyhow::Result<()>,
    {
        if let Some(logger) = &self.logger {
            if let Err(e) = f(logger) {
                tracing::warn!("Failed to write run log: {}", e);
            }
        }
    }

    /// Run `command` to completion and return the outcome.
    ///
    /// The command is appended to `memory` as a user message; every message
    /// produced during the run is appended after it.
    pub async fn run(
        &self,
        memory: &mut Memory,
        command: &str,
        workspace_id: &str,
    ) -> ExecutionResult {
        self.execute(memory, command, workspace_id, None).await
    }

    /// Like [`run`](Self::run), but streams the model output and reports
    /// progress on `events`. The last event is always [`AgentEvent::Final`].
    pub async fn run_streaming(
        &self,
        memory: &mut Memory,
        command: &str,
        workspace_id: &str,
        events: mpsc::Sender<AgentEvent>,
    ) -> ExecutionResult {
        self.execute(memory, command, workspace_id, Some(events))
            .await
    }

    async fn execute(
        &self,
        memory: &mut Memory,
        command: &str,
        workspace_id: &str,
        events: Option<mpsc::Sender<AgentEvent>>,
    ) -> ExecutionResult {
        let context = self.router.classify(command, memory.messages());
        memory.push(Message::user(command));

        let mut run = Run {
            memory,
            workspace_id,
            context,
            state: AgentState::Running,
            reason: FinishReason::Completed,
            step: 0,
            pending: Vec::new(),
            answer: None,
            provider: None,
            error: None,
            events,
        };

        let mut details = HashMap::new();
        details.insert("context".to_string(), serde_json::json!(context.as_str()));
        details.insert("max_steps".to_string(), serde_json::json!(self.config.max_steps));
        details.insert("streaming".to_string(), serde_json::json!(run.events.is_some()));
        self.log(|l| l.log_run_start(workspace_id, command, &details));

        tracing::info!(workspace_id, %context, "Run started");
        run.emit(AgentEvent::Status {
            state: AgentState::Running,
        })
        .await;

        while run.state == AgentState::Running && run.step < self.config.max_steps {
            run.step += 1;
            tracing::info!("Executing step {}/{}", run.step, self.config.max_steps);
            self.log(|l| l.log_step(run.step, self.config.max_steps));
            run.emit(AgentEvent::Step {
                step: run.step,
                max_steps: self.config.max_steps,
            })
            .await;

            match self.think(&mut run).await {
                Ok(true) => self.act(&mut run).await,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("Step {} failed: {}", run.step, e);
                    let mut ctx = HashMap::new();
                    ctx.insert("step".to_string(), serde_json::json!(run.step));
                    self.log(|l| l.log_error(&e.to_string(), Some(&ctx)));
                    run.emit(AgentEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                    run.state = AgentState::Error;
                    run.reason = FinishReason::Failed;
                    run.error = Some(e.to_string());
                }
            }
        }

        if run.state == AgentState::Running {
            tracing::info!("Reached max steps ({})", self.config.max_steps);
            run.finish(FinishReason::MaxStepsReached);
        }

        let output = run
            .answer
            .clone()
            .unwrap_or_else(|| FALLBACK_OUTPUT.to_string());

        self.log(|l| l.log_completion(&run.state.to_string(), &output));
        run.emit(AgentEvent::Status { state: run.state }).await;
        run.emit(AgentEvent::Final {
            output: output.clone(),
        })
        .await;

        ExecutionResult {
            state: run.state,
            reason: run.reason,
            output,
            steps: run.step,
            provider: run.provider,
            error: run.error,
        }
    }

    /// Ask the model for the next move.
    ///
    /// Returns `true` when tool calls are waiting to be executed.
    async fn think(&self, run: &mut Run<'_>) -> Result<bool, AgentError> {
        if let Some(prompt) = &self.config.next_step_prompt {
            run.memory.push(Message::user(prompt.clone()));
        }

        let response = match self.call_model(run).await {
            Err(e) if e.is_token_limit() => {
                let removed = run.memory.truncate(self.config.truncate_keep_recent);
                tracing::warn!(
                    "Token limit exceeded, dropped {} messages and retrying: {}",
                    removed,
                    e
                );
                self.call_model(run).await?
            }
            other => other?,
        };

        let message = response.message;
        let provider = run.provider.clone().unwrap_or_default();
        self.log(|l| l.log_llm_response(&provider, message.text(), run.memory.len()));

        if message.has_tool_calls() {
            run.pending = message.tool_calls.clone().unwrap_or_default();
            let names: Vec<&str> = run
                .pending
                .iter()
                .map(|c| c.function.name.as_str())
                .collect();
            tracing::info!("Model selected {} tools: [{}]", names.len(), names.join(", "));
            run.memory.push(message);
            return Ok(true);
        }

        let content = message.text().to_string();
        run.memory.push(message);

        let names_terminate = content.to_lowercase().contains(TERMINATE_TOOL);
        if !content.is_empty() {
            run.answer = Some(content);
        }
        run.finish(if names_terminate {
            FinishReason::Terminated
        } else {
            FinishReason::Completed
        });
        Ok(false)
    }

    /// Execute the pending tool calls in order.
    async fn act(&self, run: &mut Run<'_>) {
        let calls = std::mem::take(&mut run.pending);

        for call in calls {
            let name = call.function.name.as_str();

            let Some(tool) = self.tools.resolve(name) else {
                tracing::warn!("Tool '{}' not found, skipping call {}", name, call.id);
                continue;
            };

            let raw = call.function.arguments.trim();
            let args = if raw.is_empty() {
                Ok(serde_json::json!({}))
            } else {
                serde_json::from_str::<serde_json::Value>(raw)
            };

            let (content, executed) = match args {
                Err(e) => {
                    tracing::warn!("Invalid JSON arguments for '{}': {}", name, e);
                    let content = format!(
                        "Error: Failed to parse arguments for tool '{}': {}",
                        name, e
                    );
                    self.log(|l| l.log_tool_execution(name, raw, &content, false));
                    (content, false)
                }
                Ok(args) => {
                    tracing::info!("Activating tool: '{}'", name);
                    let content = match tool.execute(args).await {
                        Ok(result) => {
                            self.log(|l| l.log_tool_execution(name, raw, &result, true));
                            format!("Observed output of cmd `{}` executed:\n{}", name, result)
                        }
                        Err(e) => {
                            tracing::warn!("Tool '{}' failed: {}", name, e);
                            let content = format!("Error: {}", e);
                            self.log(|l| l.log_tool_execution(name, raw, &content, false));
                            content
                        }
                    };
                    (content, true)
                }
            };

            run.memory.push(Message::tool(content, &call.id, name));

            if executed && name == TERMINATE_TOOL {
                tracing::info!("Terminate tool called, finishing run");
                run.finish(FinishReason::Terminated);
                break;
            }
        }
    }

    fn build_request(&self, selection: &Selection, memory: &Memory) -> ChatRequest {
        let mut messages = Vec::with_capacity(memory.len() + 1);
        if let Some(prompt) = &self.config.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(memory.messages().iter().cloned());

        ChatRequest::new(&selection.provider, messages)
            .with_model(&selection.model)
            .with_tools(self.tools.list())
            .with_tool_choice(self.config.tool_choice.clone())
    }

    /// One model call on the provider the router picks now, with its outcome
    /// reported back to the router.
    async fn call_model(&self, run: &mut Run<'_>) -> Result<ChatResponse, AgentError> {
        let selection = self.router.select(run.context, run.workspace_id)?;
        run.provider = Some(selection.provider.clone());
        let request = self.build_request(&selection, run.memory);

        let started = Instant::now();
        let result = match &run.events {
            Some(events) => self.stream_model(request, events).await,
            None => self.transport.chat_completion(request).await.map_err(Into::into),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                let tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0);
                self.router
                    .record_outcome(&selection.provider, true, latency_ms, tokens);
            }
            Err(e) if e.is_token_limit() => {}
            Err(_) => {
                self.router
                    .record_outcome(&selection.provider, false, latency_ms, 0);
            }
        }

        result
    }

    async fn stream_model(
        &self,
        request: ChatRequest,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<ChatResponse, AgentError> {
        let mut stream = self.transport.chat_completion_stream(request).await?;
        let mut acc = StreamAccumulator::new();

        while let Some(chunk) = stream.next().await {
            if let Some(event) = acc.push(chunk?) {
                let _ = events.send(event).await;
            }
            if acc.is_done() {
                break;
            }
        }

        if !acc.is_done() {
            return Err(AgentError::StreamIncomplete);
        }

        Ok(acc.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationLoader;
    use crate::provider::{ChatStream, ProviderError, ProviderResult, Usage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned responses, recording every request.
    struct ScriptedTransport {
        responses: Mutex<Vec<ProviderResult<Message>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<ProviderResult<Message>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn chat_completion(&self, request: ChatRequest) -> ProviderResult<ChatResponse> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.is_empty() {
                Ok(Message::assistant("out of script"))
            } else {
                responses.remove(0)
            };
            next.map(|message| ChatResponse {
                message,
                usage: Some(Usage {
                    prompt_tokens: 5,
                    completion_tokens: 5,
                    total_tokens: 10,
                }),
            })
        }

        async fn chat_completion_stream(&self, _request: ChatRequest) -> ProviderResult<ChatStream> {
            Err(ProviderError::http("streaming not scripted"))
        }
    }

    fn executor(transport: Arc<ScriptedTransport>, config: ExecutorConfig) -> AgentExecutor {
        let router = ProviderRouter::from_config(&ConfigurationLoader::get_default_config()).unwrap();
        AgentExecutor::new(config, transport, Arc::new(router), ToolRegistry::with_terminate())
    }

    fn terminate_call(id: &str) -> Message {
        Message::assistant_with_tools(
            None,
            vec![ToolCall::new(id, "terminate", r#"{"status":"success"}"#)],
        )
    }

    #[tokio::test]
    async fn test_plain_answer_finishes() {
        let transport = ScriptedTransport::new(vec![Ok(Message::assistant("Hi there!"))]);
        let executor = executor(transport.clone(), ExecutorConfig::default());
        let mut memory = Memory::new();

        let result = executor.run(&mut memory, "hello", "default").await;

        assert_eq!(result.state, AgentState::Finished);
        assert_eq!(result.reason, FinishReason::Completed);
        assert_eq!(result.output, "Hi there!");
        assert_eq!(result.steps, 1);
        assert_eq!(result.provider.as_deref(), Some("openai_gpt4_turbo"));
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn test_system_prompt_sent_not_stored() {
        let transport = ScriptedTransport::new(vec![Ok(Message::assistant("ok"))]);
        let config = ExecutorConfig {
            system_prompt: Some("You are an agent.".to_string()),
            next_step_prompt: Some("What next?".to_string()),
            ..Default::default()
        };
        let executor = executor(transport.clone(), config);
        let mut memory = Memory::new();

        executor.run(&mut memory, "hello", "default").await;

        let requests = transport.requests.lock().unwrap();
        let sent = &requests[0].messages;
        assert_eq!(sent[0], Message::system("You are an agent."));
        assert_eq!(sent[1], Message::user("hello"));
        assert_eq!(sent[2], Message::user("What next?"));
        assert_eq!(requests[0].tools.len(), 1);
        assert!(memory
            .messages()
            .iter()
            .all(|m| m.text() != "You are an agent."));
    }

    #[tokio::test]
    async fn test_terminate_tool_finishes() {
        let transport = ScriptedTransport::new(vec![Ok(terminate_call("c1"))]);
        let executor = executor(transport, ExecutorConfig::default());
        let mut memory = Memory::new();

        let result = executor.run(&mut memory, "do the task", "default").await;

        assert_eq!(result.state, AgentState::Finished);
        assert_eq!(result.reason, FinishReason::Terminated);
        assert_eq!(result.output, FALLBACK_OUTPUT);
        let last = memory.last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
        assert!(last.text().starts_with("Observed output of cmd `terminate` executed:\n"));
    }

    #[tokio::test]
    async fn test_content_naming_terminate_finishes() {
        let transport =
            ScriptedTransport::new(vec![Ok(Message::assistant("I will TERMINATE now."))]);
        let executor = executor(transport, ExecutorConfig::default());
        let mut memory = Memory::new();

        let result = executor.run(&mut memory, "hi", "default").await;

        assert_eq!(result.reason, FinishReason::Terminated);
        assert_eq!(result.output, "I will TERMINATE now.");
    }

    #[tokio::test]
    async fn test_token_limit_truncates_and_retries_once() {
        let transport = ScriptedTransport::new(vec![
            Err(ProviderError::token_limit("too long")),
            Ok(Message::assistant("short answer")),
        ]);
        let executor = executor(transport.clone(), ExecutorConfig {
            truncate_keep_recent: 2,
            ..Default::default()
        });
        let mut memory = Memory::new();
        for i in 0..6 {
            memory.push(Message::user(format!("old {}", i)));
        }

        let result = executor.run(&mut memory, "now", "default").await;

        assert_eq!(result.state, AgentState::Finished);
        assert_eq!(result.output, "short answer");
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_repeated_token_limit_is_error() {
        let transport = ScriptedTransport::new(vec![
            Err(ProviderError::token_limit("too long")),
            Err(ProviderError::token_limit("still too long")),
        ]);
        let executor = executor(transport, ExecutorConfig::default());
        let mut memory = Memory::new();

        let result = executor.run(&mut memory, "now", "default").await;

        assert_eq!(result.state, AgentState::Error);
        assert_eq!(result.reason, FinishReason::Failed);
        assert!(result.error.unwrap().contains("still too long"));
        assert_eq!(result.output, FALLBACK_OUTPUT);
    }

    #[tokio::test]
    async fn test_transport_failure_recorded_and_errors() {
        let transport = ScriptedTransport::new(vec![Err(ProviderError::RetriesExhausted {
            attempts: 4,
            last_error: "503".to_string(),
        })]);
        let executor = executor(transport, ExecutorConfig::default());
        let mut memory = Memory::new();

        let result = executor.run(&mut memory, "hello", "default").await;

        assert_eq!(result.state, AgentState::Error);
        let metrics = executor.router().metrics("openai_gpt4_turbo").unwrap();
        assert_eq!(metrics.failed_requests, 1);
    }

    #[tokio::test]
    async fn test_success_recorded_with_tokens() {
        let transport = ScriptedTransport::new(vec![Ok(Message::assistant("ok"))]);
        let executor = executor(transport, ExecutorConfig::default());
        let mut memory = Memory::new();

        executor.run(&mut memory, "hello", "default").await;

        let metrics = executor.router().metrics("openai_gpt4_turbo").unwrap();
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.avg_tokens_per_request, 10.0);
    }

    #[tokio::test]
    async fn test_unknown_tool_skipped_and_bad_args_reported() {
        let transport = ScriptedTransport::new(vec![
            Ok(Message::assistant_with_tools(
                None,
                vec![
                    ToolCall::new("c1", "does_not_exist", "{}"),
                    ToolCall::new("c2", "terminate", "{not json"),
                ],
            )),
            Ok(Message::assistant("done")),
        ]);
        let executor = executor(transport, ExecutorConfig::default());
        let mut memory = Memory::new();

        let result = executor.run(&mut memory, "go", "default").await;

        assert_eq!(result.output, "done");
        let tool_messages: Vec<&Message> = memory
            .messages()
            .iter()
            .filter(|m| m.role == crate::provider::Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("c2"));
        assert!(tool_messages[0].text().starts_with("Error: Failed to parse arguments"));
    }
}
