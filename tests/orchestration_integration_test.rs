//! Integration test for the agent executor
//!
//! Tests the complete think/act loop with mock transports and tools

use async_trait::async_trait;
use ouds::agent::{
    AgentEvent, AgentExecutor, AgentState, ExecutorConfig, FinishReason, Memory, FALLBACK_OUTPUT,
};
use ouds::config::ConfigurationLoader;
use ouds::observability::Logger;
use ouds::provider::{
    ChatRequest, ChatResponse, ChatStream, ChatTransport, Message, ProviderError, ProviderResult,
    Role, StreamChunk, ToolCall, Usage,
};
use ouds::router::ProviderRouter;
use ouds::tools::{Tool, ToolError, ToolRegistry, ToolResult};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// Mock transport replaying scripted answers
struct MockTransport {
    replies: Mutex<Vec<Message>>,
    streams: Mutex<Vec<Vec<ProviderResult<StreamChunk>>>>,
    /// Answer used once the script runs out
    repeat: Option<Message>,
    calls: Mutex<usize>,
}

impl MockTransport {
    fn new(replies: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            streams: Mutex::new(Vec::new()),
            repeat: None,
            calls: Mutex::new(0),
        })
    }

    fn repeating(message: Message) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            repeat: Some(message),
            calls: Mutex::new(0),
        })
    }

    fn streaming(streams: Vec<Vec<ProviderResult<StreamChunk>>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(Vec::new()),
            streams: Mutex::new(streams),
            repeat: None,
            calls: Mutex::new(0),
        })
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn chat_completion(&self, _request: ChatRequest) -> ProviderResult<ChatResponse> {
        *self.calls.lock().unwrap() += 1;
        let mut replies = self.replies.lock().unwrap();
        let message = if replies.is_empty() {
            self.repeat
                .clone()
                .unwrap_or_else(|| Message::assistant("TASK_COMPLETE"))
        } else {
            replies.remove(0)
        };
        Ok(ChatResponse {
            message,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }

    async fn chat_completion_stream(&self, _request: ChatRequest) -> ProviderResult<ChatStream> {
        *self.calls.lock().unwrap() += 1;
        let mut streams = self.streams.lock().unwrap();
        if streams.is_empty() {
            return Err(ProviderError::http("no stream scripted"));
        }
        let chunks = streams.remove(0);
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

// Mock tool recording every call
struct EchoTool {
    seen: Mutex<Vec<Value>>,
}

impl EchoTool {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the text argument"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult<String> {
        self.seen.lock().unwrap().push(args.clone());
        match args.get("text").and_then(Value::as_str) {
            Some(text) => Ok(text.to_string()),
            None => Err(ToolError::invalid_arguments("echo", "missing 'text'")),
        }
    }
}

fn build_executor(
    transport: Arc<MockTransport>,
    echo: Arc<EchoTool>,
    config: ExecutorConfig,
) -> AgentExecutor {
    let router = ProviderRouter::from_config(&ConfigurationLoader::get_default_config()).unwrap();
    let tools = ToolRegistry::with_terminate();
    tools.register(echo).unwrap();
    AgentExecutor::new(config, transport, Arc::new(router), tools)
}

fn echo_call(id: &str, args: &str) -> Message {
    Message::assistant_with_tools(None, vec![ToolCall::new(id, "echo", args)])
}

fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ProviderResult<StreamChunk> {
    Ok(StreamChunk::ToolCallDelta {
        index,
        id: id.map(String::from),
        name: name.map(String::from),
        arguments: args.map(String::from),
    })
}

async fn collect(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_max_steps_bounds_the_loop() {
    let transport = MockTransport::repeating(echo_call("c", r#"{"text":"again"}"#));
    let echo = EchoTool::new();
    let config = ExecutorConfig {
        max_steps: 3,
        ..Default::default()
    };
    let executor = build_executor(transport.clone(), echo.clone(), config);
    let mut memory = Memory::new();

    let result = executor.run(&mut memory, "keep going", "default").await;

    assert_eq!(result.state, AgentState::Finished);
    assert_eq!(result.reason, FinishReason::MaxStepsReached);
    assert_eq!(result.steps, 3);
    assert_eq!(result.output, FALLBACK_OUTPUT);
    assert_eq!(transport.call_count(), 3);
    assert_eq!(echo.seen().len(), 3);
    // user + 3 x (assistant, tool)
    assert_eq!(memory.len(), 7);
}

#[tokio::test]
async fn test_tool_then_answer() {
    let transport = MockTransport::new(vec![
        echo_call("c1", r#"{"text":"hello"}"#),
        Message::assistant("The tool said hello."),
    ]);
    let echo = EchoTool::new();
    let executor = build_executor(transport, echo.clone(), ExecutorConfig::default());
    let mut memory = Memory::new();

    let result = executor.run(&mut memory, "say hello", "default").await;

    assert_eq!(result.state, AgentState::Finished);
    assert_eq!(result.reason, FinishReason::Completed);
    assert_eq!(result.output, "The tool said hello.");
    assert_eq!(result.steps, 2);
    assert_eq!(echo.seen(), vec![json!({"text": "hello"})]);

    let roles: Vec<Role> = memory.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(
        memory.messages()[2].text(),
        "Observed output of cmd `echo` executed:\nhello"
    );
}

#[tokio::test]
async fn test_tool_failure_reported_to_model() {
    let transport = MockTransport::new(vec![
        echo_call("c1", r#"{"wrong":1}"#),
        Message::assistant("Sorry, that failed."),
    ]);
    let executor = build_executor(transport, EchoTool::new(), ExecutorConfig::default());
    let mut memory = Memory::new();

    let result = executor.run(&mut memory, "echo nothing", "default").await;

    assert_eq!(result.state, AgentState::Finished);
    let tool_message = &memory.messages()[2];
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.text().starts_with("Error: "));
    assert!(tool_message.text().contains("missing 'text'"));
}

#[tokio::test]
async fn test_terminate_stops_batch() {
    let transport = MockTransport::new(vec![Message::assistant_with_tools(
        None,
        vec![
            ToolCall::new("c1", "echo", r#"{"text":"first"}"#),
            ToolCall::new("c2", "terminate", r#"{"status":"success"}"#),
            ToolCall::new("c3", "echo", r#"{"text":"never"}"#),
        ],
    )]);
    let echo = EchoTool::new();
    let executor = build_executor(transport.clone(), echo.clone(), ExecutorConfig::default());
    let mut memory = Memory::new();

    let result = executor.run(&mut memory, "finish up", "default").await;

    assert_eq!(result.reason, FinishReason::Terminated);
    assert_eq!(result.steps, 1);
    assert_eq!(transport.call_count(), 1);
    assert_eq!(echo.seen(), vec![json!({"text": "first"})]);
    assert_eq!(memory.last().unwrap().tool_call_id.as_deref(), Some("c2"));
}

#[tokio::test]
async fn test_streaming_reassembles_fragmented_tool_call() {
    let transport = MockTransport::streaming(vec![
        vec![
            delta(0, Some("call_1"), Some("ec"), None),
            delta(0, None, Some("ho"), Some(r#"{"text":"#)),
            delta(0, None, None, Some(r#""hi"}"#)),
            Ok(StreamChunk::Done { usage: None }),
        ],
        vec![
            Ok(StreamChunk::Content("All ".to_string())),
            Ok(StreamChunk::Content("done.".to_string())),
            Ok(StreamChunk::Done {
                usage: Some(Usage {
                    prompt_tokens: 20,
                    completion_tokens: 2,
                    total_tokens: 22,
                }),
            }),
        ],
    ]);
    let echo = EchoTool::new();
    let executor = build_executor(transport, echo.clone(), ExecutorConfig::default());
    let mut memory = Memory::new();
    let (tx, rx) = mpsc::channel(128);

    let result = executor
        .run_streaming(&mut memory, "say hi", "default", tx)
        .await;
    let events = collect(rx).await;

    assert_eq!(result.state, AgentState::Finished);
    assert_eq!(result.output, "All done.");
    assert_eq!(echo.seen(), vec![json!({"text": "hi"})]);

    let assistant = &memory.messages()[1];
    let calls = assistant.tool_calls.as_ref().unwrap();
    assert_eq!(calls[0].id, "call_1");
    assert_eq!(calls[0].function.name, "echo");
    assert_eq!(calls[0].function.arguments, r#"{"text":"hi"}"#);

    assert_eq!(
        events.first(),
        Some(&AgentEvent::Status {
            state: AgentState::Running
        })
    );
    assert_eq!(
        events[1],
        AgentEvent::Step {
            step: 1,
            max_steps: 30
        }
    );
    let fragments = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolCallFragment { .. }))
        .count();
    assert_eq!(fragments, 3);
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Content { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "All done.");
    assert_eq!(
        events[events.len() - 2],
        AgentEvent::Status {
            state: AgentState::Finished
        }
    );
    assert_eq!(
        events.last(),
        Some(&AgentEvent::Final {
            output: "All done.".to_string()
        })
    );
}

#[tokio::test]
async fn test_stream_without_done_is_an_error() {
    let transport = MockTransport::streaming(vec![vec![Ok(StreamChunk::Content(
        "partial".to_string(),
    ))]]);
    let executor = build_executor(transport, EchoTool::new(), ExecutorConfig::default());
    let mut memory = Memory::new();
    let (tx, rx) = mpsc::channel(128);

    let result = executor
        .run_streaming(&mut memory, "hello", "default", tx)
        .await;
    let events = collect(rx).await;

    assert_eq!(result.state, AgentState::Error);
    assert_eq!(result.reason, FinishReason::Failed);
    assert!(result.error.is_some());
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::Error { .. })));
    assert_eq!(
        events.last(),
        Some(&AgentEvent::Final {
            output: FALLBACK_OUTPUT.to_string()
        })
    );
}

#[tokio::test]
async fn test_run_log_names_workspace() {
    let temp_dir = tempfile::tempdir().unwrap();
    let log_path = temp_dir.path().join("run.md");
    let logger = Logger::new(Some(&log_path), None).unwrap();

    let transport = MockTransport::new(vec![Message::assistant("Hi there.")]);
    let executor = build_executor(transport, EchoTool::new(), ExecutorConfig::default())
        .with_logger(Arc::new(logger));
    let mut memory = Memory::new();

    let result = executor.run(&mut memory, "say hi", "ws-docs").await;
    assert_eq!(result.state, AgentState::Finished);

    let content = std::fs::read_to_string(&log_path).unwrap();
    assert!(content.contains("**Workspace:** ws-docs"));
    assert!(content.contains("**Command:** say hi"));
}
