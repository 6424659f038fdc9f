#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use futures_util::StreamExt;
use parley_agent::backends::{ArgumentsDelta, BackendChunk, ChunkStream, LlmBackend, ToolCallDelta};
use parley_agent::{AgentConfig, AgentRunner, FirstTurnText, LlmClient, ModelConfig};
use parley_core::{
    ConversationTurn, ParleyError, ParleyResult, Part, Role, StreamEvent, ToolDeclaration,
    ToolResult,
};
use parley_skills::{Skill, SkillRegistry};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Scripted backend and recording tool
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Step {
    Text(&'static str),
    Call(&'static str, Value),
    Fail(&'static str),
}

/// Plays one scripted turn per `stream_turn` call and records the history it
/// was given. Runs out of script into empty turns.
struct ScriptedBackend {
    turns: Mutex<VecDeque<Vec<Step>>>,
    seen: Mutex<Vec<Vec<ConversationTurn>>>,
    repeat_last: bool,
}

impl ScriptedBackend {
    fn new(turns: Vec<Vec<Step>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            seen: Mutex::new(Vec::new()),
            repeat_last: false,
        })
    }

    fn looping(turn: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(vec![turn].into()),
            seen: Mutex::new(Vec::new()),
            repeat_last: true,
        })
    }

    fn histories(&self) -> Vec<Vec<ConversationTurn>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn stream_turn(
        &self,
        history: &[ConversationTurn],
        _tools: &[ToolDeclaration],
    ) -> ParleyResult<ChunkStream> {
        self.seen.lock().unwrap().push(history.to_vec());

        let steps = {
            let mut turns = self.turns.lock().unwrap();
            if self.repeat_last {
                turns.front().cloned().unwrap_or_default()
            } else {
                turns.pop_front().unwrap_or_default()
            }
        };

        let items = steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| match step {
                Step::Text(text) => Ok(BackendChunk::text(text)),
                Step::Call(name, args) => Ok(BackendChunk::tool_call(ToolCallDelta {
                    index,
                    name: Some(name.to_string()),
                    arguments: ArgumentsDelta::Value(args),
                })),
                Step::Fail(message) => Err(ParleyError::Backend(message.to_string())),
            })
            .collect();
        Ok(ChunkStream::from_items(items))
    }
}

struct RecordingSearch {
    descriptor: ToolDeclaration,
    output: ToolResult,
    calls: AtomicUsize,
}

impl RecordingSearch {
    fn new(output: ToolResult) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ToolDeclaration {
                name: "web_search".into(),
                description: "Search the web".into(),
                parameters_schema: json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                }),
            },
            output,
            calls: AtomicUsize::new(0),
        })
    }

    fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Skill for RecordingSearch {
    fn descriptor(&self) -> &ToolDeclaration {
        &self.descriptor
    }

    async fn execute(&self, _arguments: Value) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output.clone()
    }
}

fn runner_with(
    backend: Arc<dyn LlmBackend>,
    search: Option<Arc<RecordingSearch>>,
    config: AgentConfig,
) -> AgentRunner {
    let mut registry = SkillRegistry::new();
    if let Some(search) = search {
        registry.register(search).unwrap();
    }
    AgentRunner::new(
        Arc::new(LlmClient::from_backend(backend)),
        Arc::new(registry),
        config,
    )
}

async fn collect(runner: &AgentRunner, query: &str) -> Vec<StreamEvent> {
    runner.run(query).unwrap().into_stream().collect().await
}

fn search_call(query: &str) -> Step {
    Step::Call("web_search", json!({"query": query}))
}

// ---------------------------------------------------------------------------
// 1. Direct answers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direct_answer_is_single_response() {
    let backend = ScriptedBackend::new(vec![vec![Step::Text("4")]]);
    let runner = runner_with(backend, None, AgentConfig::default());

    assert_eq!(collect(&runner, "2+2?").await, vec![StreamEvent::response("4")]);
}

#[tokio::test]
async fn buffered_first_turn_joins_fragments() {
    let backend = ScriptedBackend::new(vec![vec![Step::Text("It is "), Step::Text("4.")]]);
    let runner = runner_with(backend, None, AgentConfig::default());

    assert_eq!(
        collect(&runner, "2+2?").await,
        vec![StreamEvent::response("It is 4.")]
    );
}

#[tokio::test]
async fn streamed_first_turn_sends_reasoning_then_response() {
    let backend = ScriptedBackend::new(vec![vec![Step::Text("It is "), Step::Text("4.")]]);
    let config = AgentConfig {
        first_turn_text: FirstTurnText::Streamed,
        ..Default::default()
    };
    let runner = runner_with(backend, None, config);

    assert_eq!(
        collect(&runner, "2+2?").await,
        vec![
            StreamEvent::reasoning("It is "),
            StreamEvent::reasoning("4."),
            StreamEvent::response("It is 4."),
        ]
    );
}

#[tokio::test]
async fn empty_turn_gets_fallback_response() {
    let backend = ScriptedBackend::new(vec![vec![]]);
    let runner = runner_with(backend, None, AgentConfig::default());

    assert_eq!(
        collect(&runner, "hello").await,
        vec![StreamEvent::response(
            "I received your query but couldn't generate a response. Please try again."
        )]
    );
}

// ---------------------------------------------------------------------------
// 2. Tool use
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_produces_pending_resolved_pair_then_response() {
    let backend = ScriptedBackend::new(vec![
        vec![search_call("weather in Paris")],
        vec![Step::Text("It is sunny "), Step::Text("in Paris.")],
    ]);
    let search = RecordingSearch::new(ToolResult::success("web_search", "Sunny, 20C"));
    let runner = runner_with(backend.clone(), Some(search.clone()), AgentConfig::default());

    let events = collect(&runner, "current weather in Paris").await;
    assert_eq!(
        events,
        vec![
            StreamEvent::tool_pending("web_search", "weather in Paris"),
            StreamEvent::tool_resolved("web_search", "weather in Paris", "Sunny, 20C"),
            StreamEvent::response("It is sunny "),
            StreamEvent::response("in Paris."),
        ]
    );
    assert_eq!(search.count(), 1);

    let histories = backend.histories();
    assert_eq!(histories.len(), 2);
    assert_eq!(histories[0].len(), 1);
    let continuation = &histories[1];
    let roles: Vec<Role> = continuation.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Model, Role::Tool]);
    assert_eq!(continuation[0], histories[0][0]);
    assert_eq!(
        continuation[2].parts,
        vec![Part::FunctionResponse {
            name: "web_search".into(),
            content: "Sunny, 20C".into(),
        }]
    );
}

#[tokio::test]
async fn buffered_text_before_tools_is_one_reasoning_event() {
    let backend = ScriptedBackend::new(vec![
        vec![
            Step::Text("Let me "),
            Step::Text("look that up."),
            search_call("rust 2024 edition"),
        ],
        vec![Step::Text("Released in 2025.")],
    ]);
    let search = RecordingSearch::new(ToolResult::success("web_search", "Rust 1.85"));
    let runner = runner_with(backend, Some(search), AgentConfig::default());

    let events = collect(&runner, "When was the 2024 edition released?").await;
    assert_eq!(events[0], StreamEvent::reasoning("Let me look that up."));
    assert_eq!(events[1], StreamEvent::tool_pending("web_search", "rust 2024 edition"));
    assert_eq!(events.last().unwrap(), &StreamEvent::response("Released in 2025."));
    assert_eq!(events.len(), 4);
}

#[tokio::test]
async fn intent_notice_precedes_silent_tool_calls() {
    let backend = ScriptedBackend::new(vec![vec![search_call("q")], vec![Step::Text("done")]]);
    let search = RecordingSearch::new(ToolResult::success("web_search", "r"));
    let config = AgentConfig {
        intent_notice: Some(
            "I need to search for current information to answer this accurately.".into(),
        ),
        ..Default::default()
    };
    let runner = runner_with(backend, Some(search), config);

    let events = collect(&runner, "news").await;
    assert_eq!(
        events[0],
        StreamEvent::reasoning("I need to search for current information to answer this accurately.")
    );
    assert!(matches!(events[1], StreamEvent::ToolCall { output: None, .. }));
}

#[tokio::test]
async fn tool_failure_does_not_abort_the_query() {
    let backend = ScriptedBackend::new(vec![
        vec![search_call("q")],
        vec![Step::Text("Search is unavailable right now.")],
    ]);
    let search = RecordingSearch::new(ToolResult::error(
        "web_search",
        "Error: SERPAPI_KEY environment variable is required for web search.",
    ));
    let runner = runner_with(backend, Some(search), AgentConfig::default());

    let events = collect(&runner, "news").await;
    assert_eq!(
        events[1],
        StreamEvent::tool_resolved(
            "web_search",
            "q",
            "Error: SERPAPI_KEY environment variable is required for web search."
        )
    );
    assert_eq!(
        events.last().unwrap(),
        &StreamEvent::response("Search is unavailable right now.")
    );
    assert!(!events.iter().any(StreamEvent::is_error));
}

#[tokio::test]
async fn multiple_calls_run_sequentially_in_order() {
    let backend = ScriptedBackend::new(vec![
        vec![search_call("first"), search_call("second")],
        vec![Step::Text("both")],
    ]);
    let search = RecordingSearch::new(ToolResult::success("web_search", "ok"));
    let runner = runner_with(backend.clone(), Some(search.clone()), AgentConfig::default());

    let events = collect(&runner, "two things").await;
    assert_eq!(
        events,
        vec![
            StreamEvent::tool_pending("web_search", "first"),
            StreamEvent::tool_resolved("web_search", "first", "ok"),
            StreamEvent::tool_pending("web_search", "second"),
            StreamEvent::tool_resolved("web_search", "second", "ok"),
            StreamEvent::response("both"),
        ]
    );
    assert_eq!(search.count(), 2);

    let continuation = &backend.histories()[1];
    let roles: Vec<Role> = continuation.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Model, Role::Tool]);
    assert_eq!(continuation[1].parts.len(), 2);
    assert_eq!(
        continuation[2].parts,
        vec![
            Part::FunctionResponse {
                name: "web_search".into(),
                content: "ok".into(),
            },
            Part::FunctionResponse {
                name: "web_search".into(),
                content: "ok".into(),
            },
        ]
    );
}

#[tokio::test]
async fn known_and_unknown_calls_are_answered_in_one_tool_turn() {
    let backend = ScriptedBackend::new(vec![
        vec![
            search_call("weather in Paris"),
            Step::Call("calculator", json!({"expr": "2+2"})),
        ],
        vec![Step::Text("Sunny, and 4.")],
    ]);
    let search = RecordingSearch::new(ToolResult::success("web_search", "Sunny, 20C"));
    let runner = runner_with(backend.clone(), Some(search), AgentConfig::default());

    let events = collect(&runner, "weather and 2+2").await;
    assert_eq!(events.last().unwrap(), &StreamEvent::response("Sunny, and 4."));

    let continuation = &backend.histories()[1];
    assert_eq!(continuation.len(), 3);
    assert_eq!(
        continuation[2].parts,
        vec![
            Part::FunctionResponse {
                name: "web_search".into(),
                content: "Sunny, 20C".into(),
            },
            Part::FunctionResponse {
                name: "calculator".into(),
                content: "Error: unknown tool 'calculator'".into(),
            },
        ]
    );
}

#[tokio::test]
async fn unknown_tool_emits_nothing_and_informs_the_model() {
    let backend = ScriptedBackend::new(vec![
        vec![Step::Call("calculator", json!({"expr": "2+2"}))],
        vec![Step::Text("4")],
    ]);
    let search = RecordingSearch::new(ToolResult::success("web_search", "unused"));
    let runner = runner_with(backend.clone(), Some(search.clone()), AgentConfig::default());

    let events = collect(&runner, "2+2?").await;
    assert_eq!(events, vec![StreamEvent::response("4")]);
    assert_eq!(search.count(), 0);

    let continuation = &backend.histories()[1];
    assert_eq!(
        continuation.last().unwrap().parts,
        vec![Part::FunctionResponse {
            name: "calculator".into(),
            content: "Error: unknown tool 'calculator'".into(),
        }]
    );
}

// ---------------------------------------------------------------------------
// 3. Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_credential_is_single_error_event() {
    let runner = AgentRunner::new(
        Arc::new(LlmClient::new(ModelConfig::default())),
        Arc::new(SkillRegistry::new()),
        AgentConfig::default(),
    );

    let events = collect(&runner, "2+2?").await;
    assert_eq!(
        events,
        vec![StreamEvent::error(
            "Config error: GEMINI_API_KEY environment variable is required"
        )]
    );
}

#[tokio::test]
async fn backend_failure_mid_stream_ends_with_error() {
    let backend = ScriptedBackend::new(vec![vec![
        Step::Text("partial"),
        Step::Fail("connection reset"),
    ]]);
    let config = AgentConfig {
        first_turn_text: FirstTurnText::Streamed,
        ..Default::default()
    };
    let runner = runner_with(backend, None, config);

    let mut orchestration = runner.run("anything").unwrap();
    assert_eq!(
        orchestration.next_event().await,
        Some(StreamEvent::reasoning("partial"))
    );
    assert_eq!(
        orchestration.next_event().await,
        Some(StreamEvent::error("Backend error: connection reset"))
    );
    assert_eq!(orchestration.next_event().await, None);
    assert_eq!(orchestration.next_event().await, None);
}

#[tokio::test]
async fn turn_limit_is_reported_as_error() {
    let backend = ScriptedBackend::looping(vec![search_call("again")]);
    let search = RecordingSearch::new(ToolResult::success("web_search", "more"));
    let config = AgentConfig {
        max_turns: 2,
        ..Default::default()
    };
    let runner = runner_with(backend.clone(), Some(search.clone()), config);

    let events = collect(&runner, "loop forever").await;
    assert_eq!(
        events.last().unwrap(),
        &StreamEvent::error("Agent error: Exceeded the maximum of 2 model turns")
    );
    assert_eq!(events.iter().filter(|e| e.is_error()).count(), 1);
    assert_eq!(search.count(), 2);
    assert_eq!(backend.histories().len(), 2);
}

#[test]
fn blank_query_is_rejected_before_any_event() {
    let backend = ScriptedBackend::new(vec![]);
    let runner = runner_with(backend.clone(), None, AgentConfig::default());

    assert!(matches!(runner.run(""), Err(ParleyError::Validation(_))));
    assert!(matches!(runner.run("   \n"), Err(ParleyError::Validation(_))));
    assert!(backend.histories().is_empty());
}

// ---------------------------------------------------------------------------
// 4. Cancellation
// ---------------------------------------------------------------------------

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Sends one fragment, then stalls until aborted.
struct StallingBackend {
    released: Arc<AtomicBool>,
}

#[async_trait]
impl LlmBackend for StallingBackend {
    async fn stream_turn(
        &self,
        _history: &[ConversationTurn],
        _tools: &[ToolDeclaration],
    ) -> ParleyResult<ChunkStream> {
        let guard = SetOnDrop(self.released.clone());
        Ok(ChunkStream::spawn(4, move |tx| async move {
            let _guard = guard;
            let _ = tx.send(Ok(BackendChunk::text("thinking"))).await;
            std::future::pending::<()>().await;
        }))
    }
}

#[tokio::test]
async fn dropping_the_orchestration_releases_the_backend() {
    let released = Arc::new(AtomicBool::new(false));
    let backend = Arc::new(StallingBackend {
        released: released.clone(),
    });
    let config = AgentConfig {
        first_turn_text: FirstTurnText::Streamed,
        ..Default::default()
    };
    let runner = runner_with(backend, None, config);

    let mut orchestration = runner.run("slow question").unwrap();
    assert_eq!(
        orchestration.next_event().await,
        Some(StreamEvent::reasoning("thinking"))
    );
    drop(orchestration);

    for _ in 0..50 {
        if released.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("backend reader was not aborted");
}
