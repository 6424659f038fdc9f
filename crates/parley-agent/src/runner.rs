use crate::config::{AgentConfig, FirstTurnText};
use crate::llm::LlmClient;
use crate::turn::{ModelTurn, TurnEvent, TurnSummary};
use futures_util::Stream;
use parley_core::{
    ConversationTurn, History, ParleyError, ParleyResult, StreamEvent, ToolCall, ToolDeclaration,
    ToolResult,
};
use parley_skills::SkillRegistry;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{error, info, warn};

const EMPTY_RESPONSE_FALLBACK: &str =
    "I received your query but couldn't generate a response. Please try again.";

/// Turns queries into event streams.
///
/// Shared by every request; each query gets its own [`Orchestration`] with
/// its own history.
pub struct AgentRunner {
    llm: Arc<LlmClient>,
    skills: Arc<SkillRegistry>,
    config: AgentConfig,
}

impl AgentRunner {
    /// Creates a runner over a shared client and tool registry.
    pub fn new(llm: Arc<LlmClient>, skills: Arc<SkillRegistry>, config: AgentConfig) -> Self {
        Self {
            llm,
            skills,
            config,
        }
    }

    /// Starts processing a query.
    ///
    /// An empty or whitespace-only query is rejected before any event exists.
    /// Nothing runs until the returned orchestration is polled.
    pub fn run(&self, query: &str) -> ParleyResult<Orchestration> {
        if query.trim().is_empty() {
            return Err(ParleyError::Validation(
                "query must be a non-empty string".into(),
            ));
        }

        info!(query_len = query.len(), "Starting query");
        Ok(Orchestration {
            llm: self.llm.clone(),
            skills: self.skills.clone(),
            config: self.config.clone(),
            tools: self.skills.declarations(),
            history: History::new(),
            state: State::Init {
                query: query.to_string(),
            },
            outbox: VecDeque::new(),
            turns_started: 0,
        })
    }
}

enum State {
    Init {
        query: String,
    },
    Streaming {
        turn: ModelTurn,
        first: bool,
    },
    Executing {
        calls: VecDeque<ToolCall>,
        results: Vec<ToolResult>,
    },
    Invoking {
        call: ToolCall,
        input: String,
        rest: VecDeque<ToolCall>,
        results: Vec<ToolResult>,
    },
    Done,
}

/// The event sequence of one query, produced on demand.
///
/// Each [`next_event`](Self::next_event) call advances the agent loop just far
/// enough to produce the next event, so a slow reader holds the backend back
/// and dropping the orchestration cancels whatever is in flight: the backend
/// turn's reader task and any running tool call.
pub struct Orchestration {
    llm: Arc<LlmClient>,
    skills: Arc<SkillRegistry>,
    config: AgentConfig,
    tools: Vec<ToolDeclaration>,
    history: History,
    state: State,
    outbox: VecDeque<StreamEvent>,
    turns_started: u32,
}

impl Orchestration {
    /// The next event, or `None` once the query has been fully answered or
    /// has failed. An `error` event is always the last one.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.outbox.pop_front() {
                return Some(event);
            }

            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::Init { query } => {
                    self.history.push(ConversationTurn::user(query));
                    self.start_turn().await;
                }
                State::Streaming { mut turn, first } => match turn.next_event().await {
                    Some(Ok(TurnEvent::TextDelta(text))) => {
                        if !first {
                            self.outbox.push_back(StreamEvent::response(text));
                        } else if self.config.first_turn_text == FirstTurnText::Streamed {
                            self.outbox.push_back(StreamEvent::reasoning(text));
                        }
                        self.state = State::Streaming { turn, first };
                    }
                    Some(Ok(TurnEvent::Completed(summary))) => self.finish_turn(summary, first),
                    Some(Ok(TurnEvent::Empty)) | None => {
                        info!(turns = self.turns_started, "Model produced no content");
                        self.outbox
                            .push_back(StreamEvent::response(EMPTY_RESPONSE_FALLBACK));
                    }
                    Some(Err(e)) => self.fail(e),
                },
                State::Executing { mut calls, results } => match calls.pop_front() {
                    Some(call) => self.announce(call, calls, results),
                    None => {
                        // Every call of the model turn is answered in one tool turn.
                        self.history.push(ConversationTurn::tool_results(&results));
                        self.start_turn().await;
                    }
                },
                State::Invoking {
                    call,
                    input,
                    rest,
                    mut results,
                } => {
                    let result = self.skills.invoke(&call).await;
                    self.outbox.push_back(StreamEvent::tool_resolved(
                        &call.name,
                        input,
                        &result.content,
                    ));
                    results.push(result);
                    self.state = State::Executing {
                        calls: rest,
                        results,
                    };
                }
            }
        }
    }

    /// Adapts this orchestration to a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        futures_util::stream::unfold(self, |mut orchestration| async move {
            orchestration
                .next_event()
                .await
                .map(|event| (event, orchestration))
        })
    }

    async fn start_turn(&mut self) {
        if self.turns_started >= self.config.max_turns {
            self.fail(ParleyError::Agent(format!(
                "Exceeded the maximum of {} model turns",
                self.config.max_turns
            )));
            return;
        }
        self.turns_started += 1;
        info!(turn = self.turns_started, "Starting model turn");

        match ModelTurn::start(
            &self.llm,
            &self.history,
            &self.tools,
            self.config.max_turn_text_bytes,
        )
        .await
        {
            Ok(turn) => {
                self.state = State::Streaming {
                    turn,
                    first: self.turns_started == 1,
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn finish_turn(&mut self, summary: TurnSummary, first: bool) {
        self.history
            .push(ConversationTurn::model(&summary.text, &summary.tool_calls));

        if summary.tool_calls.is_empty() {
            // Continuation text has already gone out as response deltas.
            if first {
                self.outbox.push_back(StreamEvent::response(summary.text));
            }
            info!(turns = self.turns_started, "Query answered");
            return;
        }

        if summary.text.is_empty() {
            if let Some(notice) = &self.config.intent_notice {
                self.outbox.push_back(StreamEvent::reasoning(notice.clone()));
            }
        } else if first && self.config.first_turn_text == FirstTurnText::Buffered {
            self.outbox.push_back(StreamEvent::reasoning(summary.text));
        }

        info!(
            turn = self.turns_started,
            tool_calls = summary.tool_calls.len(),
            "Model requested tools"
        );
        let results = Vec::with_capacity(summary.tool_calls.len());
        self.state = State::Executing {
            calls: summary.tool_calls.into(),
            results,
        };
    }

    fn announce(
        &mut self,
        call: ToolCall,
        rest: VecDeque<ToolCall>,
        mut results: Vec<ToolResult>,
    ) {
        if !self.skills.contains(&call.name) {
            warn!(tool = %call.name, "Model requested an unregistered tool");
            results.push(ToolResult::error(
                &call.name,
                format!("Error: unknown tool '{}'", call.name),
            ));
            self.state = State::Executing {
                calls: rest,
                results,
            };
            return;
        }

        let input = self.skills.describe_input(&call);
        self.outbox
            .push_back(StreamEvent::tool_pending(&call.name, input.clone()));
        self.state = State::Invoking {
            call,
            input,
            rest,
            results,
        };
    }

    fn fail(&mut self, e: ParleyError) {
        error!(error = %e, "Query failed");
        self.outbox.push_back(StreamEvent::error(e.to_string()));
        self.state = State::Done;
    }
}

impl Drop for Orchestration {
    fn drop(&mut self) {
        if !matches!(self.state, State::Done) || !self.outbox.is_empty() {
            info!(turns = self.turns_started, "Query abandoned before completion");
        }
    }
}
