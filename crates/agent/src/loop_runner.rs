//! The reasoning loop: a bounded think → call tool → observe cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde_json::{Map, Value};
use todoclaw_core::channel::ToolChannel;
use todoclaw_core::error::ProviderError;
use todoclaw_core::event::{DomainEvent, EventBus};
use todoclaw_core::message::{Conversation, Message, MessageToolCall};
use todoclaw_core::provider::{Provider, ProviderRequest, ToolDefinition};
use todoclaw_core::tool::{
    FailureKind, ToolCallRequest, ToolCallResult, ToolFailure, ToolOutcome, tool_definitions,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Answer used when the model ends its turn without any text.
const EMPTY_ANSWER: &str = "I'm sorry, I couldn't process your request.";

/// Model parameters and the tool-call bound for one loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Tool calls allowed per run; asking for one more aborts.
    pub max_tool_calls: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            max_tokens: None,
            max_tool_calls: 8,
        }
    }
}

/// Where the loop is. `Finished` and `Aborted` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Waiting on the model.
    Thinking,
    /// A call is on the channel.
    ToolInvoked(ToolCallRequest),
    /// A result is about to be recorded.
    Observing(ToolCallResult),
    Finished(String),
    Aborted(AbortReason),
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Finished(_) | LoopState::Aborted(_))
    }

    fn label(&self) -> &'static str {
        match self {
            LoopState::Thinking => "thinking",
            LoopState::ToolInvoked(_) => "tool_invoked",
            LoopState::Observing(_) => "observing",
            LoopState::Finished(_) => "finished",
            LoopState::Aborted(_) => "aborted",
        }
    }
}

/// Why a run stopped before the model produced a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    IterationLimit,
    ChannelFailure,
    Unauthorized,
    DeadlineExceeded,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::IterationLimit => "iteration_limit",
            AbortReason::ChannelFailure => "channel_failure",
            AbortReason::Unauthorized => "unauthorized",
            AbortReason::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// The answer returned to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            AbortReason::IterationLimit => {
                "I wasn't able to finish this request within the allowed number of steps. \
                 Please try a simpler or more specific request."
            }
            AbortReason::ChannelFailure => {
                "I'm sorry, I couldn't reach your todo list right now. Please try again in a moment."
            }
            AbortReason::Unauthorized => {
                "Your session has expired or is no longer valid. Please sign in again and retry."
            }
            AbortReason::DeadlineExceeded => {
                "I'm sorry, that took too long to complete. Please try again."
            }
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the model asked for in one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    FinalAnswer(String),
    ToolCall(ToolCallRequest),
    /// A tool call whose arguments are not a JSON object. Never sent to the
    /// channel; answered locally with an `InvalidArguments` observation.
    MalformedCall {
        id: String,
        tool: String,
        failure: ToolFailure,
    },
}

impl Decision {
    /// Classify a model reply. Only the first tool call is considered.
    pub fn from_reply(reply: &Message) -> Self {
        let Some(call) = reply.tool_calls.first() else {
            return Decision::FinalAnswer(reply.content.clone());
        };
        if reply.tool_calls.len() > 1 {
            warn!(
                requested = reply.tool_calls.len(),
                kept = %call.name,
                "Model requested several tool calls, keeping the first"
            );
        }

        match parse_arguments(&call.arguments) {
            Ok(arguments) => Decision::ToolCall(ToolCallRequest::new(
                Some(call.id.clone()),
                call.name.clone(),
                arguments,
            )),
            Err(failure) => Decision::MalformedCall {
                id: if call.id.is_empty() {
                    format!("call_{}", Uuid::new_v4().simple())
                } else {
                    call.id.clone()
                },
                tool: call.name.clone(),
                failure,
            },
        }
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, ToolFailure> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolFailure::invalid_argument(
            "arguments",
            format!("expected a JSON object, got {other}"),
        )),
        Err(e) => Err(ToolFailure::invalid_argument(
            "arguments",
            format!("arguments are not valid JSON: {e}"),
        )),
    }
}

/// How a loop ended.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// `Finished` or `Aborted`.
    pub state: LoopState,
    pub response: String,
    pub tool_calls: usize,
    pub conversation: Conversation,
}

impl LoopOutcome {
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match &self.state {
            LoopState::Aborted(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Drives one conversation to a final answer over one tool channel.
pub struct ReasoningLoop {
    provider: Arc<dyn Provider>,
    settings: LoopSettings,
    tools: Vec<ToolDefinition>,
    events: Arc<EventBus>,
    /// Tool calls issued by the current `run`, readable after it is cancelled.
    calls_made: AtomicUsize,
}

impl ReasoningLoop {
    pub fn new(provider: Arc<dyn Provider>, settings: LoopSettings, events: Arc<EventBus>) -> Self {
        Self {
            provider,
            settings,
            tools: tool_definitions(),
            events,
            calls_made: AtomicUsize::new(0),
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Tool calls issued so far by the most recent `run`, including one that
    /// was dropped before it finished.
    pub fn tool_calls_made(&self) -> usize {
        self.calls_made.load(Ordering::Relaxed)
    }

    /// Run until the model answers or the run aborts.
    ///
    /// `conversation` must already start with the system prompt and end with
    /// the user's message. Provider failures are returned as errors; every
    /// other way of stopping yields a `LoopOutcome` with response text.
    pub async fn run(
        &self,
        run_id: &str,
        channel: &mut dyn ToolChannel,
        mut conversation: Conversation,
    ) -> Result<LoopOutcome, ProviderError> {
        let mut state = LoopState::Thinking;
        let mut tool_calls = 0usize;
        self.calls_made.store(0, Ordering::Relaxed);

        while !state.is_terminal() {
            debug!(run_id, state = state.label(), tool_calls, "Loop step");
            state = match state {
                LoopState::Thinking => {
                    let reply = self.think(run_id, &conversation).await?;
                    match Decision::from_reply(&reply) {
                        Decision::FinalAnswer(text) => {
                            conversation = conversation.with(Message::assistant(&text));
                            LoopState::Finished(text)
                        }
                        _ if tool_calls >= self.settings.max_tool_calls => {
                            warn!(run_id, limit = self.settings.max_tool_calls, "Tool call limit reached");
                            LoopState::Aborted(AbortReason::IterationLimit)
                        }
                        Decision::ToolCall(request) => {
                            tool_calls += 1;
                            self.calls_made.store(tool_calls, Ordering::Relaxed);
                            conversation = conversation.with(Message::assistant_tool_call(
                                &reply.content,
                                MessageToolCall {
                                    id: request.id.clone(),
                                    name: request.name.clone(),
                                    arguments: Value::Object(request.arguments.clone()).to_string(),
                                },
                            ));
                            LoopState::ToolInvoked(request)
                        }
                        Decision::MalformedCall { id, tool, failure } => {
                            tool_calls += 1;
                            self.calls_made.store(tool_calls, Ordering::Relaxed);
                            debug!(run_id, %tool, "Answering malformed tool call locally");
                            let raw = reply.tool_calls.first().map(|c| c.arguments.clone()).unwrap_or_default();
                            conversation = conversation.with(Message::assistant_tool_call(
                                &reply.content,
                                MessageToolCall {
                                    id: id.clone(),
                                    name: tool.clone(),
                                    arguments: raw,
                                },
                            ));
                            self.publish_tool(run_id, &tool, &ToolOutcome::Failure(failure.clone()), 0);
                            LoopState::Observing(ToolCallResult {
                                id,
                                outcome: ToolOutcome::Failure(failure),
                            })
                        }
                    }
                }

                LoopState::ToolInvoked(request) => {
                    let tool = request.name.clone();
                    let started = Instant::now();
                    match channel.call(request).await {
                        Ok(result) => {
                            let duration_ms = started.elapsed().as_millis() as u64;
                            self.publish_tool(run_id, &tool, &result.outcome, duration_ms);
                            LoopState::Observing(result)
                        }
                        Err(e) => {
                            warn!(run_id, %tool, error = %e, "Tool channel failed");
                            LoopState::Aborted(AbortReason::ChannelFailure)
                        }
                    }
                }

                LoopState::Observing(result) => {
                    let unauthorized = result.outcome.failure_kind() == Some(FailureKind::Unauthorized);
                    conversation = conversation.with(Message::tool_result(
                        &result.id,
                        result.outcome.to_observation(),
                    ));
                    if unauthorized {
                        warn!(run_id, "Upstream rejected the credential");
                        LoopState::Aborted(AbortReason::Unauthorized)
                    } else {
                        LoopState::Thinking
                    }
                }

                terminal @ (LoopState::Finished(_) | LoopState::Aborted(_)) => terminal,
            };
        }

        let response = match &state {
            LoopState::Finished(text) if text.trim().is_empty() => EMPTY_ANSWER.to_string(),
            LoopState::Finished(text) => text.clone(),
            LoopState::Aborted(reason) => reason.user_message().to_string(),
            _ => EMPTY_ANSWER.to_string(),
        };

        info!(run_id, state = state.label(), tool_calls, "Reasoning loop ended");

        Ok(LoopOutcome {
            state,
            response,
            tool_calls,
            conversation,
        })
    }

    async fn think(&self, run_id: &str, conversation: &Conversation) -> Result<Message, ProviderError> {
        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages: conversation.turns().to_vec(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            tools: self.tools.clone(),
        };

        let response = self.provider.complete(request).await?;

        if let Some(usage) = &response.usage {
            self.events.publish(DomainEvent::ResponseGenerated {
                run_id: run_id.to_string(),
                model: response.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(response.message)
    }

    fn publish_tool(&self, run_id: &str, tool: &str, outcome: &ToolOutcome, duration_ms: u64) {
        self.events.publish(DomainEvent::ToolExecuted {
            run_id: run_id.to_string(),
            tool_name: tool.to_string(),
            success: outcome.is_success(),
            failure: outcome.failure_kind().map(|k| k.to_string()),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        ScriptedChannel, SequentialMockProvider, make_text_response, make_tool_call,
        make_tool_call_response,
    };
    use serde_json::json;
    use todoclaw_core::error::ChannelError;
    use todoclaw_core::message::Role;

    fn start(message: &str) -> Conversation {
        Conversation::new()
            .with(Message::system("You manage todos"))
            .with(Message::user(message))
    }

    fn agent(provider: Arc<SequentialMockProvider>, max_tool_calls: usize) -> ReasoningLoop {
        ReasoningLoop::new(
            provider,
            LoopSettings {
                max_tool_calls,
                ..LoopSettings::default()
            },
            Arc::new(EventBus::default()),
        )
    }

    #[test]
    fn decision_keeps_only_first_tool_call() {
        let mut reply = Message::assistant("");
        reply.tool_calls = vec![
            make_tool_call("list_todos", json!({})),
            make_tool_call("delete_todo", json!({"todo_id": 1})),
        ];
        match Decision::from_reply(&reply) {
            Decision::ToolCall(req) => {
                assert_eq!(req.name, "list_todos");
                assert_eq!(req.id, "call_list_todos");
            }
            other => panic!("Expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn decision_flags_malformed_arguments() {
        let mut reply = Message::assistant("");
        reply.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "create_todo".into(),
            arguments: "{\"name\": ".into(),
        }];
        match Decision::from_reply(&reply) {
            Decision::MalformedCall { id, tool, failure } => {
                assert_eq!(id, "call_1");
                assert_eq!(tool, "create_todo");
                assert_eq!(failure.kind, FailureKind::InvalidArguments);
            }
            other => panic!("Expected MalformedCall, got {other:?}"),
        }

        reply.tool_calls[0].arguments = "[1, 2]".into();
        assert!(matches!(Decision::from_reply(&reply), Decision::MalformedCall { .. }));

        reply.tool_calls[0].arguments = String::new();
        assert!(matches!(Decision::from_reply(&reply), Decision::ToolCall(_)));
    }

    #[test]
    fn text_reply_is_final_answer() {
        assert_eq!(
            Decision::from_reply(&Message::assistant("Done")),
            Decision::FinalAnswer("Done".into())
        );
    }

    #[tokio::test]
    async fn creates_todo_then_answers() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("create_todo", json!({"name": "Buy milk", "due_date": "2025-01-01T09:00:00"}))],
            "",
            "Added \"Buy milk\" for January 1st at 9am.",
        ));
        let mut channel = ScriptedChannel::new(vec![Ok(ToolOutcome::Success(
            json!({"id": 1, "name": "Buy milk", "due_date": "2025-01-01T09:00:00", "is_completed": false}),
        ))]);

        let outcome = agent(provider.clone(), 8)
            .run("run-1", &mut channel, start("Add buy milk tomorrow 9am"))
            .await
            .unwrap();

        assert_eq!(outcome.state, LoopState::Finished("Added \"Buy milk\" for January 1st at 9am.".into()));
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(provider.call_count(), 2);

        let sent = channel.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name, "create_todo");
        assert_eq!(sent[0].arguments["due_date"], "2025-01-01T09:00:00");

        let turns = outcome.conversation.turns();
        let roles: Vec<Role> = turns.iter().map(|m| m.role.clone()).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(turns[3].tool_call_id.as_deref(), Some(sent[0].id.as_str()));
        assert_eq!(turns[2].tool_calls[0].id, sent[0].id);
    }

    #[tokio::test]
    async fn not_found_is_observed_without_retry() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("delete_todo", json!({"todo_id": 999}))],
            "",
            "I couldn't find todo 999.",
        ));
        let mut channel = ScriptedChannel::new(vec![Ok(ToolOutcome::Failure(ToolFailure::not_found("Todo not found")))]);

        let outcome = agent(provider.clone(), 8)
            .run("run-1", &mut channel, start("Delete todo 999"))
            .await
            .unwrap();

        assert_eq!(outcome.response, "I couldn't find todo 999.");
        assert_eq!(channel.requests().len(), 1);
        let observation = &outcome.conversation.turns()[3].content;
        assert!(observation.contains("NotFound"), "{observation}");
    }

    #[tokio::test]
    async fn unauthorized_observation_aborts_immediately() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("list_todos", json!({}))],
            "",
        )]));
        let mut channel = ScriptedChannel::new(vec![Ok(ToolOutcome::Failure(ToolFailure::unauthorized(
            "Could not validate credentials",
        )))]);

        let outcome = agent(provider.clone(), 8)
            .run("run-1", &mut channel, start("What's on my list?"))
            .await
            .unwrap();

        assert_eq!(outcome.abort_reason(), Some(AbortReason::Unauthorized));
        assert_eq!(outcome.response, AbortReason::Unauthorized.user_message());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn exceeding_tool_bound_aborts_with_text() {
        let replies = (0..4)
            .map(|_| make_tool_call_response(vec![make_tool_call("list_todos", json!({}))], ""))
            .collect();
        let provider = Arc::new(SequentialMockProvider::new(replies));
        let mut channel = ScriptedChannel::repeating(ToolOutcome::Success(json!({"todos": [], "total": 0})));

        let outcome = agent(provider.clone(), 3)
            .run("run-1", &mut channel, start("Keep listing forever"))
            .await
            .unwrap();

        assert_eq!(outcome.abort_reason(), Some(AbortReason::IterationLimit));
        assert_eq!(outcome.tool_calls, 3);
        assert_eq!(channel.requests().len(), 3);
        assert_eq!(provider.call_count(), 4);
        assert!(!outcome.response.is_empty());
    }

    #[tokio::test]
    async fn channel_error_aborts() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("get_todo", json!({"todo_id": 1}))],
            "",
        )]));
        let mut channel = ScriptedChannel::new(vec![Err(ChannelError::CallTimeout {
            call_id: "call_get_todo".into(),
            timeout_ms: 15_000,
        })]);

        let outcome = agent(provider, 8)
            .run("run-1", &mut channel, start("Show todo 1"))
            .await
            .unwrap();

        assert_eq!(outcome.abort_reason(), Some(AbortReason::ChannelFailure));
        assert_eq!(outcome.response, AbortReason::ChannelFailure.user_message());
    }

    #[tokio::test]
    async fn malformed_arguments_never_reach_channel() {
        let mut bad = make_tool_call("create_todo", json!({}));
        bad.arguments = "{not json".into();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![bad], ""),
            make_text_response("Sorry, could you repeat the todo name?"),
        ]));
        let mut channel = ScriptedChannel::new(Vec::new());

        let outcome = agent(provider, 8)
            .run("run-1", &mut channel, start("Add something"))
            .await
            .unwrap();

        assert!(channel.requests().is_empty());
        assert_eq!(outcome.tool_calls, 1);
        assert!(outcome.conversation.turns()[3].content.contains("InvalidArguments"));
        assert_eq!(outcome.response, "Sorry, could you repeat the todo name?");
    }

    #[tokio::test]
    async fn empty_final_answer_gets_fallback_text() {
        let provider = Arc::new(SequentialMockProvider::single_text("   "));
        let mut channel = ScriptedChannel::new(Vec::new());
        let outcome = agent(provider, 8).run("run-1", &mut channel, start("hi")).await.unwrap();
        assert_eq!(outcome.response, EMPTY_ANSWER);
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let provider = Arc::new(SequentialMockProvider::new(Vec::new()).failing_with(
            ProviderError::AuthenticationFailed("bad key".into()),
        ));
        let mut channel = ScriptedChannel::new(Vec::new());
        let err = agent(provider, 8).run("run-1", &mut channel, start("hi")).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn events_follow_the_run() {
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("get_todo", json!({"todo_id": 1}))],
            "",
            "Here it is.",
        ));
        let mut channel = ScriptedChannel::new(vec![Ok(ToolOutcome::Success(json!({"id": 1})))]);
        ReasoningLoop::new(provider, LoopSettings::default(), events)
            .run("run-7", &mut channel, start("Show todo 1"))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(&*first, DomainEvent::ResponseGenerated { run_id, .. } if run_id == "run-7"));
        let second = rx.recv().await.unwrap();
        assert!(matches!(&*second, DomainEvent::ToolExecuted { tool_name, success: true, .. } if tool_name == "get_todo"));
        let third = rx.recv().await.unwrap();
        assert!(matches!(&*third, DomainEvent::ResponseGenerated { .. }));
    }
}
