//! The agent loop state machine.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::events::{AgentEventPayload, EventEmitter, EventSink};
use super::limits::LoopLimits;
use super::types::{AgentFailure, AgentReply, LoopState, RunRequest};
use crate::error::{AgentryError, Result};
use crate::provider::{ModelProvider, ModelRequest, ModelResponse};
use crate::store::{ConversationStore, ThreadId};
use crate::tools::{ToolExecutionContext, ToolInvocation, ToolRegistry};
use crate::types::{FinishReason, GenerationSettings, Message, ToolCall, Usage};
use crate::util::RetryPolicy;

/// What a model response asks the loop to do next.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Final(String),
    /// Tool calls win over any text sent alongside them.
    CallTools { text: String, calls: Vec<ToolCall> },
    Malformed(String),
}

fn classify(response: ModelResponse) -> Step {
    if !response.tool_calls.is_empty() {
        return Step::CallTools {
            text: response.text,
            calls: response.tool_calls,
        };
    }
    if response.finish_reason == Some(FinishReason::ToolCalls) {
        return Step::Malformed("finish reason was tool_calls but no tool call was sent".into());
    }
    if response.text.trim().is_empty() {
        return Step::Malformed("response had neither text nor tool calls".into());
    }
    Step::Final(response.text)
}

/// Mutable bookkeeping for one run.
struct RunState {
    thread_id: ThreadId,
    state: LoopState,
    turns: usize,
    unknown_tool_reprompts: u32,
    usage: Usage,
    invocations: Vec<ToolInvocation>,
    deadline: Option<Instant>,
}

/// Drives a conversation thread through model calls and tool dispatch until
/// the model produces a final answer or the run fails.
///
/// States: `AWAITING_MODEL -> AWAITING_TOOL -> AWAITING_MODEL -> ... -> DONE | FAILED`.
///
/// History is only written at two points: the user prompt when the run
/// starts, and each assistant message together with the tool results that
/// answer it. Cancellation and the deadline are checked while waiting on the
/// model or a tool, never during a write, so an interrupted run leaves the
/// thread at its last complete exchange.
pub struct AgentLoop {
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    limits: LoopLimits,
    system_prompt: Option<String>,
    settings: GenerationSettings,
    model_retry: RetryPolicy,
    event_sink: Option<EventSink>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            provider,
            registry,
            store,
            limits: LoopLimits::default(),
            system_prompt: None,
            settings: GenerationSettings::default(),
            model_retry: RetryPolicy::default(),
            event_sink: None,
        }
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_model_retry(mut self, policy: RetryPolicy) -> Self {
        self.model_retry = policy;
        self
    }

    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn limits(&self) -> &LoopLimits {
        &self.limits
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub async fn run(&self, request: RunRequest) -> std::result::Result<AgentReply, AgentFailure> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run until `DONE` or `FAILED`, stopping early when `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<AgentReply, AgentFailure> {
        let emitter = EventEmitter::new(request.thread_id.clone(), self.event_sink.clone());
        let mut run = RunState {
            thread_id: request.thread_id.clone(),
            state: LoopState::AwaitingModel,
            turns: 0,
            unknown_tool_reprompts: 0,
            usage: Usage::default(),
            invocations: Vec::new(),
            deadline: self.limits.timeout.map(|t| Instant::now() + t),
        };

        match self.drive(&request, &mut run, &cancel, &emitter).await {
            Ok(text) => {
                self.transition(&mut run, LoopState::Done, &emitter);
                emitter.emit(AgentEventPayload::Completed { turns: run.turns });
                tracing::info!(thread_id = %run.thread_id, turns = run.turns, "agent run completed");
                Ok(AgentReply {
                    thread_id: run.thread_id,
                    text,
                    turns: run.turns,
                    tool_invocations: run.invocations,
                    usage: run.usage,
                })
            }
            Err(err) => {
                self.transition(&mut run, LoopState::Failed, &emitter);
                let failure = AgentFailure::from_error(&err, run.thread_id.clone(), run.turns);
                emitter.emit(AgentEventPayload::Failed {
                    kind: failure.kind,
                    message: failure.message.clone(),
                });
                tracing::warn!(
                    thread_id = %run.thread_id,
                    turns = run.turns,
                    kind = %failure.kind,
                    error = %err,
                    "agent run failed"
                );
                Err(failure)
            }
        }
    }

    async fn drive(
        &self,
        request: &RunRequest,
        run: &mut RunState,
        cancel: &CancellationToken,
        emitter: &EventEmitter,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(AgentryError::Canceled);
        }

        let mut history = self.store.history(&run.thread_id).await?;
        emitter.emit(AgentEventPayload::RunStarted {
            history_len: history.len(),
        });
        let user = Message::user(request.prompt.clone());
        self.store.append(&run.thread_id, user.clone()).await?;
        history.push(user);

        let ctx = ToolExecutionContext {
            thread_id: Some(run.thread_id.to_string()),
            user_id: request.user_id.clone(),
            tool_call_id: None,
        };

        loop {
            if run.turns >= self.limits.max_turns {
                return Err(AgentryError::TurnBudgetExceeded {
                    max_turns: self.limits.max_turns,
                });
            }
            run.turns += 1;

            let model_request = self.model_request(&history);
            let response = self
                .guarded(
                    cancel,
                    run.deadline,
                    self.model_retry
                        .execute(|| self.provider.generate_text(&model_request)),
                )
                .await?;
            run.usage.merge(&response.usage);
            emitter.emit(AgentEventPayload::ModelResponded {
                turn: run.turns,
                tool_calls: response.tool_calls.len(),
                usage: response.usage,
            });
            tracing::debug!(
                thread_id = %run.thread_id,
                turn = run.turns,
                tool_calls = response.tool_calls.len(),
                text_len = response.text.len(),
                "model responded"
            );

            match classify(response) {
                Step::Final(text) => {
                    self.store
                        .append(&run.thread_id, Message::assistant(text.clone()))
                        .await?;
                    return Ok(text);
                }
                Step::Malformed(reason) => return Err(AgentryError::MalformedResponse(reason)),
                Step::CallTools { text, calls } => {
                    self.transition(run, LoopState::AwaitingTool, emitter);
                    let pending = run.invocations.len();
                    let batch = self
                        .call_tools(text, calls, run, &ctx, cancel, emitter)
                        .await?;
                    let first = self.store.append_batch(&run.thread_id, batch.clone()).await?;
                    for invocation in &mut run.invocations[pending..] {
                        invocation.message_index = first;
                    }
                    history.extend(batch);
                    self.transition(run, LoopState::AwaitingModel, emitter);
                }
            }
        }
    }

    /// Execute `calls` in order and return the assistant message followed by one
    /// result message per call, ready to be committed together. The recorded
    /// invocations get their `message_index` once the batch is stored.
    async fn call_tools(
        &self,
        text: String,
        calls: Vec<ToolCall>,
        run: &mut RunState,
        ctx: &ToolExecutionContext,
        cancel: &CancellationToken,
        emitter: &EventEmitter,
    ) -> Result<Vec<Message>> {
        if let Some(unknown) = calls.iter().find(|c| !self.registry.contains(&c.name)) {
            if run.unknown_tool_reprompts >= self.limits.max_unknown_tool_reprompts {
                return Err(AgentryError::UnknownTool(unknown.name.clone()));
            }
            run.unknown_tool_reprompts += 1;
            tracing::warn!(
                thread_id = %run.thread_id,
                tool = %unknown.name,
                attempt = run.unknown_tool_reprompts,
                "model requested an unknown tool; re-prompting"
            );
        }

        let mut batch = Vec::with_capacity(calls.len() + 1);
        batch.push(Message::assistant_tool_calls(text, calls.clone()));

        for call in calls {
            emitter.emit(AgentEventPayload::ToolStarted {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
            });
            run.invocations.push(ToolInvocation {
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
                message_index: 0,
            });

            let (result, is_error) = match self.dispatch(&call, ctx, run.deadline, cancel).await {
                Ok(value) => (value, false),
                Err(err @ (AgentryError::Canceled | AgentryError::Timeout(_))) => return Err(err),
                Err(AgentryError::UnknownTool(name)) => (
                    serde_json::json!({
                        "error": format!(
                            "Unknown tool '{name}'. Available tools: {}",
                            self.registry.names().join(", ")
                        )
                    }),
                    true,
                ),
                Err(err) => {
                    tracing::debug!(tool = %call.name, error = %err, "tool call failed");
                    (serde_json::json!({ "error": err.to_string() }), true)
                }
            };

            emitter.emit(AgentEventPayload::ToolFinished {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result: result.clone(),
                is_error,
            });
            batch.push(Message::tool_result(&call, result, is_error));
        }

        Ok(batch)
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let ctx = ToolExecutionContext {
            tool_call_id: Some(call.id.clone()),
            ..ctx.clone()
        };
        let policy = RetryPolicy::with_retries(self.limits.max_tool_retries)
            .with_initial_backoff(self.limits.tool_retry_backoff);
        self.guarded(
            cancel,
            deadline,
            policy.execute(|| self.registry.dispatch(&call.name, call.arguments.clone(), &ctx)),
        )
        .await
    }

    fn model_request(&self, history: &[Message]) -> ModelRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend_from_slice(history);
        ModelRequest {
            messages,
            tools: self.registry.definitions(),
            settings: self.settings.clone(),
        }
    }

    /// Await `fut` unless the run is canceled or its deadline passes first.
    async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout_ms = self
            .limits
            .timeout
            .map(|t| t.as_millis() as u64)
            .unwrap_or_default();
        let bounded = async {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| AgentryError::Timeout(timeout_ms))?,
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentryError::Canceled),
            result = bounded => result,
        }
    }

    fn transition(&self, run: &mut RunState, to: LoopState, emitter: &EventEmitter) {
        if run.state == to {
            return;
        }
        tracing::trace!(thread_id = %run.thread_id, from = %run.state, to = %to, "state transition");
        emitter.emit(AgentEventPayload::StateChanged {
            from: run.state,
            to,
        });
        run.state = to;
    }
}
