//! The step loop: stream a model response, sequence the tool calls it emits,
//! and decide whether to continue.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tandem_llm::{ContentPart, FinishReason, Message, Request, Role, StreamEvent, ToolCall};
use tandem_store::HistoryKey;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::tools::{
    AddMessageInput, SetMessagesInput, SubgoalInput, ToolName, ToolResult, deserialize_arguments,
    parse_tool_arguments, validate_tool_arguments, validate_tool_output,
};
use crate::{
    AgentError, AgentEvent, AgentTemplate, CreditCharge, MessageHistory, OutputMode,
    PreviousFinished, RunDeps,
    RunScope, SequencedBatch, SharedAgentState, StepDirective, StepInput, StepProgram,
    ToolCallSequencer, ToolError, spawner, truncate_tool_value,
};

mod types;
pub use types::{AgentRunOutcome, AgentRunRequest, ErrorKind, RunPhase, RunStatus};

/// Runs one agent from its state to a terminal outcome.
///
/// Template and input errors are returned before anything is mutated. Provider
/// failures and cancellation produce an `Errored` outcome that still carries
/// the last consistent state.
pub fn run_agent(
    deps: Arc<RunDeps>,
    request: AgentRunRequest,
) -> BoxFuture<'static, Result<AgentRunOutcome, AgentError>> {
    async move { StepLoop::start(deps, request)?.run().await }.boxed()
}

/// Everything a tool handler of this run may touch.
pub(crate) struct RunContext {
    pub(crate) deps: Arc<RunDeps>,
    pub(crate) template: Arc<AgentTemplate>,
    pub(crate) tools: Vec<ToolName>,
    pub(crate) state: SharedAgentState,
    pub(crate) scope: RunScope,
    pub(crate) system_prompt: String,
}

impl RunContext {
    pub(crate) fn agent_id(&self) -> String {
        self.state.agent_id()
    }

    /// Emits without failing the caller. Used where no error can be returned.
    pub(crate) fn emit_lossy(&self, event: AgentEvent) {
        if let Err(error) = self.deps.events.emit(event) {
            warn!(error = %error, "failed to emit agent event");
        }
    }

    async fn execute_tool(
        self: Arc<Self>,
        call: ToolCall,
        previous: PreviousFinished,
    ) -> Result<Value, AgentError> {
        self.emit_lossy(AgentEvent::tool_call_start(
            self.agent_id(),
            &call.name,
            &call.id,
            call.arguments.clone(),
        ));
        let spec = self.deps.tools.lookup(&call.name)?;
        if !self.tools.contains(&spec.name) {
            return Err(ToolError::Validation(format!(
                "tool '{}' is not available to agent '{}'",
                call.name, self.template.id
            ))
            .into());
        }
        let arguments = parse_tool_arguments(&call)?;
        validate_tool_arguments(&spec.definition.parameters, &arguments)?;

        match spec.name {
            ToolName::AddSubgoal => {
                let input: SubgoalInput = deserialize_arguments(&call.name, arguments)?;
                previous.wait().await;
                let message = self.state.with(|state| state.context.add_subgoal(input));
                Ok(json!({ "message": message }))
            }
            ToolName::UpdateSubgoal => {
                let input: SubgoalInput = deserialize_arguments(&call.name, arguments)?;
                previous.wait().await;
                let message = self.state.with(|state| state.context.update_subgoal(input));
                Ok(json!({ "message": message }))
            }
            ToolName::SetMessages => {
                let input: SetMessagesInput = deserialize_arguments(&call.name, arguments)?;
                let rewritten = MessageHistory::from_messages(input.messages);
                if !rewritten.is_consistent() {
                    return Err(ToolError::Validation(
                        "messages must answer every tool call with exactly one tool result"
                            .to_string(),
                    )
                    .into());
                }
                previous.wait().await;
                let count = rewritten.len();
                self.state
                    .with(|state| state.history.replace_all(rewritten.into_messages()));
                Ok(json!({ "message": format!("History replaced with {count} messages") }))
            }
            ToolName::AddMessage => {
                let input: AddMessageInput = deserialize_arguments(&call.name, arguments)?;
                previous.wait().await;
                self.state
                    .with(|state| state.history.push(input.into_message()));
                Ok(json!({ "message": "Message added" }))
            }
            ToolName::SetOutput => {
                self.template.validate_output(&arguments)?;
                previous.wait().await;
                self.state.with(|state| state.output = Some(arguments));
                Ok(json!({ "message": "Output set" }))
            }
            ToolName::EndTurn => Ok(json!({ "message": "Turn ended" })),
            ToolName::SpawnAgents => spawner::spawn_agents(self.clone(), arguments, previous).await,
            ToolName::SpawnAgentInline => {
                spawner::spawn_agent_inline(self.clone(), arguments, previous).await
            }
            ToolName::RunTerminalCommand
            | ToolName::BrowserLogs
            | ToolName::CodeSearch
            | ToolName::ReadFiles => {
                let output = self
                    .deps
                    .bridge
                    .request_tool_call(
                        &self.scope,
                        &call,
                        arguments,
                        self.deps.config.client_tool_timeout_ms,
                    )
                    .await?;
                if let Some(schema) = &spec.output_schema {
                    validate_tool_output(&call.name, schema, &output)?;
                }
                Ok(truncate_tool_value(output, &call.name, &self.deps.config))
            }
        }
    }

    fn record(&self, call: &ToolCall, result: &ToolResult) {
        self.state
            .with(|state| state.history.record_tool_result(call, result));
        self.emit_lossy(AgentEvent::tool_call_end(
            self.agent_id(),
            &call.id,
            result.output.clone(),
            result.is_error,
        ));
    }
}

struct StepOutcome {
    ended_turn: bool,
}

pub struct StepLoop {
    ctx: Arc<RunContext>,
    program: Option<Box<dyn StepProgram>>,
    phase: RunPhase,
    phases: Vec<RunPhase>,
    steps_this_run: usize,
    run_start: usize,
}

impl StepLoop {
    /// Resolves the template, validates input, registers the agent and seeds
    /// its history. Fails without side effects when the template or input is
    /// invalid.
    pub fn start(deps: Arc<RunDeps>, request: AgentRunRequest) -> Result<Self, AgentError> {
        let template = deps.templates.resolve(&request.agent_type)?;
        template
            .validate_input(request.params.as_ref())
            .map_err(|error| AgentError::InvalidInput(error.to_string()))?;
        let tools = deps.tools.resolve(&template.tool_names)?;

        let mut state = request.state;
        state.agent_type = template.id.clone();
        let run_start = state.history.len();

        if let Some(prompt) = &request.prompt {
            let text = match &request.params {
                Some(params) => format!("{prompt}\n\n{params}"),
                None => prompt.clone(),
            };
            state.history.push(Message::user(text));
            if let Some(instructions) = &template.instructions_prompt {
                state.history.push(Message::user(instructions.clone()));
            }
        } else if let Some(params) = &request.params {
            state.history.push(Message::user(params.to_string()));
        }

        let system_prompt = request
            .parent_system_prompt
            .unwrap_or_else(|| template.system_prompt.clone());
        let program = template.handle_steps.as_ref().map(|factory| factory.create());

        Ok(Self {
            ctx: Arc::new(RunContext {
                deps,
                template,
                tools,
                state: SharedAgentState::new(state),
                scope: request.scope,
                system_prompt,
            }),
            program,
            phase: RunPhase::Streaming,
            phases: vec![RunPhase::Streaming],
            steps_this_run: 0,
            run_start,
        })
    }

    pub async fn run(mut self) -> Result<AgentRunOutcome, AgentError> {
        let deps = self.ctx.deps.clone();
        let snapshot = self.ctx.state.snapshot();
        let _lease = deps.arena.register(&snapshot);
        let agent_id = snapshot.agent_id.clone();
        info!(
            agent_id = %agent_id,
            agent_type = %snapshot.agent_type,
            depth = self.ctx.scope.depth,
            "agent run started"
        );
        self.ctx
            .emit_lossy(AgentEvent::agent_start(&agent_id, &snapshot.agent_type));

        let result = match self.program.take() {
            Some(program) => self.drive_program(program).await,
            None => self.run_until_turn_end().await.map(|_| ()),
        };

        let status = match result {
            Ok(()) => {
                self.transition(RunPhase::Completed)?;
                RunStatus::Completed
            }
            Err(error) => {
                self.transition(RunPhase::Errored)?;
                let kind = match &error {
                    AgentError::Llm(_) => ErrorKind::Provider,
                    AgentError::Cancelled => ErrorKind::Cancelled,
                    _ => ErrorKind::Fatal,
                };
                warn!(agent_id = %agent_id, error = %error, "agent run errored");
                self.ctx
                    .emit_lossy(AgentEvent::error(&agent_id, error.to_string()));
                self.resolve_dangling_calls(&error.to_string());
                RunStatus::Errored {
                    kind,
                    message: error.to_string(),
                }
            }
        };

        let state = self.ctx.state.snapshot();
        let output = self.output_value(&state, &status);
        self.persist(&state).await;
        if self.ctx.scope.depth == 0 {
            deps.sessions
                .finish_user_input(&self.ctx.scope.session_id, &self.ctx.scope.user_input_id);
        }

        info!(
            agent_id = %agent_id,
            steps = self.steps_this_run,
            credits = state.credits_used,
            completed = status.is_completed(),
            "agent run finished"
        );
        self.ctx.emit_lossy(AgentEvent::agent_end(
            &agent_id,
            if status.is_completed() { "completed" } else { "errored" },
            self.steps_this_run,
        ));

        Ok(AgentRunOutcome {
            state,
            status,
            output,
            phases: self.phases,
        })
    }

    fn transition(&mut self, next: RunPhase) -> Result<(), AgentError> {
        if !self.phase.can_transition_to(&next) {
            return Err(AgentError::Fatal(format!(
                "invalid run phase transition {} -> {}",
                self.phase.as_str(),
                next.as_str()
            )));
        }
        if self.phase != next {
            self.phases.push(next);
        }
        self.phase = next;
        Ok(())
    }

    /// Runs model steps until the turn ends or the step budget is spent.
    async fn run_until_turn_end(&mut self) -> Result<bool, AgentError> {
        loop {
            if self.steps_this_run >= self.ctx.deps.config.max_agent_steps {
                let agent_id = self.ctx.agent_id();
                warn!(agent_id = %agent_id, max = self.ctx.deps.config.max_agent_steps, "step limit reached");
                self.ctx.emit_lossy(AgentEvent::step_limit(
                    agent_id,
                    self.ctx.deps.config.max_agent_steps,
                ));
                return Ok(false);
            }
            if self.step().await?.ended_turn {
                return Ok(true);
            }
        }
    }

    async fn step(&mut self) -> Result<StepOutcome, AgentError> {
        if self.ctx.scope.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        self.transition(RunPhase::Streaming)?;

        let request = self.build_request();
        let agent_id = self.ctx.agent_id();
        let events = self.ctx.deps.events.clone();
        let forward_agent_id = agent_id.clone();
        let forward = move |event: &StreamEvent| {
            let event = match event {
                StreamEvent::TextDelta { delta } => AgentEvent::text_delta(&forward_agent_id, delta),
                StreamEvent::ReasoningDelta { delta } => {
                    AgentEvent::reasoning_delta(&forward_agent_id, delta)
                }
                _ => return,
            };
            if let Err(error) = events.emit(event) {
                warn!(error = %error, "failed to emit stream event");
            }
        };

        let response = tokio::select! {
            biased;
            _ = self.ctx.scope.cancel.cancelled() => return Err(AgentError::Cancelled),
            response = self.ctx.deps.client.stream_with_retry(request, forward) => response?,
        };

        let charge = CreditCharge {
            agent_id: agent_id.clone(),
            agent_type: self.ctx.template.id.clone(),
            model: response.model.clone(),
            usage: response.usage.clone(),
        };
        let charged = self.ctx.deps.credits.consume(charge).await?;
        self.steps_this_run += 1;

        let (message, duplicates) = dedupe_tool_call_ids(response.message);
        let calls = message.tool_calls();
        self.ctx.state.with(|state| {
            state.credits_used += charged;
            state.steps_taken += 1;
            state.history.push(message);
        });
        debug!(
            agent_id = %agent_id,
            tool_calls = calls.len(),
            finish_reason = ?response.finish_reason,
            "model step finished"
        );

        let stopped = response.finish_reason == FinishReason::StopSequence;
        if calls.is_empty() {
            return Ok(StepOutcome { ended_turn: true });
        }

        let batch = self.dispatch(calls, duplicates).await?;
        Ok(StepOutcome {
            ended_turn: batch.ends_agent_step || stopped,
        })
    }

    fn build_request(&self) -> Request {
        let template = &self.ctx.template;
        let mut messages = vec![Message::system(self.ctx.system_prompt.clone())];
        messages.extend(self.ctx.state.with(|state| state.history.request_view()));
        if let Some(step_prompt) = &template.step_prompt {
            messages.push(Message::user(step_prompt.clone()));
        }

        let snapshot_id = self.ctx.agent_id();
        Request {
            model: template.model.clone(),
            messages,
            provider: None,
            tools: Some(self.ctx.deps.tools.definitions_for(&self.ctx.tools)),
            stop_sequences: Some(vec![self.ctx.deps.config.stop_sequence.clone()]),
            metadata: Some(HashMap::from([
                ("agent_id".to_string(), snapshot_id),
                ("agent_type".to_string(), template.id.clone()),
                (
                    "user_input_id".to_string(),
                    self.ctx.scope.user_input_id.clone(),
                ),
            ])),
        }
    }

    /// Sequences a batch of calls already present in the history.
    async fn dispatch(
        &mut self,
        calls: Vec<ToolCall>,
        invalid: HashMap<String, String>,
    ) -> Result<SequencedBatch, AgentError> {
        self.transition(RunPhase::DispatchingTools)?;
        let names: Vec<Option<ToolName>> =
            calls.iter().map(|call| ToolName::parse(&call.name)).collect();
        if names.iter().flatten().any(|name| {
            matches!(name, ToolName::SpawnAgents | ToolName::SpawnAgentInline)
        }) {
            self.transition(RunPhase::Spawning)?;
        }
        if names.iter().flatten().any(ToolName::is_client_tool) {
            self.transition(RunPhase::AwaitingClient)?;
        }

        let ctx = self.ctx.clone();
        let invalid = &invalid;
        let batch = ToolCallSequencer::new(&self.ctx.deps.tools)
            .run(
                calls,
                |call, previous| {
                    let ctx = ctx.clone();
                    let rejection = invalid.get(&call.id).cloned();
                    async move {
                        if let Some(message) = rejection {
                            return Err(AgentError::Tool(ToolError::Validation(message)));
                        }
                        ctx.execute_tool(call, previous).await
                    }
                },
                |call, result| {
                    ctx.record(call, result);
                    Ok(())
                },
            )
            .await;

        let batch = batch?;
        self.transition(RunPhase::Continuing)?;
        Ok(batch)
    }

    async fn drive_program(&mut self, mut program: Box<dyn StepProgram>) -> Result<(), AgentError> {
        let max_directives = self.ctx.deps.config.max_program_directives;
        let mut input = StepInput::default();

        for _ in 0..max_directives {
            if self.ctx.scope.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            match program.resume(input.clone()) {
                StepDirective::Done => return Ok(()),
                StepDirective::Step => {
                    let outcome = self.step().await?;
                    input = StepInput {
                        step_index: self.steps_this_run,
                        tool_result: None,
                        ended_turn: outcome.ended_turn,
                    };
                }
                StepDirective::StepAll => {
                    let ended_turn = self.run_until_turn_end().await?;
                    input = StepInput {
                        step_index: self.steps_this_run,
                        tool_result: None,
                        ended_turn,
                    };
                }
                StepDirective::ToolCall { tool_name, input: arguments } => {
                    let ends_run = tool_name == ToolName::EndTurn.as_str();
                    let result = self.run_programmatic_tool(tool_name, arguments).await?;
                    if ends_run {
                        return Ok(());
                    }
                    input = StepInput {
                        step_index: self.steps_this_run,
                        tool_result: Some(result.output),
                        ended_turn: false,
                    };
                }
            }
        }

        Err(AgentError::Fatal(format!(
            "step program did not finish within {max_directives} directives"
        )))
    }

    /// Executes one tool on the program's behalf, recording the call and its
    /// result like a model-emitted one.
    async fn run_programmatic_tool(
        &mut self,
        tool_name: String,
        arguments: Value,
    ) -> Result<ToolResult, AgentError> {
        let call = ToolCall::new(format!("program-{}", Uuid::new_v4()), tool_name, arguments);
        self.ctx.state.with(|state| {
            state.history.push(Message::with_parts(
                Role::Assistant,
                vec![ContentPart::tool_call(call.clone())],
            ))
        });
        let mut batch = self.dispatch(vec![call], HashMap::new()).await?;
        batch
            .results
            .pop()
            .ok_or_else(|| AgentError::Fatal("programmatic tool call produced no result".to_string()))
    }

    /// Answers calls left without a result so the history stays consistent.
    fn resolve_dangling_calls(&self, reason: &str) {
        self.ctx.state.with(|state| {
            for call in state.history.unresolved_tool_calls() {
                let result = ToolResult::error(&call, reason);
                state.history.record_tool_result(&call, &result);
            }
        });
    }

    fn output_value(&self, state: &crate::AgentState, status: &RunStatus) -> Value {
        if let RunStatus::Errored { message, .. } = status {
            return json!({ "type": "error", "message": message });
        }
        let mode = self.ctx.template.output_mode;
        let produced = state.history.since(self.run_start);
        let value = match mode {
            OutputMode::LastMessage => produced
                .iter()
                .rev()
                .filter(|message| message.role == Role::Assistant)
                .map(Message::text)
                .find(|text| !text.is_empty())
                .map(Value::String)
                .unwrap_or(Value::Null),
            OutputMode::AllMessages => {
                let messages: Vec<&Message> = produced
                    .iter()
                    .filter(|message| matches!(message.role, Role::Assistant | Role::Tool))
                    .collect();
                serde_json::to_value(messages).unwrap_or(Value::Null)
            }
            OutputMode::StructuredOutput => state.output.clone().unwrap_or(Value::Null),
        };
        json!({ "type": mode.as_str(), "value": value })
    }

    async fn persist(&self, state: &crate::AgentState) {
        if self.ctx.scope.depth != 0 {
            return;
        }
        let Some(store) = &self.ctx.deps.history_store else {
            return;
        };
        let key = HistoryKey::new(&self.ctx.scope.session_id, &state.agent_id);
        match store.save_history(&key, state.history.messages()).await {
            Ok(stored) => {
                debug!(agent_id = %state.agent_id, revision = stored.revision, "history saved")
            }
            Err(error) => warn!(agent_id = %state.agent_id, error = %error, "failed to save history"),
        }
    }
}

/// Renames repeated tool-call ids in one assistant message. The renamed calls
/// are answered with a validation error instead of being executed.
fn dedupe_tool_call_ids(mut message: Message) -> (Message, HashMap<String, String>) {
    let mut seen = HashSet::new();
    let mut duplicates = HashMap::new();
    for part in &mut message.content {
        let ContentPart::ToolCall(call) = part else {
            continue;
        };
        if seen.insert(call.id.clone()) {
            continue;
        }
        let original = call.id.clone();
        let mut suffix = 1;
        let mut renamed = format!("{original}-dup{suffix}");
        while seen.contains(&renamed) {
            suffix += 1;
            renamed = format!("{original}-dup{suffix}");
        }
        seen.insert(renamed.clone());
        call.id = renamed.clone();
        duplicates.insert(
            renamed,
            format!("duplicate tool call id '{original}' in one assistant message"),
        );
    }
    (message, duplicates)
}
