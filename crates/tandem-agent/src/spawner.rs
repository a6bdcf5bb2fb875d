//! Child agents: parallel `spawn_agents` and inline `spawn_agent_inline`.

use futures::future::join_all;
use serde_json::{Value, json};
use std::sync::Arc;
use tandem_llm::Message;
use tracing::{info, warn};

use crate::step_loop::RunContext;
use crate::tools::{SPAWN_AGENT_INLINE_TOOL, SPAWN_AGENTS_TOOL, deserialize_arguments};
use crate::{
    AgentError, AgentEvent, AgentRunRequest, AgentState, AgentTemplate, MessageHistory,
    PreviousFinished, RunStatus, SpawnAgentEntry, SpawnAgentsInput, ToolError, run_agent,
};

/// A spawn entry that passed every check and is ready to run.
struct ResolvedChild {
    template: Arc<AgentTemplate>,
    entry: SpawnAgentEntry,
}

fn resolve_child(ctx: &RunContext, entry: SpawnAgentEntry) -> Result<ResolvedChild, String> {
    if !ctx.template.can_spawn(&entry.agent_type) {
        return Err(format!(
            "Agent type {} is not in the spawnable agents list of {}",
            entry.agent_type, ctx.template.id
        ));
    }
    let template = ctx
        .deps
        .templates
        .get(&entry.agent_type)
        .ok_or_else(|| format!("Agent type {} not found", entry.agent_type))?;
    template
        .validate_input(entry.params.as_ref())
        .map_err(|error| format!("Invalid input for {}: {error}", entry.agent_type))?;
    let max_depth = ctx.deps.config.max_spawn_depth;
    if ctx.scope.depth + 1 > max_depth {
        return Err(format!(
            "Maximum spawn depth of {max_depth} reached, cannot spawn {}",
            entry.agent_type
        ));
    }
    Ok(ResolvedChild { template, entry })
}

fn child_request(
    ctx: &RunContext,
    child: &ResolvedChild,
    state: AgentState,
) -> AgentRunRequest {
    AgentRunRequest {
        agent_type: child.template.id.clone(),
        state,
        prompt: child.entry.prompt.clone(),
        params: child.entry.params.clone(),
        scope: ctx.scope.child(),
        parent_system_prompt: child
            .template
            .inherit_parent_system_prompt
            .then(|| ctx.system_prompt.clone()),
    }
}

/// Runs every entry concurrently and reports one result per entry, in input
/// order. Entries that fail validation never start but still get a result.
pub(crate) async fn spawn_agents(
    ctx: Arc<RunContext>,
    arguments: Value,
    previous: PreviousFinished,
) -> Result<Value, AgentError> {
    let input: SpawnAgentsInput = deserialize_arguments(SPAWN_AGENTS_TOOL, arguments)?;
    previous.wait().await;

    let parent_id = ctx.agent_id();
    let parent_view = ctx.state.with(|state| state.history.request_view());

    let runs = input.agents.into_iter().map(|entry| {
        let ctx = ctx.clone();
        let parent_id = parent_id.clone();
        let parent_view = parent_view.clone();
        async move {
            let agent_type = entry.agent_type.clone();
            let child = match resolve_child(&ctx, entry) {
                Ok(child) => child,
                Err(message) => {
                    warn!(parent_id = %parent_id, agent_type = %agent_type, error = %message, "spawn rejected");
                    return json!({ "agentType": agent_type, "errorMessage": message });
                }
            };

            let mut state = AgentState::child_of(&parent_id, &child.template.id);
            if child.template.include_message_history {
                state = state.with_history(MessageHistory::from_messages(parent_view));
            }
            let child_id = state.agent_id.clone();
            ctx.emit_lossy(AgentEvent::subagent_spawned(
                &parent_id,
                &child_id,
                &agent_type,
                false,
            ));

            let result = run_agent(ctx.deps.clone(), child_request(&ctx, &child, state)).await;
            match result {
                Ok(outcome) => {
                    let completed = outcome.status.is_completed();
                    ctx.state
                        .with(|state| state.credits_used += outcome.state.credits_used);
                    ctx.emit_lossy(AgentEvent::subagent_finished(&parent_id, &child_id, completed));
                    match outcome.status {
                        RunStatus::Completed => json!({
                            "agentType": agent_type,
                            "agentId": child_id,
                            "value": outcome.output,
                        }),
                        RunStatus::Errored { message, .. } => json!({
                            "agentType": agent_type,
                            "agentId": child_id,
                            "errorMessage": message,
                        }),
                    }
                }
                Err(error) => {
                    ctx.emit_lossy(AgentEvent::subagent_finished(&parent_id, &child_id, false));
                    json!({
                        "agentType": agent_type,
                        "agentId": child_id,
                        "errorMessage": error.to_string(),
                    })
                }
            }
        }
    });

    let results = join_all(runs).await;
    if ctx.scope.is_cancelled() {
        return Err(AgentError::Cancelled);
    }
    info!(parent_id = %parent_id, children = results.len(), "spawned agents finished");
    Ok(Value::Array(results))
}

/// Runs one child on the parent's conversation. On success the child's
/// history replaces the parent's; on failure the parent is left untouched.
pub(crate) async fn spawn_agent_inline(
    ctx: Arc<RunContext>,
    arguments: Value,
    previous: PreviousFinished,
) -> Result<Value, AgentError> {
    let entry: SpawnAgentEntry = deserialize_arguments(SPAWN_AGENT_INLINE_TOOL, arguments)?;
    let agent_type = entry.agent_type.clone();
    let child = resolve_child(&ctx, entry).map_err(ToolError::Execution)?;
    previous.wait().await;

    let parent_id = ctx.agent_id();
    let parent_view: Vec<Message> = ctx.state.with(|state| state.history.request_view());
    let state = AgentState::child_of(&parent_id, &child.template.id)
        .with_history(MessageHistory::from_messages(parent_view));
    let child_id = state.agent_id.clone();
    ctx.emit_lossy(AgentEvent::subagent_spawned(
        &parent_id,
        &child_id,
        &agent_type,
        true,
    ));

    let mut request = child_request(&ctx, &child, state);
    request.parent_system_prompt = Some(ctx.system_prompt.clone());
    let outcome = match run_agent(ctx.deps.clone(), request).await {
        Ok(outcome) => outcome,
        Err(error) => {
            ctx.emit_lossy(AgentEvent::subagent_finished(&parent_id, &child_id, false));
            return Err(ToolError::Execution(error.to_string()).into());
        }
    };
    ctx.emit_lossy(AgentEvent::subagent_finished(
        &parent_id,
        &child_id,
        outcome.status.is_completed(),
    ));

    match outcome.status {
        RunStatus::Completed => {
            let merged = outcome.state.history.into_messages();
            ctx.state.with(|state| {
                state.history.replace_all(merged);
                state.credits_used += outcome.state.credits_used;
            });
            info!(parent_id = %parent_id, child_id = %child_id, "inline agent merged");
            Ok(json!({
                "agentType": agent_type,
                "agentId": child_id,
                "value": outcome.output,
            }))
        }
        RunStatus::Errored { .. } if ctx.scope.is_cancelled() => Err(AgentError::Cancelled),
        RunStatus::Errored { message, .. } => {
            ctx.state
                .with(|state| state.credits_used += outcome.state.credits_used);
            Err(ToolError::Execution(format!(
                "Inline agent {agent_type} failed: {message}"
            ))
            .into())
        }
    }
}
