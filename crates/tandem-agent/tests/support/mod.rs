#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tandem_agent::{
    AgentTemplate, BufferedEventEmitter, RunConfig, RunDeps, TemplateRegistry,
};
use tandem_llm::{
    Client, FinishReason, LlmError, Message, Request, RetryPolicy, Role, StreamEvent,
    StreamEventStream, StreamProvider, ToolCall, Usage,
};

pub type Script = Vec<Result<StreamEvent, LlmError>>;

/// Plays queued event scripts, one per model step, keyed by the requesting
/// agent type so concurrent children never steal each other's turns.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Script>>>>,
    pub requests: Arc<Mutex<Vec<Request>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, agent_type: &str, script: Script) -> &Self {
        self.scripts
            .lock()
            .expect("scripts mutex")
            .entry(agent_type.to_string())
            .or_default()
            .push_back(script);
        self
    }

    /// Every stream for `agent_type` waits this long before its first event.
    pub fn delay(&self, agent_type: &str, delay: Duration) -> &Self {
        self.delays
            .lock()
            .expect("delays mutex")
            .insert(agent_type.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().expect("requests mutex").clone()
    }

    pub fn requests_for(&self, agent_type: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|request| agent_type_of(request) == agent_type)
            .collect()
    }

    pub fn remaining(&self, agent_type: &str) -> usize {
        self.scripts
            .lock()
            .expect("scripts mutex")
            .get(agent_type)
            .map_or(0, VecDeque::len)
    }
}

fn agent_type_of(request: &Request) -> String {
    request
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.get("agent_type").cloned())
        .unwrap_or_default()
}

#[async_trait]
impl StreamProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: Request) -> Result<StreamEventStream, LlmError> {
        let agent_type = agent_type_of(&request);
        self.requests.lock().expect("requests mutex").push(request);
        let script = self
            .scripts
            .lock()
            .expect("scripts mutex")
            .get_mut(&agent_type)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| LlmError::Configuration(format!("no script queued for {agent_type}")))?;
        let delay = self
            .delays
            .lock()
            .expect("delays mutex")
            .get(&agent_type)
            .copied();

        let events = futures::stream::iter(script);
        match delay {
            Some(delay) => Ok(Box::pin(
                futures::stream::once(tokio::time::sleep(delay))
                    .filter_map(|_| async { None::<Result<StreamEvent, LlmError>> })
                    .chain(events),
            )),
            None => Ok(Box::pin(events)),
        }
    }
}

fn finish(reason: FinishReason) -> Result<StreamEvent, LlmError> {
    Ok(StreamEvent::Finish {
        reason,
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        },
    })
}

pub fn text_script(text: &str) -> Script {
    vec![
        Ok(StreamEvent::TextDelta {
            delta: text.to_string(),
        }),
        finish(FinishReason::Stop),
    ]
}

pub fn tool_script(calls: Vec<(&str, &str, Value)>) -> Script {
    let mut script: Script = calls
        .into_iter()
        .map(|(id, name, arguments)| {
            Ok(StreamEvent::ToolCallEnd {
                tool_call: ToolCall::new(id, name, arguments),
            })
        })
        .collect();
    script.push(finish(FinishReason::ToolCalls));
    script
}

pub fn failing_script(message: &str) -> Script {
    vec![Err(LlmError::Stream(message.to_string()))]
}

pub fn template(id: &str, tools: &[&str]) -> AgentTemplate {
    let mut template = AgentTemplate::new(id, "test-model");
    template.system_prompt = format!("You are {id}.");
    template.tool_names = tools.iter().map(|tool| tool.to_string()).collect();
    template
}

pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay_ms: 1,
        max_delay_ms: 2,
    }
}

pub struct Harness {
    pub provider: ScriptedProvider,
    pub events: Arc<BufferedEventEmitter>,
    pub deps: Arc<RunDeps>,
}

pub fn harness(templates: Vec<AgentTemplate>, provider: ScriptedProvider) -> Harness {
    harness_with(templates, provider, RunConfig::default(), fast_retry(0))
}

pub fn harness_with(
    templates: Vec<AgentTemplate>,
    provider: ScriptedProvider,
    config: RunConfig,
    retry: RetryPolicy,
) -> Harness {
    let mut client = Client::new(retry);
    client.register_provider(Arc::new(provider.clone()));

    let mut registry = TemplateRegistry::new();
    for template in templates {
        registry.register(template);
    }

    let events = Arc::new(BufferedEventEmitter::default());
    let deps = RunDeps::new(client, registry)
        .with_config(config)
        .with_events(events.clone());

    Harness {
        provider,
        events,
        deps: Arc::new(deps),
    }
}

/// Output recorded for `tool_call_id`, or null when there is none.
pub fn tool_output(messages: &[Message], tool_call_id: &str) -> Value {
    messages
        .iter()
        .find(|message| {
            message.role == Role::Tool && message.tool_call_id.as_deref() == Some(tool_call_id)
        })
        .and_then(Message::tool_output)
        .and_then(|outputs| outputs.first())
        .map(|output| output.value().clone())
        .unwrap_or(Value::Null)
}

/// Ids of the tool-role messages, in history order.
pub fn tool_result_ids(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .filter_map(|message| message.tool_call_id.clone())
        .collect()
}
