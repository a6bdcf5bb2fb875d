//! Canonical conversation state of one agent.
//!
//! Every assistant tool-call part must be answered by exactly one tool-role
//! message with the same `tool_call_id` before the next model request. The
//! history itself never drops results; [`MessageHistory::request_view`] hides
//! calls that are still in flight.

use std::collections::HashSet;

use tandem_llm::{ContentPart, Message, Role, ToolCall};

use crate::tools::ToolResult;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageHistory {
    messages: Vec<Message>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Messages from `offset` on, clamped to the current length.
    pub fn since(&self, offset: usize) -> &[Message] {
        &self.messages[offset.min(self.messages.len())..]
    }

    /// Replaces the whole history. Used by `set_messages` and inline merges.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn unresolved_tool_calls(&self) -> Vec<ToolCall> {
        let resolved = self.resolved_ids();
        self.messages
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .flat_map(Message::tool_calls)
            .filter(|call| !resolved.contains(call.id.as_str()))
            .collect()
    }

    /// No unanswered calls, and no tool result without a preceding call.
    pub fn is_consistent(&self) -> bool {
        let mut emitted: HashSet<&str> = HashSet::new();
        let mut answered: HashSet<&str> = HashSet::new();
        for message in &self.messages {
            match message.role {
                Role::Assistant => {
                    for part in &message.content {
                        if let ContentPart::ToolCall(call) = part {
                            emitted.insert(call.id.as_str());
                        }
                    }
                }
                Role::Tool => {
                    let Some(id) = message.tool_call_id.as_deref() else {
                        return false;
                    };
                    if !emitted.contains(id) || !answered.insert(id) {
                        return false;
                    }
                }
                Role::System | Role::User => {}
            }
        }
        emitted.len() == answered.len()
    }

    /// Records a tool result. When the call is no longer pending in this
    /// history (it was rewritten by `set_messages` or an inline merge), the
    /// call is re-emitted first so the pair stays intact.
    pub fn record_tool_result(&mut self, call: &ToolCall, result: &ToolResult) {
        let pending = self
            .unresolved_tool_calls()
            .iter()
            .any(|unresolved| unresolved.id == call.id);
        if !pending {
            self.messages.push(Message::with_parts(
                Role::Assistant,
                vec![ContentPart::tool_call(call.clone())],
            ));
        }
        self.messages.push(result.to_message());
    }

    /// Removes tool-call parts that have no result yet. Assistant messages
    /// left without content are dropped.
    pub fn strip_trailing_unresolved(&mut self) {
        let resolved = self.resolved_ids_owned();
        for message in &mut self.messages {
            if message.role != Role::Assistant {
                continue;
            }
            message.content.retain(|part| match part {
                ContentPart::ToolCall(call) => resolved.contains(&call.id),
                _ => true,
            });
        }
        self.messages
            .retain(|message| message.role != Role::Assistant || !message.content.is_empty());
    }

    /// What the next model request sees: the history without in-flight calls.
    pub fn request_view(&self) -> Vec<Message> {
        let mut view = self.clone();
        view.strip_trailing_unresolved();
        view.messages
    }

    /// Keeps roughly the last `n` messages without splitting a tool call from
    /// its result.
    pub fn prune_to_last(&mut self, n: usize) {
        if self.messages.len() <= n {
            return;
        }
        let mut start = self.messages.len() - n;
        while start > 0 && self.messages[start].role == Role::Tool {
            start -= 1;
        }
        self.messages.drain(..start);
    }

    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|message| message.role == Role::Assistant)
            .map(Message::text)
            .find(|text| !text.is_empty())
    }

    fn resolved_ids(&self) -> HashSet<&str> {
        self.messages
            .iter()
            .filter(|message| message.role == Role::Tool)
            .filter_map(|message| message.tool_call_id.as_deref())
            .collect()
    }

    fn resolved_ids_owned(&self) -> HashSet<String> {
        self.resolved_ids().into_iter().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall::new(id, name, json!({}))
    }

    fn assistant_calls(calls: &[ToolCall]) -> Message {
        Message::with_parts(
            Role::Assistant,
            calls.iter().cloned().map(ContentPart::tool_call).collect(),
        )
    }

    #[test]
    fn results_resolve_calls_in_place() {
        let mut history = MessageHistory::new();
        history.push(Message::user("go"));
        let first = call("c1", "read_files");
        let second = call("c2", "code_search");
        history.push(assistant_calls(&[first.clone(), second.clone()]));
        assert_eq!(history.unresolved_tool_calls().len(), 2);
        assert!(!history.is_consistent());

        history.record_tool_result(&first, &ToolResult::success(&first, json!({"ok": 1})));
        history.record_tool_result(&second, &ToolResult::success(&second, json!({"ok": 2})));

        assert!(history.unresolved_tool_calls().is_empty());
        assert!(history.is_consistent());
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn result_for_rewritten_call_reemits_the_call() {
        let mut history = MessageHistory::new();
        let set = call("c1", "set_messages");
        history.push(assistant_calls(&[set.clone()]));
        history.replace_all(vec![Message::user("fresh start")]);

        history.record_tool_result(&set, &ToolResult::success(&set, json!({})));

        assert_eq!(history.len(), 3);
        assert_eq!(history.messages()[1].tool_calls(), vec![set]);
        assert!(history.is_consistent());
    }

    #[test]
    fn request_view_hides_in_flight_calls() {
        let mut history = MessageHistory::new();
        let done = call("c1", "read_files");
        let pending = call("c2", "spawn_agent_inline");
        let mut message = assistant_calls(&[done.clone(), pending]);
        message.content.insert(0, ContentPart::text("working"));
        history.push(message);
        history.record_tool_result(&done, &ToolResult::success(&done, json!({})));

        let view = MessageHistory::from_messages(history.request_view());
        assert!(view.is_consistent());
        assert_eq!(view.messages()[0].text(), "working");
        assert_eq!(view.messages()[0].tool_calls(), vec![done]);
        assert_eq!(history.unresolved_tool_calls().len(), 1);
    }

    #[test]
    fn strip_drops_assistant_messages_left_empty() {
        let mut history = MessageHistory::new();
        history.push(Message::user("hi"));
        history.push(assistant_calls(&[call("c1", "spawn_agent_inline")]));
        history.strip_trailing_unresolved();
        assert_eq!(history.messages(), &[Message::user("hi")]);
    }

    #[test]
    fn prune_keeps_tool_pairs_together() {
        let mut history = MessageHistory::new();
        history.push(Message::user("one"));
        history.push(Message::assistant("two"));
        let read = call("c1", "read_files");
        history.push(assistant_calls(&[read.clone()]));
        history.record_tool_result(&read, &ToolResult::success(&read, json!({})));

        history.prune_to_last(1);

        assert_eq!(history.len(), 2);
        assert!(history.is_consistent());
        assert_eq!(history.messages()[0].tool_calls(), vec![read]);
    }

    #[test]
    fn orphan_tool_result_is_inconsistent() {
        let orphan = call("c9", "read_files");
        let history = MessageHistory::from_messages(vec![
            ToolResult::success(&orphan, json!({})).to_message(),
        ]);
        assert!(!history.is_consistent());
    }

    #[test]
    fn last_assistant_text_skips_tool_only_messages() {
        let history = MessageHistory::from_messages(vec![
            Message::assistant("answer"),
            assistant_calls(&[call("c1", "end_turn")]),
        ]);
        assert_eq!(history.last_assistant_text().as_deref(), Some("answer"));
    }
}
