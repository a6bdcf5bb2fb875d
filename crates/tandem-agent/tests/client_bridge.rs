mod support;

use serde_json::json;
use std::sync::Arc;
use support::*;
use tandem_agent::{
    AgentRunRequest, ClientMessage, ConnectionHandler, ErrorKind, RunStatus, ServerAction,
    ServerMessage, run_agent,
};
use tokio::sync::mpsc;

fn coder_harness(provider: ScriptedProvider) -> Harness {
    harness(
        vec![template("coder", &["run_terminal_command", "end_turn"])],
        provider,
    )
}

async fn next_tool_request(outbound: &mut mpsc::Receiver<ServerMessage>) -> (String, String) {
    match outbound.recv().await.expect("request should be sent") {
        ServerMessage::Action {
            data:
                ServerAction::ToolCallRequest {
                    tool_call_id,
                    tool_name,
                    ..
                },
        } => (tool_call_id, tool_name),
        other => panic!("unexpected message: {other:?}"),
    }
}

fn identified_handler(h: &Harness) -> ConnectionHandler {
    let handler = ConnectionHandler::new("s1", h.deps.sessions.clone(), h.deps.bridge.clone());
    let acks = handler.handle_message(ClientMessage::Identify {
        txid: 1,
        client_session_id: "client-1".to_string(),
    });
    assert_eq!(acks, vec![ServerMessage::ack(1)]);
    handler
}

#[tokio::test(flavor = "current_thread")]
async fn disconnect_during_terminal_command_is_a_tool_error() {
    let provider = ScriptedProvider::new();
    provider.push(
        "coder",
        tool_script(vec![(
            "t1",
            "run_terminal_command",
            json!({"command": "cargo test"}),
        )]),
    );
    provider.push("coder", text_script("the client went away"));
    let h = coder_harness(provider);
    let mut outbound = h.deps.sessions.attach("s1");
    let scope = h.deps.sessions.start_run("s1", "u1");

    let run = tokio::spawn(run_agent(
        h.deps.clone(),
        AgentRunRequest::root("coder", "run the tests", scope),
    ));

    let (tool_call_id, tool_name) = next_tool_request(&mut outbound).await;
    assert_eq!(tool_call_id, "t1");
    assert_eq!(tool_name, "run_terminal_command");
    assert_eq!(h.deps.bridge.disconnect("s1"), 1);

    let outcome = run.await.expect("join").expect("run should finish");
    assert!(outcome.status.is_completed());
    let error = tool_output(outcome.state.history.messages(), "t1");
    assert!(
        error["errorMessage"]
            .as_str()
            .is_some_and(|message| message.contains("client disconnected"))
    );
    assert_eq!(h.provider.requests().len(), 2);
    assert_eq!(h.deps.bridge.pending_count(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn out_of_order_client_responses_are_recorded_in_emission_order() {
    let provider = ScriptedProvider::new();
    provider.push(
        "coder",
        tool_script(vec![
            ("t1", "run_terminal_command", json!({"command": "echo a"})),
            ("t2", "run_terminal_command", json!({"command": "echo b"})),
        ]),
    );
    provider.push("coder", text_script("both ran"));
    let h = coder_harness(provider);
    let mut outbound = h.deps.sessions.attach("s1");
    let handler = identified_handler(&h);
    let scope = h.deps.sessions.start_run("s1", "u1");

    let run = tokio::spawn(run_agent(
        h.deps.clone(),
        AgentRunRequest::root("coder", "echo twice", scope),
    ));

    let mut requested = vec![
        next_tool_request(&mut outbound).await.0,
        next_tool_request(&mut outbound).await.0,
    ];
    requested.sort();
    assert_eq!(requested, vec!["t1", "t2"]);

    for (txid, id, stdout) in [(2, "t2", "b"), (3, "t1", "a")] {
        let frame = json!({
            "type": "action",
            "txid": txid,
            "data": {
                "type": "tool-call-response",
                "toolCallId": id,
                "output": {"stdout": stdout}
            }
        });
        let acks = handler.handle_text(&frame.to_string());
        assert_eq!(acks, vec![ServerMessage::ack(txid)]);
    }

    let outcome = run.await.expect("join").expect("run should finish");
    let messages = outcome.state.history.messages();
    assert_eq!(tool_result_ids(messages), vec!["t1", "t2"]);
    assert_eq!(tool_output(messages, "t1"), json!({"stdout": "a"}));
    assert_eq!(tool_output(messages, "t2"), json!({"stdout": "b"}));
}

#[tokio::test(flavor = "current_thread")]
async fn long_client_output_is_truncated() {
    let provider = ScriptedProvider::new();
    provider.push(
        "coder",
        tool_script(vec![(
            "t1",
            "run_terminal_command",
            json!({"command": "seq 1000"}),
        )]),
    );
    provider.push("coder", text_script("done"));
    let h = coder_harness(provider);
    let mut outbound = h.deps.sessions.attach("s1");
    let scope = h.deps.sessions.start_run("s1", "u1");

    let run = tokio::spawn(run_agent(
        h.deps.clone(),
        AgentRunRequest::root("coder", "count", scope),
    ));
    let (tool_call_id, _) = next_tool_request(&mut outbound).await;
    let stdout: String = (1..=1000).map(|line| format!("{line}\n")).collect();
    assert!(h.deps.bridge.resolve("s1", &tool_call_id, json!({"stdout": stdout})));

    let outcome = run.await.expect("join").expect("run should finish");
    let recorded = tool_output(outcome.state.history.messages(), "t1");
    let recorded = recorded["stdout"].as_str().expect("stdout kept as a string");
    assert!(recorded.len() < stdout.len());
}

#[tokio::test(flavor = "current_thread")]
async fn cancel_user_input_stops_the_run() {
    let provider = ScriptedProvider::new();
    provider.push(
        "coder",
        tool_script(vec![(
            "t1",
            "run_terminal_command",
            json!({"command": "sleep 100"}),
        )]),
    );
    let h = coder_harness(provider);
    let mut outbound = h.deps.sessions.attach("s1");
    let handler = identified_handler(&h);
    let scope = h.deps.sessions.start_run("s1", "u1");

    let run = tokio::spawn(run_agent(
        h.deps.clone(),
        AgentRunRequest::root("coder", "wait forever", scope),
    ));
    next_tool_request(&mut outbound).await;

    let acks = handler.handle_text(
        &json!({
            "type": "action",
            "txid": 9,
            "data": {"type": "cancel-user-input", "promptId": "u1"}
        })
        .to_string(),
    );
    assert_eq!(acks, vec![ServerMessage::ack(9)]);

    let outcome = run.await.expect("join").expect("cancellation produces an outcome");
    assert!(matches!(
        outcome.status,
        RunStatus::Errored {
            kind: ErrorKind::Cancelled,
            ..
        }
    ));
    assert!(outcome.state.history.is_consistent());
    assert_eq!(h.provider.requests().len(), 1);
    assert_eq!(h.deps.bridge.pending_count(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn protocol_acks_echo_txids() {
    let h = coder_harness(ScriptedProvider::new());
    let _outbound = h.deps.sessions.attach("s1");
    let handler = ConnectionHandler::new("s1", h.deps.sessions.clone(), Arc::clone(&h.deps.bridge));

    assert_eq!(
        handler.handle_text(r#"{"type":"ping","txid":4}"#),
        vec![ServerMessage::ack(4)]
    );
    assert_eq!(
        handler.handle_text(
            r#"{"type":"action","txid":5,"data":{"type":"tool-call-response","toolCallId":"x","output":{}}}"#
        ),
        vec![ServerMessage::nack(Some(5), "not identified")]
    );
    match handler.handle_text("{not json").as_slice() {
        [ServerMessage::Ack {
            txid: None,
            success: false,
            error: Some(_),
        }] => {}
        other => panic!("unexpected reply: {other:?}"),
    }

    let handler = identified_handler(&h);
    assert_eq!(
        handler.handle_text(r#"{"type":"subscribe","txid":6,"topics":["usage"]}"#),
        vec![ServerMessage::ack(6)]
    );
    assert_eq!(h.deps.sessions.topics("s1"), vec!["usage"]);
    assert_eq!(
        handler.handle_text(
            r#"{"type":"action","txid":7,"data":{"type":"tool-call-response","toolCallId":"missing","output":{}}}"#
        ),
        vec![ServerMessage::nack(
            Some(7),
            "no pending tool call with id missing"
        )]
    );

    handler.close();
    assert!(!h.deps.sessions.is_connected("s1"));
}

#[tokio::test(flavor = "current_thread")]
async fn client_output_violating_the_schema_is_a_tool_error() {
    let provider = ScriptedProvider::new();
    provider.push(
        "coder",
        tool_script(vec![(
            "t1",
            "run_terminal_command",
            json!({"command": "make"}),
        )]),
    );
    provider.push("coder", text_script("the output was malformed"));
    let h = coder_harness(provider);
    let mut outbound = h.deps.sessions.attach("s1");
    let scope = h.deps.sessions.start_run("s1", "u1");

    let run = tokio::spawn(run_agent(
        h.deps.clone(),
        AgentRunRequest::root("coder", "build", scope),
    ));
    let (tool_call_id, _) = next_tool_request(&mut outbound).await;
    assert!(h.deps.bridge.resolve(
        "s1",
        &tool_call_id,
        json!({"exitCode": "not-an-int", "stdout": 5})
    ));

    let outcome = run.await.expect("join").expect("run should finish");
    assert!(outcome.status.is_completed());
    let recorded = tool_output(outcome.state.history.messages(), "t1");
    assert!(recorded.get("stdout").is_none());
    assert!(
        recorded["errorMessage"]
            .as_str()
            .is_some_and(|message| message.contains("invalid output from tool 'run_terminal_command'"))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn browser_logs_and_code_search_are_delegated() {
    let provider = ScriptedProvider::new();
    provider.push(
        "inspector",
        tool_script(vec![
            (
                "b1",
                "browser_logs",
                json!({"type": "navigate", "url": "http://localhost:3000"}),
            ),
            ("q1", "code_search", json!({"pattern": "fn main"})),
        ]),
    );
    provider.push("inspector", text_script("inspected"));
    let h = harness(
        vec![template(
            "inspector",
            &["browser_logs", "code_search", "end_turn"],
        )],
        provider,
    );
    let mut outbound = h.deps.sessions.attach("s1");
    let scope = h.deps.sessions.start_run("s1", "u1");

    let run = tokio::spawn(run_agent(
        h.deps.clone(),
        AgentRunRequest::root("inspector", "check the page", scope),
    ));

    let mut requested = vec![
        next_tool_request(&mut outbound).await,
        next_tool_request(&mut outbound).await,
    ];
    requested.sort();
    assert_eq!(
        requested,
        vec![
            ("b1".to_string(), "browser_logs".to_string()),
            ("q1".to_string(), "code_search".to_string()),
        ]
    );

    let hits: String = (1..=300).map(|line| format!("src/main.rs:{line}\n")).collect();
    assert!(h.deps.bridge.resolve("s1", "q1", json!({"stdout": hits})));
    assert!(h.deps.bridge.resolve(
        "s1",
        "b1",
        json!({"logs": [{"type": "error", "message": "404"}]})
    ));

    let outcome = run.await.expect("join").expect("run should finish");
    let messages = outcome.state.history.messages();
    assert_eq!(tool_result_ids(messages), vec!["b1", "q1"]);
    assert_eq!(tool_output(messages, "b1")["logs"][0]["message"], "404");
    let search = tool_output(messages, "q1");
    let search = search["stdout"].as_str().expect("stdout kept as a string");
    assert!(search.contains("[... 100 lines omitted ...]"));
    assert!(search.ends_with("src/main.rs:300"));
}
