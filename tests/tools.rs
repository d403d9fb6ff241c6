//! Tool dispatch tests
//!
//! Function calls arrive on the control channel; results must be sent back
//! as `function_call_output` items followed by a `response.create`.
//!
//! Run: cargo test --test tools

mod mock_media;

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use mock_media::{
    FakeMicrophone, FakePeer, FakePeerFactory, FakeRenderer, answering_server, harness, wait_for,
};
use waav_voice_engine::core::realtime::ToolDef;
use waav_voice_engine::core::tools::{FnTool, HttpToolConfig, ToolError};
use waav_voice_engine::{CallStatus, EngineConfig, MediaBackend, SessionSettings, VoiceEngine};

fn clock_tool() -> Arc<FnTool> {
    Arc::new(FnTool::new(
        ToolDef::function("get_time", Some("Current time".to_string()), None),
        |_args: Value| async move { Ok(json!({"time": "noon"})) },
    ))
}

/// `(call_id, parsed output)` of every function result sent so far.
fn outputs(peer: &FakePeer) -> Vec<(String, Value)> {
    peer.channel()
        .sent()
        .into_iter()
        .filter(|event| event["item"]["type"] == "function_call_output")
        .map(|event| {
            let output = event["item"]["output"].as_str().unwrap_or_default();
            (
                event["item"]["call_id"].as_str().unwrap_or_default().to_string(),
                serde_json::from_str(output).unwrap_or(Value::Null),
            )
        })
        .collect()
}

async fn open(engine: &VoiceEngine, peers: &FakePeerFactory) -> Arc<FakePeer> {
    engine.start().await.unwrap();
    let peer = peers.latest();
    peer.open_channel();
    assert!(wait_for(|| engine.status() == CallStatus::Listening).await);
    assert!(wait_for(|| !peer.channel().sent().is_empty()).await);
    peer
}

#[tokio::test]
async fn test_tools_advertised_in_session_update() {
    let h = harness(SessionSettings::default()).await;
    h.engine.register_tool(clock_tool());
    let peer = open(&h.engine, &h.peers).await;

    let update = &peer.channel().sent()[0];
    assert_eq!(update["type"], "session.update");
    assert_eq!(update["session"]["tool_choice"], "auto");
    assert_eq!(update["session"]["tools"][0]["type"], "function");
    assert_eq!(update["session"]["tools"][0]["name"], "get_time");

    h.engine.stop().await;
}

#[tokio::test]
async fn test_function_call_result_sent_back() {
    let h = harness(SessionSettings::default()).await;
    h.engine.register_tool(clock_tool());
    let peer = open(&h.engine, &h.peers).await;

    // Name arrives on the output item, arguments on a later event
    peer.server_event(json!({
        "type": "response.output_item.added",
        "item": {"type": "function_call", "call_id": "call_1", "name": "get_time"}
    }));
    peer.server_event(json!({
        "type": "response.function_call_arguments.done",
        "call_id": "call_1",
        "arguments": ""
    }));

    assert!(wait_for(|| outputs(&peer).len() == 1).await);
    let (call_id, output) = outputs(&peer).remove(0);
    assert_eq!(call_id, "call_1");
    assert_eq!(output, json!({"time": "noon"}));

    assert!(wait_for(|| peer.channel().sent_types().last().map(String::as_str) == Some("response.create")).await);

    h.engine.stop().await;
}

#[tokio::test]
async fn test_unknown_and_failing_tools_report_errors() {
    let h = harness(SessionSettings::default()).await;
    h.engine.register_tool(Arc::new(FnTool::new(
        ToolDef::function("flaky", None, None),
        |_args: Value| async move { Err(ToolError::Failed("backend offline".to_string())) },
    )));
    let peer = open(&h.engine, &h.peers).await;

    peer.server_event(json!({
        "type": "response.function_call_arguments.done",
        "call_id": "call_a",
        "name": "missing_tool",
        "arguments": "{}"
    }));
    assert!(wait_for(|| outputs(&peer).len() == 1).await);
    assert_eq!(outputs(&peer)[0].1, json!({"error": "Unknown tool: missing_tool"}));

    peer.server_event(json!({
        "type": "response.function_call_arguments.done",
        "call_id": "call_b",
        "name": "flaky",
        "arguments": "{}"
    }));
    assert!(wait_for(|| outputs(&peer).len() == 2).await);
    let (call_id, output) = outputs(&peer).remove(1);
    assert_eq!(call_id, "call_b");
    assert!(output["error"].as_str().unwrap().contains("backend offline"));

    // A tool failure never ends the call
    assert!(h.engine.is_listening());
    h.engine.stop().await;
}

#[tokio::test]
async fn test_unparseable_arguments_are_dropped() {
    let h = harness(SessionSettings::default()).await;
    h.engine.register_tool(clock_tool());
    let peer = open(&h.engine, &h.peers).await;

    peer.server_event(json!({
        "type": "response.function_call_arguments.done",
        "call_id": "call_x",
        "name": "get_time",
        "arguments": "{not json"
    }));
    mock_media::settle().await;
    assert!(outputs(&peer).is_empty());

    h.engine.stop().await;
}

#[tokio::test]
async fn test_http_tool_from_config() {
    let server = answering_server().await;
    Mock::given(method("GET"))
        .and(path("/schedule"))
        .and(query_param("days", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"lectures": ["Torts"]})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = EngineConfig::default();
    config.signaling_url = format!("{}{}", server.uri(), mock_media::OFFER_PATH);
    config.tools = vec![HttpToolConfig {
        name: "get_schedule".to_string(),
        description: Some("Upcoming lectures".to_string()),
        url: format!("{}/schedule", server.uri()),
        parameters: Some(json!({"type": "object", "properties": {"days": {"type": "integer"}}})),
        timeout_seconds: Some(5),
    }];

    let peers = Arc::new(FakePeerFactory::default());
    let backend = MediaBackend::new(
        peers.clone(),
        Arc::new(FakeMicrophone::default()),
        Arc::new(FakeRenderer::default()),
    );
    let engine = VoiceEngine::from_config(&config, backend).unwrap();
    assert!(engine.tools().contains("get_schedule"));

    let peer = open(&engine, &peers).await;
    peer.server_event(json!({
        "type": "response.function_call_arguments.done",
        "call_id": "call_s",
        "name": "get_schedule",
        "arguments": "{\"days\": 3}"
    }));

    assert!(wait_for(|| outputs(&peer).len() == 1).await);
    assert_eq!(outputs(&peer)[0].1, json!({"lectures": ["Torts"]}));

    engine.stop().await;
}
