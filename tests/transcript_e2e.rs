//! Transcript end-to-end tests
//!
//! Negotiates against the wiremock signaling endpoint, then feeds transcript
//! events through the control channel and checks the conversation log.
//!
//! Run: cargo test --test transcript_e2e

mod mock_media;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use waav_voice_engine::transport::DataChannel;

use mock_media::{
    ANSWER_SDP, FakeMicrophone, FakePeer, Harness, OFFER_PATH, harness, harness_with, settle,
    wait_for,
};
use waav_voice_engine::core::realtime::DEFAULT_VOICE_HEADER;
use waav_voice_engine::{CallStatus, SessionSettings, TranscriptRole};

async fn connected(h: &Harness) -> Arc<FakePeer> {
    h.engine.start().await.unwrap();
    let peer = h.peers.latest();
    peer.open_channel();
    assert!(wait_for(|| h.engine.status() == CallStatus::Listening).await);
    peer
}

#[tokio::test]
async fn test_user_delta_then_final_yields_single_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OFFER_PATH))
        .and(header("content-type", "application/sdp"))
        .and(header(DEFAULT_VOICE_HEADER, "shimmer"))
        .and(body_string_contains("m=audio"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ANSWER_SDP))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness_with(SessionSettings::default(), FakeMicrophone::default(), server);

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let recorder = emitted.clone();
    h.engine.on_turn(Arc::new(move |turn| {
        let recorder = recorder.clone();
        Box::pin(async move {
            recorder.lock().push(turn);
        })
    }));

    let peer = connected(&h).await;

    peer.server_event(json!({
        "type": "conversation.item.input_audio_transcription.delta",
        "item_id": "item_1",
        "delta": "I think"
    }));
    assert!(wait_for(|| h.engine.pending_text(TranscriptRole::User) == "I think").await);

    peer.server_event(json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "item_id": "item_1",
        "transcript": "I think consideration"
    }));
    assert!(wait_for(|| h.engine.turns().len() == 1).await);

    let turns = h.engine.turns();
    assert_eq!(turns[0].role, TranscriptRole::User);
    assert_eq!(turns[0].text, "I think consideration");
    assert_eq!(h.engine.pending_text(TranscriptRole::User), "");
    assert_eq!(emitted.lock().len(), 1);

    h.engine.stop().await;
}

#[tokio::test]
async fn test_duplicate_final_is_suppressed() {
    let h = harness(SessionSettings::default()).await;
    let peer = connected(&h).await;

    for _ in 0..2 {
        peer.server_event(json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "transcript": "What's on my reading list?"
        }));
    }
    assert!(wait_for(|| h.engine.turns().len() == 1).await);
    settle().await;
    assert_eq!(h.engine.turns().len(), 1);

    h.engine.stop().await;
}

#[tokio::test]
async fn test_assistant_deltas_merge_into_one_turn() {
    let h = harness(SessionSettings::default()).await;
    let peer = connected(&h).await;

    for delta in ["Hello", " there", "."] {
        peer.server_event(json!({
            "type": "response.audio_transcript.delta",
            "response_id": "resp_1",
            "delta": delta
        }));
    }
    peer.server_event(json!({
        "type": "response.audio_transcript.done",
        "response_id": "resp_1"
    }));
    // The same response reported complete again must not duplicate the turn
    peer.server_event(json!({
        "type": "response.completed",
        "response": {"id": "resp_1"},
        "transcript": "Hello there."
    }));

    assert!(wait_for(|| h.engine.turns().len() == 1).await);
    settle().await;
    let turns = h.engine.turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, TranscriptRole::Assistant);
    assert_eq!(turns[0].text, "Hello there.");
    assert_eq!(h.engine.pending_text(TranscriptRole::Assistant), "");

    h.engine.stop().await;
}

#[tokio::test]
async fn test_wake_word_mishearing_is_corrected() {
    let h = harness(SessionSettings::default()).await;
    let peer = connected(&h).await;

    peer.server_event(json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "transcript": "Hey Denmark, what's next?"
    }));
    assert!(wait_for(|| h.engine.turns().len() == 1).await);
    assert_eq!(h.engine.turns()[0].text, "Hey Durmah, what's next?");

    h.engine.stop().await;
}

#[tokio::test]
async fn test_complete_item_discards_pending_buffer() {
    let h = harness(SessionSettings::default()).await;
    let peer = connected(&h).await;

    peer.server_event(json!({
        "type": "conversation.item.input_audio_transcription.delta",
        "delta": "Can you"
    }));
    assert!(wait_for(|| !h.engine.pending_text(TranscriptRole::User).is_empty()).await);

    peer.server_event(json!({
        "type": "conversation.item.created",
        "item": {
            "id": "item_9",
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": "Can you quiz me on torts?"}]
        }
    }));
    assert!(wait_for(|| h.engine.turns().len() == 1).await);
    assert_eq!(h.engine.turns()[0].text, "Can you quiz me on torts?");
    assert_eq!(h.engine.pending_text(TranscriptRole::User), "");

    h.engine.stop().await;
}

#[tokio::test]
async fn test_foreign_script_dropped_for_english() {
    let h = harness(SessionSettings::default()).await;
    let peer = connected(&h).await;

    peer.server_event(json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "transcript": "Это не английский"
    }));
    peer.server_event(json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "transcript": "Back to English."
    }));

    assert!(wait_for(|| h.engine.turns().len() == 1).await);
    settle().await;
    assert_eq!(h.engine.turns().len(), 1);
    assert_eq!(h.engine.turns()[0].text, "Back to English.");

    h.engine.stop().await;
}

#[tokio::test]
async fn test_malformed_messages_are_skipped() {
    let h = harness(SessionSettings::default()).await;
    let peer = connected(&h).await;

    peer.emit(waav_voice_engine::core::transport::TransportEvent::ChannelMessage {
        label: peer.channel().label().to_string(),
        text: "not json".to_string(),
    });
    peer.server_event(json!({"type": "some.future.event", "payload": 1}));
    peer.server_event(json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "transcript": "Still here."
    }));

    assert!(wait_for(|| h.engine.turns().len() == 1).await);
    assert!(h.engine.is_listening());
    assert!(h.engine.last_error().is_none());

    h.engine.stop().await;
}

#[tokio::test]
async fn test_stop_keeps_turns_and_clears_pending() {
    let h = harness(SessionSettings::default()).await;
    let peer = connected(&h).await;

    peer.server_event(json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "transcript": "First question."
    }));
    peer.server_event(json!({
        "type": "conversation.item.input_audio_transcription.delta",
        "delta": "half a thou"
    }));
    assert!(wait_for(|| !h.engine.pending_text(TranscriptRole::User).is_empty()).await);

    h.engine.stop().await;
    assert_eq!(h.engine.turns().len(), 1);
    assert_eq!(h.engine.pending_text(TranscriptRole::User), "");

    h.engine.clear_turns();
    assert!(h.engine.turns().is_empty());
}
