use emotion_client_core::api::{ApiError, EmotionApi, HttpEmotionApi, UserProfile};
use emotion_client_core::capture::AudioArtifact;
use emotion_client_core::config::{ApiBaseUrl, InsightsWindow};
use emotion_client_core::interpret::{interpret, DisplayMode};
use emotion_client_core::memory::{Importance, NewMemory};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn api_for(server: &MockServer) -> HttpEmotionApi {
    HttpEmotionApi::new(ApiBaseUrl::parse(&server.uri()).unwrap())
}

#[tokio::test]
async fn text_prediction_posts_json_and_decodes_ranked_scores() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict-text"))
        .and(query_param("all_scores", "true"))
        .and(body_partial_json(json!({"user_id": "alice", "text": "what a day"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "emotion": "joy",
            "confidence": 0.55,
            "user_id": "alice",
            "scores": {"joy": 0.55, "surprise": 0.30},
            "top": [["joy", 0.55], ["surprise", 0.30]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let result = api
        .classify_text("what a day".to_owned(), Some("alice".to_owned()))
        .await
        .unwrap();
    let model = interpret(&result);
    assert_eq!(model.mode, DisplayMode::Mixed);
    assert_eq!(model.chips(), vec!["joy 55%", "surprise 30%"]);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["client_time"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn speech_upload_is_multipart_with_a_typed_filename() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict-speech"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "emotion": "sadness",
            "confidence": 0.81,
            "transcript": "i miss home",
            "duration": 2.4,
            "top": [["sadness", 0.81]],
            "_diag": {"file": "recording.ogg", "content_type": "audio/ogg", "duration": 2.4, "used_fallback": false}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let artifact = AudioArtifact::new(b"OggS fake payload".to_vec(), "audio/ogg;codecs=opus");
    let result = api
        .classify_speech(artifact, Some("bob".to_owned()))
        .await
        .unwrap();
    assert_eq!(result.transcript.as_deref(), Some("i miss home"));
    assert_eq!(interpret(&result).confidence_text(), "Confidence: 81.0%");

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    assert!(content_type.starts_with("multipart/form-data"), "{content_type}");

    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains(r#"name="audio"; filename="recording.ogg""#), "{body}");
    assert!(body.contains("Content-Type: audio/ogg;codecs=opus"), "{body}");
    assert!(body.contains("OggS fake payload"));
    assert!(body.contains(r#"name="user_id""#));
    assert!(body.contains("bob"));
    assert!(body.contains(r#"name="client_time""#));
}

#[tokio::test]
async fn history_accepts_the_paged_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .and(query_param("user_id", "alice"))
        .and(query_param("page", "1"))
        .and(query_param("page_size", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 1,
            "page_size": 200,
            "items": [
                {"user_id": "alice", "message": "hi", "detected_emotion": "joy", "confidence": 0.9, "timestamp": "2024-06-01T10:00:00", "client_time": null},
                {"user_id": "alice", "message": null, "detected_emotion": null, "confidence": null, "timestamp": null}
            ]
        })))
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let items = api.fetch_history("alice".to_owned(), 1, 200).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].emotion, "joy");
    assert_eq!(items[1].emotion, "unknown");
    assert!(items[1].timestamp.is_none());
}

#[tokio::test]
async fn history_accepts_a_bare_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"message": "hi", "detected_emotion": "fear", "confidence": 0.4, "timestamp": "2024-06-01T10:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let items = api.fetch_history("alice".to_owned(), 1, 10).await.unwrap();
    assert_eq!(items[0].emotion, "fear");
}

#[tokio::test]
async fn error_detail_is_surfaced_to_the_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict-speech"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": "transcription empty; please try again with clearer audio"
        })))
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let err = api
        .classify_speech(AudioArtifact::new(vec![1u8, 2, 3], "audio/webm"), None)
        .await
        .unwrap_err();
    match &err {
        ApiError::Status { status, .. } => assert_eq!(*status, 422),
        other => panic!("expected status error, got {other:?}"),
    }
    assert_eq!(
        err.user_message(),
        "transcription empty; please try again with clearer audio"
    );
}

#[tokio::test]
async fn server_errors_without_detail_fall_back_to_a_generic_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/memory"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let err = api.fetch_memory("alice".to_owned(), 5).await.unwrap_err();
    assert_eq!(
        err.user_message(),
        emotion_client_core::api::CONNECTIVITY_MESSAGE
    );
}

#[tokio::test]
async fn malformed_success_bodies_are_invalid_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/insights/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let err = api
        .fetch_insights("alice".to_owned(), InsightsWindow::new(7).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

#[tokio::test]
async fn insights_pass_the_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/insights/summary"))
        .and(query_param("user_id", "alice"))
        .and(query_param("window_days", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 4,
            "top_emotion": "joy",
            "counts": {"joy": 3, "anger": 1},
            "mix": {"positive": 0.75, "negative": 0.25, "neutral": 0.0},
            "window_days": 7
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let insights = api
        .fetch_insights("alice".to_owned(), InsightsWindow::new(7).unwrap())
        .await
        .unwrap();
    assert_eq!(insights.top_emotion.as_deref(), Some("joy"));
    assert_eq!(insights.mix.positive, 0.75);
}

#[tokio::test]
async fn memory_round_trip_uses_backend_field_names() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/memory"))
        .and(body_partial_json(json!({
            "user_id": "alice",
            "memory_type": "note",
            "memory_content": "likes tea",
            "importance": "high"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "mem_id": "abc123"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/memory"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"user_id": "alice", "memory_type": "note", "memory_content": "likes tea", "importance": "high", "created_at": "2024-06-01T10:00:00"}
        ])))
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let ack = api
        .save_memory(NewMemory {
            user_id: "alice".to_owned(),
            memory_type: "note".to_owned(),
            content: "likes tea".to_owned(),
            importance: Importance::High,
        })
        .await
        .unwrap();
    assert!(ack.ok);
    assert_eq!(ack.mem_id.as_deref(), Some("abc123"));

    let memories = api.fetch_memory("alice".to_owned(), 5).await.unwrap();
    assert_eq!(memories[0].content, "likes tea");
    assert_eq!(memories[0].importance, Importance::High);
}

#[tokio::test]
async fn profiles_are_read_by_id_and_written_whole() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "alice", "name": "Alice", "interaction_style": "gentle", "preferences": ["tea"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "user not found"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_partial_json(json!({"user_id": "alice", "interaction_style": "direct"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "user_id": "alice"})))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let profile = api.fetch_profile("alice".to_owned()).await.unwrap();
    assert_eq!(profile.preferences, vec!["tea"]);

    let missing = api.fetch_profile("ghost".to_owned()).await.unwrap_err();
    assert_eq!(missing.user_message(), "user not found");

    let ack = api
        .save_profile(UserProfile {
            interaction_style: Some("direct".to_owned()),
            ..profile
        })
        .await
        .unwrap();
    assert_eq!(ack.user_id.as_deref(), Some("alice"));
}

#[tokio::test]
async fn adaptive_reply_passes_the_user_as_a_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/respond"))
        .and(query_param("user_id", "alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "You seem to be doing well!",
            "reason": "mostly-positive-history",
            "stats": {"counts": {"positive": 2.4, "negative": 0.2, "neutral": 0.5}, "total": 3.1, "pos_pct": 0.77, "neg_pct": 0.06}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let reply = api.respond("alice".to_owned()).await.unwrap();
    assert_eq!(reply.reason, "mostly-positive-history");
    assert!(reply.stats.pos_pct > 0.7);
}

#[tokio::test]
async fn health_check_is_bounded_by_its_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "ok"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let api = api_for(&server)
        .await
        .with_health_timeout(Duration::from_millis(100));
    match api.health().await {
        Err(ApiError::Network(e)) => assert!(e.is_timeout(), "{e}"),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn health_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "db-unreachable"})))
        .mount(&server)
        .await;

    let api = api_for(&server).await;
    let health = api.health().await.unwrap();
    assert!(!health.is_ok());
}
