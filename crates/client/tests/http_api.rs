use pretty_assertions::assert_eq;
use scrape_hub_client::{ApiCallError, HttpJobApi, JobApi};
use scrape_hub_server_jobs::{JobSnapshot, JobStatus, StartOutcome, StartResponse, StartStatus};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn running(key: &str, id: u64) -> JobSnapshot {
    let mut snap = JobSnapshot::idle(key);
    snap.execution_id = Some(id);
    snap.state = JobStatus::Running;
    snap.message = "Fetching page 1 of 10".into();
    snap
}

#[tokio::test]
async fn test_start_sends_api_key_and_parses_response() {
    let server = MockServer::start().await;
    let body = StartResponse::from(StartOutcome::Started(running("seia", 7)));
    Mock::given(method("POST"))
        .and(path("/api/scrape/seia"))
        .and(header("X-API-Key", "s3cret"))
        .respond_with(ResponseTemplate::new(202).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpJobApi::new(server.uri(), Some("s3cret".into())).unwrap();
    let resp = api.start("seia").await.unwrap();

    assert_eq!(resp.status, StartStatus::Started);
    assert_eq!(resp.snapshot.execution_id, Some(7));
    assert_eq!(resp.snapshot.state, JobStatus::Running);
}

#[tokio::test]
async fn test_snapshot_decodes_terminal_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/scrape-progress/seia"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "seia",
            "executionId": 7,
            "state": "completed",
            "percent": 100,
            "message": "Saved 37 leads (37 new, 0 updated)",
            "result": { "kind": "completed", "count": 37, "metrics": { "inserted": 37 } },
            "startedAt": "2024-03-01T12:00:00Z",
            "endedAt": "2024-03-01T12:01:00Z"
        })))
        .mount(&server)
        .await;

    let api = HttpJobApi::new(server.uri(), None).unwrap();
    let snap = api.snapshot("seia", None).await.unwrap();

    assert_eq!(snap.state, JobStatus::Completed);
    assert_eq!(snap.percent, 100);
    assert!(snap.is_terminal());
    assert!(snap.ended_at.is_some());
}

#[tokio::test]
async fn test_snapshot_of_execution_sends_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/scrape-progress/seia"))
        .and(query_param("execution", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(running("seia", 7)))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpJobApi::new(server.uri(), None).unwrap();
    let snap = api.snapshot("seia", Some(7)).await.unwrap();
    assert_eq!(snap.execution_id, Some(7));
    assert_eq!(snap.state, JobStatus::Running);
}

#[tokio::test]
async fn test_cancel_reports_acknowledgement() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scrape-cancel/seia"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": false })))
        .mount(&server)
        .await;

    let api = HttpJobApi::new(server.uri(), None).unwrap();
    assert!(!api.request_cancel("seia").await.unwrap().acknowledged);
}

#[tokio::test]
async fn test_not_found_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/scrape-progress/cmf"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "error": "Source not found" })),
        )
        .mount(&server)
        .await;

    let api = HttpJobApi::new(server.uri(), None).unwrap();
    let err = api.snapshot("cmf", None).await.unwrap_err();

    match &err {
        ApiCallError::Status { status, body, .. } => {
            assert_eq!(*status, 404);
            assert!(body.contains("Source not found"));
        }
        other => panic!("expected Status, got {other:?}"),
    }
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let api = HttpJobApi::new(server.uri(), None).unwrap();
    let err = api.snapshot("seia", None).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let api = HttpJobApi::new(server.uri(), None).unwrap();
    let err = api.snapshot("seia", None).await.unwrap_err();
    assert!(matches!(err, ApiCallError::Decode { .. }), "{err:?}");
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let api = HttpJobApi::new(uri, None).unwrap();
    let err = api.snapshot("seia", None).await.unwrap_err();
    assert!(matches!(err, ApiCallError::Transport { .. }), "{err:?}");
    assert!(err.is_transient());
}
