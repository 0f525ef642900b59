use super::*;
use axum::{body, body::Body, http::Request};
use shared::domain::ClientId;
use tower::ServiceExt;

async fn test_app() -> (Router, broadcast::Receiver<ServerEvent>) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (events, events_rx) = broadcast::channel(32);
    let app = build_router(Arc::new(AppState {
        api: ApiContext { storage },
        events,
    }));
    (app, events_rx)
}

fn create_request(body: serde_json::Value) -> Request<Body> {
    Request::post("/talks")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _events) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn create_then_list_returns_talk_and_publishes_event() {
    let (app, mut events) = test_app().await;
    let client_id = ClientId::new();

    let response = app
        .clone()
        .oneshot(create_request(serde_json::json!({
            "name": "Zero-cost abstractions",
            "description": "What the optimiser does for you",
            "speakerName": "Carol",
            "speakerBio": "Systems engineer",
            "clientId": client_id,
        })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let created: Talk = read_json(response).await;
    assert!(created.id.is_some());
    assert_eq!(created.client_id, Some(client_id));

    match events.try_recv().expect("published event") {
        ServerEvent::TalkCreated { talk } => assert_eq!(talk, created),
        other => panic!("unexpected event: {other:?}"),
    }

    let list = Request::get("/talks").body(Body::empty()).expect("request");
    let response = app.oneshot(list).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let talks: Vec<Talk> = read_json(response).await;
    assert_eq!(talks, vec![created]);
}

#[tokio::test]
async fn create_with_empty_field_is_a_validation_error() {
    let (app, mut events) = test_app().await;
    let response = app
        .oneshot(create_request(serde_json::json!({
            "name": "",
            "description": "d",
            "speakerName": "s",
            "speakerBio": "b",
        })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = read_json(response).await;
    assert_eq!(err.code, ErrorCode::Validation);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn delete_existing_and_missing_talks() {
    let (app, mut events) = test_app().await;
    let response = app
        .clone()
        .oneshot(create_request(serde_json::json!({
            "name": "n",
            "description": "d",
            "speakerName": "s",
            "speakerBio": "b",
        })))
        .await
        .expect("response");
    let created: Talk = read_json(response).await;
    let id = created.id.expect("id");
    let _ = events.try_recv();

    let delete = Request::delete(format!("/talks/{id}"))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(delete).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(matches!(
        events.try_recv(),
        Ok(ServerEvent::TalkDeleted { id: deleted }) if deleted == id
    ));

    let again = Request::delete(format!("/talks/{id}"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(again).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn every_error_code_maps_to_a_client_or_server_status() {
    assert_eq!(status_for(ErrorCode::Validation), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(ErrorCode::NotFound), StatusCode::NOT_FOUND);
    assert!(status_for(ErrorCode::Internal).is_server_error());
}
