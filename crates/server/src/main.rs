use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use server_api::{create_talk, delete_talk, list_talks, ApiContext};
use shared::{
    domain::TalkId,
    error::{ApiError, ErrorCode},
    protocol::{NewTalk, ServerEvent, Talk},
};
use storage::Storage;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

type ApiFailure = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let (events, _) = broadcast::channel(settings.event_capacity);

    let state = AppState {
        api: ApiContext { storage },
        events,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/talks", get(http_list_talks).post(http_create_talk))
        .route("/talks/:talk_id", delete(http_delete_talk))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiFailure> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| failure(ApiError::internal(e.to_string())))?;
    Ok("ok")
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: ApiError) -> ApiFailure {
    if err.code == ErrorCode::Internal {
        error!(error = %err, "talks: request failed");
    }
    (status_for(err.code), Json(err))
}

async fn http_list_talks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Talk>>, ApiFailure> {
    let talks = list_talks(&state.api).await.map_err(failure)?;
    Ok(Json(talks))
}

async fn http_create_talk(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewTalk>,
) -> Result<Json<Talk>, ApiFailure> {
    let event = create_talk(&state.api, req).await.map_err(failure)?;
    let ServerEvent::TalkCreated { talk } = &event else {
        return Err(failure(ApiError::internal("unexpected create outcome")));
    };
    let talk = talk.clone();
    state.publish(event);
    Ok(Json(talk))
}

async fn http_delete_talk(
    State(state): State<Arc<AppState>>,
    Path(talk_id): Path<i64>,
) -> Result<StatusCode, ApiFailure> {
    let event = delete_talk(&state.api, TalkId(talk_id))
        .await
        .map_err(failure)?;
    state.publish(event);
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();
    info!("ws: subscriber connected");

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ws: subscriber lagged; events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
    info!("ws: subscriber disconnected");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
