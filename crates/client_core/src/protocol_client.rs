//! HTTP + websocket implementation of [`TalkApi`].

use async_trait::async_trait;
use futures::{future, StreamExt};
use reqwest::{Client, Response};
use shared::{
    domain::TalkId,
    error::{ApiError, ErrorCode},
    protocol::{NewTalk, ServerEvent, Talk},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::RemoteError,
    transport::{TalkApi, TalkStream},
};

pub struct HttpTalkApi {
    http: Client,
    server_url: String,
}

impl HttpTalkApi {
    pub fn new(server_url: impl Into<String>) -> Result<Self, RemoteError> {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        let parsed = Url::parse(&server_url).map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RemoteError::InvalidUrl(
                "server_url must start with http:// or https://".to_string(),
            ));
        }
        Ok(Self {
            http: Client::new(),
            server_url,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn ws_url(&self) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&format!("{}/ws", self.server_url))
            .map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| {
            RemoteError::InvalidUrl(format!(
                "cannot derive websocket url from {}",
                self.server_url
            ))
        })?;
        Ok(url)
    }
}

async fn ensure_success(res: Response) -> Result<Response, RemoteError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        let code = if status.is_server_error() {
            ErrorCode::Internal
        } else {
            ErrorCode::Validation
        };
        ApiError::new(code, format!("http {status}: {body}"))
    });
    Err(RemoteError::Rejected {
        status: status.as_u16(),
        error,
    })
}

fn decode_frame(frame: Message) -> Option<Talk> {
    let Message::Text(text) = frame else {
        return None;
    };
    match serde_json::from_str::<ServerEvent>(&text) {
        Ok(ServerEvent::TalkCreated { talk }) => Some(talk),
        Ok(other) => {
            debug!(event = ?other, "live: skipping non-create event");
            None
        }
        Err(err) => {
            warn!(error = %err, "live: invalid server event");
            None
        }
    }
}

#[async_trait]
impl TalkApi for HttpTalkApi {
    async fn list_talks(&self) -> Result<Vec<Talk>, RemoteError> {
        let res = self
            .http
            .get(format!("{}/talks", self.server_url))
            .send()
            .await?;
        let body = ensure_success(res).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn create_talk(&self, talk: NewTalk) -> Result<Talk, RemoteError> {
        let res = self
            .http
            .post(format!("{}/talks", self.server_url))
            .json(&talk)
            .send()
            .await?;
        let body = ensure_success(res).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn delete_talk(&self, id: TalkId) -> Result<(), RemoteError> {
        let res = self
            .http
            .delete(format!("{}/talks/{}", self.server_url, id))
            .send()
            .await?;
        ensure_success(res).await?;
        Ok(())
    }

    async fn subscribe_created_talks(&self) -> Result<TalkStream, RemoteError> {
        let ws_url = self.ws_url()?;
        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        info!(url = %ws_url, "live: subscribed");

        let talks = ws_stream
            .take_while(|frame| {
                let open = match frame {
                    Ok(Message::Close(_)) => false,
                    Ok(_) => true,
                    Err(err) => {
                        warn!(error = %err, "live: websocket receive failed");
                        false
                    }
                };
                future::ready(open)
            })
            .filter_map(|frame| future::ready(frame.ok().and_then(decode_frame)));
        Ok(talks.boxed())
    }
}

#[cfg(test)]
#[path = "tests/protocol_client_tests.rs"]
mod tests;
