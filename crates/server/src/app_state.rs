use server_api::ApiContext;
use shared::protocol::ServerEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    /// Fans an event out to every connected websocket. Having no subscribers is not an error.
    pub(crate) fn publish(&self, event: ServerEvent) {
        let receivers = self.events.send(event).unwrap_or(0);
        tracing::debug!(receivers, "events: published");
    }
}
