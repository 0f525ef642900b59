//! Remote contract the reconciliation layer talks to.

use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::{
    domain::TalkId,
    protocol::{NewTalk, Talk},
};

use crate::error::RemoteError;

/// Created-talk notifications from every client, in the order the backend saw them.
/// Dropping the stream releases the subscription.
pub type TalkStream = BoxStream<'static, Talk>;

#[async_trait]
pub trait TalkApi: Send + Sync {
    async fn list_talks(&self) -> Result<Vec<Talk>, RemoteError>;
    /// The returned talk carries the backend id and echoes the request's client id.
    async fn create_talk(&self, talk: NewTalk) -> Result<Talk, RemoteError>;
    async fn delete_talk(&self, id: TalkId) -> Result<(), RemoteError>;
    async fn subscribe_created_talks(&self) -> Result<TalkStream, RemoteError>;
}
