use shared::{
    domain::TalkId,
    error::ApiError,
    protocol::{NewTalk, ServerEvent, Talk},
};
use storage::Storage;
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_talks(ctx: &ApiContext) -> Result<Vec<Talk>, ApiError> {
    let talks = ctx.storage.list_talks().await.map_err(internal)?;
    Ok(talks.into_iter().map(Talk::from).collect())
}

/// Persists a talk and returns the event to publish to live subscribers.
pub async fn create_talk(ctx: &ApiContext, talk: NewTalk) -> Result<ServerEvent, ApiError> {
    if let Some(field) = talk.first_empty_field() {
        return Err(ApiError::validation(format!("{field} must not be empty")));
    }

    let stored = ctx.storage.insert_talk(&talk).await.map_err(internal)?;
    info!(
        talk_id = stored.talk_id.0,
        client_id = ?stored.client_id,
        "talks: created"
    );
    Ok(ServerEvent::TalkCreated {
        talk: stored.into(),
    })
}

pub async fn delete_talk(ctx: &ApiContext, talk_id: TalkId) -> Result<ServerEvent, ApiError> {
    let removed = ctx.storage.delete_talk(talk_id).await.map_err(internal)?;
    if !removed {
        return Err(ApiError::not_found(format!("talk {talk_id} not found")));
    }
    info!(talk_id = talk_id.0, "talks: deleted");
    Ok(ServerEvent::TalkDeleted { id: talk_id })
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{domain::ClientId, error::ErrorCode};

    async fn setup() -> ApiContext {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        ApiContext { storage }
    }

    fn new_talk(name: &str) -> NewTalk {
        NewTalk {
            name: name.into(),
            description: "Lifetimes explained".into(),
            speaker_name: "Niko".into(),
            speaker_bio: "Language designer".into(),
            client_id: Some(ClientId::new()),
        }
    }

    #[tokio::test]
    async fn create_rejects_empty_fields() {
        let ctx = setup().await;
        let mut talk = new_talk("valid");
        talk.speaker_name.clear();

        let err = create_talk(&ctx, talk).await.expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(err.message.contains("speakerName"));
        assert!(list_talks(&ctx).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn create_assigns_id_and_echoes_client_id() {
        let ctx = setup().await;
        let talk = new_talk("Pinning");
        let client_id = talk.client_id;

        let event = create_talk(&ctx, talk).await.expect("create");
        let ServerEvent::TalkCreated { talk } = event else {
            panic!("unexpected event: {event:?}");
        };
        assert!(talk.id.is_some());
        assert_eq!(talk.client_id, client_id);

        let listed = list_talks(&ctx).await.expect("list");
        assert_eq!(listed, vec![talk]);
    }

    #[tokio::test]
    async fn delete_unknown_talk_is_not_found() {
        let ctx = setup().await;
        let err = delete_talk(&ctx, TalkId(404)).await.expect_err("should fail");
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn delete_removes_talk_from_listing() {
        let ctx = setup().await;
        let ServerEvent::TalkCreated { talk } =
            create_talk(&ctx, new_talk("Short-lived")).await.expect("create")
        else {
            panic!("expected talk_created");
        };
        let id = talk.id.expect("id");

        let event = delete_talk(&ctx, id).await.expect("delete");
        assert!(matches!(event, ServerEvent::TalkDeleted { id: deleted } if deleted == id));
        assert!(list_talks(&ctx).await.expect("list").is_empty());
    }
}
