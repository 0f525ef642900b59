use shared::protocol::NewTalk;
use storage::Storage;

#[tokio::test]
async fn talks_survive_reopening_a_file_backed_database() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("talks.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let kept = {
        let storage = Storage::new(&database_url).await.expect("db");
        let kept = storage
            .insert_talk(&NewTalk {
                name: "Async Rust".into(),
                description: "Futures all the way down".into(),
                speaker_name: "Ada".into(),
                speaker_bio: "Runtime hacker".into(),
                client_id: None,
            })
            .await
            .expect("insert kept");
        let dropped = storage
            .insert_talk(&NewTalk {
                name: "Dropped".into(),
                description: "Deleted before reopen".into(),
                speaker_name: "Bob".into(),
                speaker_bio: "Placeholder".into(),
                client_id: None,
            })
            .await
            .expect("insert dropped");
        assert!(storage.delete_talk(dropped.talk_id).await.expect("delete"));
        kept
    };

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let talks = reopened.list_talks().await.expect("list");
    assert_eq!(talks.len(), 1);
    assert_eq!(talks[0].talk_id, kept.talk_id);
    assert_eq!(talks[0].name, "Async Rust");
    drop(reopened);
}
