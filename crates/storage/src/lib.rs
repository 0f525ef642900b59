use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::{
    domain::{ClientId, TalkId},
    protocol::{NewTalk, Talk},
};

const MEMORY_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredTalk {
    pub talk_id: TalkId,
    pub name: String,
    pub description: String,
    pub speaker_name: String,
    pub speaker_bio: String,
    pub client_id: Option<ClientId>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredTalk> for Talk {
    fn from(stored: StoredTalk) -> Self {
        Talk {
            id: Some(stored.talk_id),
            name: stored.name,
            description: stored.description,
            speaker_name: stored.speaker_name,
            speaker_bio: stored.speaker_bio,
            client_id: stored.client_id,
        }
    }
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // every connection to an in-memory database opens a fresh, empty one
        let max_connections = if database_url.starts_with(MEMORY_DATABASE_URL) {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_talk(&self, talk: &NewTalk) -> Result<StoredTalk> {
        let created_at = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO talks (name, description, speaker_name, speaker_bio, client_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&talk.name)
        .bind(&talk.description)
        .bind(&talk.speaker_name)
        .bind(&talk.speaker_bio)
        .bind(talk.client_id.map(|id| id.0.to_string()))
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert talk")?;

        Ok(StoredTalk {
            talk_id: TalkId(rec.get::<i64, _>(0)),
            name: talk.name.clone(),
            description: talk.description.clone(),
            speaker_name: talk.speaker_name.clone(),
            speaker_bio: talk.speaker_bio.clone(),
            client_id: talk.client_id,
            created_at,
        })
    }

    /// All talks in insertion order.
    pub async fn list_talks(&self) -> Result<Vec<StoredTalk>> {
        let rows = sqlx::query(
            "SELECT id, name, description, speaker_name, speaker_bio, client_id, created_at
             FROM talks
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list talks")?;
        rows.iter().map(stored_talk_from_row).collect()
    }

    pub async fn load_talk(&self, talk_id: TalkId) -> Result<Option<StoredTalk>> {
        let row = sqlx::query(
            "SELECT id, name, description, speaker_name, speaker_bio, client_id, created_at
             FROM talks
             WHERE id = ?",
        )
        .bind(talk_id.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load talk {talk_id}"))?;
        row.as_ref().map(stored_talk_from_row).transpose()
    }

    /// Returns whether a row was removed.
    pub async fn delete_talk(&self, talk_id: TalkId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM talks WHERE id = ?")
            .bind(talk_id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete talk {talk_id}"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn stored_talk_from_row(row: &SqliteRow) -> Result<StoredTalk> {
    let client_id = row
        .try_get::<Option<String>, _>("client_id")?
        .map(|raw| Uuid::parse_str(&raw).map(ClientId))
        .transpose()
        .context("talk row carries a malformed client_id")?;

    Ok(StoredTalk {
        talk_id: TalkId(row.try_get::<i64, _>("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        speaker_name: row.try_get("speaker_name")?,
        speaker_bio: row.try_get("speaker_bio")?,
        client_id,
        created_at: row.try_get("created_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with(MEMORY_DATABASE_URL) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
