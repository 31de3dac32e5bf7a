use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::application::ports::document_store::DocumentStore;
use crate::domain::documents::{DocumentKind, NoteData, NoteRecord, ViewRecord};
use crate::infrastructure::db::PgPool;

#[derive(Clone)]
pub struct SqlxDocumentStore {
    pool: PgPool,
}

impl SqlxDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for SqlxDocumentStore {
    async fn find_view(&self, view_id: &str) -> anyhow::Result<Option<ViewRecord>> {
        let Ok(id) = Uuid::parse_str(view_id) else {
            return Ok(None);
        };
        let row = sqlx::query(
            "SELECT id, kind, data, yjs_state, is_public, updated_at FROM views WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let kind: String = row.get("kind");
        let kind = DocumentKind::parse(&kind)
            .ok_or_else(|| anyhow::anyhow!("unknown view kind {kind:?}"))?;
        Ok(Some(ViewRecord {
            id: row.get("id"),
            kind,
            data: row.get("data"),
            yjs_state: row.get("yjs_state"),
            is_public: row.get("is_public"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn update_view_data(&self, view_id: &str, data: &str) -> anyhow::Result<()> {
        let id = Uuid::parse_str(view_id)?;
        sqlx::query("UPDATE views SET data = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_view_yjs_state(&self, view_id: &str, state: &[u8]) -> anyhow::Result<()> {
        let id = Uuid::parse_str(view_id)?;
        sqlx::query("UPDATE views SET yjs_state = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_note(&self, note_id: &str) -> anyhow::Result<Option<NoteRecord>> {
        let Ok(id) = Uuid::parse_str(note_id) else {
            return Ok(None);
        };
        let row = sqlx::query(
            "SELECT id, title, content, updated_by, updated_at FROM notes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| NoteRecord {
            id: row.get("id"),
            title: row.get("title"),
            content: row.get("content"),
            updated_by: row.get("updated_by"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn update_note_fields(&self, note_id: &str, data: &NoteData) -> anyhow::Result<()> {
        let id = Uuid::parse_str(note_id)?;
        let updated_at = DateTime::parse_from_rfc3339(&data.updated_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let updated_by = if data.updated_by.is_empty() {
            None
        } else {
            Some(data.updated_by.as_str())
        };
        sqlx::query(
            "UPDATE notes SET title = $2, content = $3, updated_by = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(&data.title)
        .bind(&data.content)
        .bind(updated_by)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
