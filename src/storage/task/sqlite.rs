use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{info, warn};

use super::{TaskPatch, TaskStorage};
use crate::pipeline::types::{Task, TaskStatus};
use crate::storage::task::entity::Model as TaskModel;
use crate::web::Pagination;

pub struct SqliteTaskStorage {
    pool: SqlitePool,
}

impl SqliteTaskStorage {
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Initializing SQLite task storage at {}", database_url);
        let pool = sqlx::SqlitePool::connect(database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                object_key TEXT NOT NULL UNIQUE,
                region TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL DEFAULT 0,
                last_modified TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                provider_task_id TEXT NOT NULL DEFAULT '',
                result_payload TEXT NOT NULL DEFAULT '{}',
                chapters TEXT NOT NULL DEFAULT '{}',
                summary TEXT NOT NULL DEFAULT '{}',
                transcript TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    fn row_to_task(&self, row: SqliteRow) -> Result<Task> {
        let model = TaskModel {
            id: row.get("id"),
            object_key: row.get("object_key"),
            region: row.get("region"),
            size: row.get("size"),
            last_modified: row.get("last_modified"),
            status: row.get("status"),
            provider_task_id: row.get("provider_task_id"),
            result_payload: row.get("result_payload"),
            chapters: row.get("chapters"),
            summary: row.get("summary"),
            transcript: row.get("transcript"),
            created_at: DateTime::parse_from_rfc3339(row.get("created_at"))?.with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(row.get("updated_at"))?.with_timezone(&Utc),
        };
        Task::try_from(model)
    }

    fn rows_to_tasks(&self, rows: Vec<SqliteRow>) -> Result<Vec<Task>> {
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(self.row_to_task(row)?);
        }
        Ok(tasks)
    }
}

#[async_trait]
impl TaskStorage for SqliteTaskStorage {
    async fn upsert(&self, task: &Task) -> Result<()> {
        let model = TaskModel::try_from(task)?;

        sqlx::query(
            r#"
            INSERT INTO tasks
            (id, object_key, region, size, last_modified, status, provider_task_id,
             result_payload, chapters, summary, transcript, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(object_key) DO UPDATE SET
                region = excluded.region,
                size = excluded.size,
                last_modified = excluded.last_modified,
                status = excluded.status,
                provider_task_id = excluded.provider_task_id,
                result_payload = excluded.result_payload,
                chapters = excluded.chapters,
                summary = excluded.summary,
                transcript = excluded.transcript,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&model.id)
        .bind(&model.object_key)
        .bind(&model.region)
        .bind(model.size)
        .bind(&model.last_modified)
        .bind(&model.status)
        .bind(&model.provider_task_id)
        .bind(&model.result_payload)
        .bind(&model.chapters)
        .bind(&model.summary)
        .bind(&model.transcript)
        .bind(model.created_at.to_rfc3339())
        .bind(model.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(self.row_to_task(row)?),
            None => None,
        })
    }

    async fn get_by_key(&self, object_key: &str) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE object_key = ?")
            .bind(object_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(self.row_to_task(row)?),
            None => None,
        })
    }

    async fn list(&self, pagination: &Pagination) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        self.rows_to_tasks(rows)
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE status = ? ORDER BY created_at ASC")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        self.rows_to_tasks(rows)
    }

    async fn apply(&self, id: &str, patch: &TaskPatch) -> Result<()> {
        // Single UPDATE so a concurrent reader never sees a half-applied patch.
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE tasks SET updated_at = ");
        qb.push_bind(Utc::now().to_rfc3339());

        if let Some(status) = patch.status {
            qb.push(", status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(provider_task_id) = &patch.provider_task_id {
            qb.push(", provider_task_id = ");
            qb.push_bind(provider_task_id.clone());
        }
        if let Some(size) = patch.size {
            qb.push(", size = ");
            qb.push_bind(size);
        }
        if let Some(last_modified) = &patch.last_modified {
            qb.push(", last_modified = ");
            qb.push_bind(last_modified.clone());
        }
        if let Some(result_payload) = &patch.result_payload {
            qb.push(", result_payload = ");
            qb.push_bind(serde_json::to_string(result_payload)?);
        }
        if let Some(chapters) = &patch.chapters {
            qb.push(", chapters = ");
            qb.push_bind(serde_json::to_string(chapters)?);
        }
        if let Some(summary) = &patch.summary {
            qb.push(", summary = ");
            qb.push_bind(serde_json::to_string(summary)?);
        }
        if let Some(transcript) = &patch.transcript {
            qb.push(", transcript = ");
            qb.push_bind(serde_json::to_string(transcript)?);
        }

        qb.push(" WHERE id = ");
        qb.push_bind(id.to_string());

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            warn!("apply on missing task id {}", id);
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
