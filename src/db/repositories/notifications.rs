use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Row};
use serde_json::Value;
use uuid::Uuid;

use crate::alerts::NotificationStore;
use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_i64},
};
use crate::models::NotificationRecord;

fn row_to_notification(row: &Row) -> Result<NotificationRecord> {
    let metadata: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;
    let read: i64 = row.get("read")?;

    Ok(NotificationRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        body: row.get("body")?,
        metadata: serde_json::from_str(&metadata)
            .with_context(|| "failed to parse notification metadata")?,
        read: read != 0,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_notification(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        metadata: Value,
    ) -> Result<NotificationRecord> {
        let record = NotificationRecord {
            id: format!("ntf_{}", Uuid::new_v4()),
            user_id: user_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            metadata,
            read: false,
            created_at: Utc::now(),
        };

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, title, body, metadata, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![
                    record.id,
                    record.user_id,
                    record.title,
                    record.body,
                    record.metadata.to_string(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert notification")?;
            Ok(record)
        })
        .await
    }

    /// Newest first.
    pub async fn list_notifications(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<NotificationRecord>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, body, metadata, read, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![user_id, to_i64(limit)?])?;

            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_notification(row)?);
            }
            Ok(records)
        })
        .await
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<bool> {
        let notification_id = notification_id.to_string();
        self.execute(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE notifications SET read = 1 WHERE id = ?1",
                    params![notification_id],
                )
                .with_context(|| "failed to mark notification read")?;
            Ok(changed > 0)
        })
        .await
    }
}

#[async_trait]
impl NotificationStore for Database {
    async fn insert(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        metadata: Value,
    ) -> Result<String> {
        let record = self.insert_notification(user_id, title, body, metadata).await?;
        Ok(record.id)
    }
}
