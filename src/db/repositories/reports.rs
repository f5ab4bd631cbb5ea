use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{decode_location, parse_priority, parse_status},
};
use crate::events::{ReportEvent, ReportSubscription};
use crate::geo::Coordinate;
use crate::models::{Category, Report, ReportPriority, ReportStatus};
use crate::proximity::ReportSource;

const REPORT_COLUMNS: &str = "r.id, r.name, r.description, r.status, r.priority, r.location,
        r.owner_id, r.address, c.name AS category_name, c.color AS category_color
     FROM reports r
     LEFT JOIN categories c ON c.id = r.category_id";

/// Fields supplied when a report is filed.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub name: String,
    pub description: Option<String>,
    pub priority: ReportPriority,
    pub location: Option<Coordinate>,
    pub address: Option<String>,
    pub owner_id: String,
    pub category_id: Option<String>,
}

fn row_to_report(row: &Row) -> Result<Report> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let location: Option<String> = row.get("location")?;

    Ok(Report {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status: parse_status(&status)?,
        priority: parse_priority(&priority)?,
        location: decode_location(location.as_deref()),
        owner_id: row.get("owner_id")?,
        category_name: row.get("category_name")?,
        category_color: row.get("category_color")?,
        address: row.get("address")?,
    })
}

fn encode_location(location: Option<Coordinate>) -> Option<String> {
    location.map(|point| {
        json!({ "lat": point.latitude(), "lng": point.longitude() }).to_string()
    })
}

fn fetch_report(conn: &Connection, report_id: &str) -> Result<Option<Report>> {
    let sql = format!("SELECT {REPORT_COLUMNS} WHERE r.id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![report_id])?;
    match rows.next()? {
        Some(row) => row_to_report(row).map(Some),
        None => Ok(None),
    }
}

fn fetch_existing(conn: &Connection, report_id: &str) -> Result<Report> {
    fetch_report(conn, report_id)?.ok_or_else(|| anyhow!("report {report_id} not found"))
}

impl Database {
    pub async fn insert_category(&self, name: String, color: Option<String>) -> Result<Category> {
        self.execute(move |conn| {
            let category = Category {
                id: format!("cat_{}", Uuid::new_v4()),
                name,
                color,
            };
            conn.execute(
                "INSERT INTO categories (id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    category.id,
                    category.name,
                    category.color,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to insert category {}", category.name))?;
            Ok(category)
        })
        .await
    }

    /// File a new report and announce it to subscribers.
    pub async fn insert_report(&self, report: NewReport) -> Result<Report> {
        let stored = self
            .execute(move |conn| {
                let id = format!("rep_{}", Uuid::new_v4());
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "INSERT INTO reports (id, name, description, status, priority, location, address,
                                          owner_id, category_id, active, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
                    params![
                        id,
                        report.name,
                        report.description,
                        report.priority.as_str(),
                        encode_location(report.location),
                        report.address,
                        report.owner_id,
                        report.category_id,
                        now,
                    ],
                )
                .with_context(|| "failed to insert report")?;
                fetch_existing(conn, &id)
            })
            .await?;

        self.events().publish(ReportEvent::Created(stored.clone()));
        Ok(stored)
    }

    /// Change a report's priority. Subscribers see the previous priority so
    /// they can tell an escalation from a routine edit.
    pub async fn update_report_priority(
        &self,
        report_id: &str,
        priority: ReportPriority,
    ) -> Result<Report> {
        let report_id = report_id.to_string();
        let (previous, stored) = self
            .execute(move |conn| {
                let previous: Option<String> = conn
                    .query_row(
                        "SELECT priority FROM reports WHERE id = ?1",
                        params![report_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(previous) = previous else {
                    return Err(anyhow!("report {report_id} not found"));
                };

                conn.execute(
                    "UPDATE reports SET priority = ?1, updated_at = ?2 WHERE id = ?3",
                    params![priority.as_str(), Utc::now().to_rfc3339(), report_id],
                )
                .with_context(|| "failed to update report priority")?;

                // A row with a corrupt priority still gets its update through.
                Ok((parse_priority(&previous).ok(), fetch_existing(conn, &report_id)?))
            })
            .await?;

        self.events().publish(ReportEvent::Updated {
            previous_priority: previous,
            report: stored.clone(),
        });
        Ok(stored)
    }

    pub async fn set_report_status(&self, report_id: &str, status: ReportStatus) -> Result<Report> {
        let report_id = report_id.to_string();
        let stored = self
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE reports SET status = ?1, updated_at = ?2 WHERE id = ?3",
                        params![status.as_str(), Utc::now().to_rfc3339(), report_id],
                    )
                    .with_context(|| "failed to update report status")?;
                if changed == 0 {
                    return Err(anyhow!("report {report_id} not found"));
                }
                fetch_existing(conn, &report_id)
            })
            .await?;

        let previous_priority = Some(stored.priority);
        self.events().publish(ReportEvent::Updated {
            previous_priority,
            report: stored.clone(),
        });
        Ok(stored)
    }

    pub async fn soft_delete_report(&self, report_id: &str) -> Result<()> {
        let report_id = report_id.to_string();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE reports SET active = 0, deleted_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND deleted_at IS NULL",
                params![now, report_id],
            )
            .with_context(|| "failed to soft delete report")?;
            Ok(())
        })
        .await
    }

    pub async fn get_report(&self, report_id: &str) -> Result<Option<Report>> {
        let report_id = report_id.to_string();
        self.execute(move |conn| fetch_report(conn, &report_id)).await
    }

    /// Open, active and non-deleted reports filed by anyone but `exclude_owner`.
    /// Rows that fail to decode are logged and skipped so one bad record can't
    /// blind the whole scan.
    pub async fn list_open_reports(&self, exclude_owner: &str) -> Result<Vec<Report>> {
        let exclude_owner = exclude_owner.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {REPORT_COLUMNS}
                 WHERE r.status IN ('pending', 'in_progress')
                   AND r.active = 1
                   AND r.deleted_at IS NULL
                   AND r.owner_id <> ?1
                 ORDER BY r.created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![exclude_owner])?;

            let mut reports = Vec::new();
            while let Some(row) = rows.next()? {
                match row_to_report(row) {
                    Ok(report) => reports.push(report),
                    Err(err) => warn!("Skipping unreadable report row: {err:#}"),
                }
            }
            Ok(reports)
        })
        .await
    }
}

#[async_trait]
impl ReportSource for Database {
    async fn list_active_reports(&self, exclude_owner: &str) -> Result<Vec<Report>> {
        self.list_open_reports(exclude_owner).await
    }

    fn subscribe(&self) -> ReportSubscription {
        self.events().subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ReportEventBus;
    use tempfile::TempDir;

    fn open_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.db"), ReportEventBus::new()).unwrap();
        (dir, db)
    }

    fn new_report(owner: &str, location: Option<Coordinate>) -> NewReport {
        NewReport {
            name: "Flooded stairwell".into(),
            description: Some("Water on the east stairs".into()),
            priority: ReportPriority::Medium,
            location,
            address: Some("Engineering building".into()),
            owner_id: owner.into(),
            category_id: None,
        }
    }

    #[tokio::test]
    async fn inserted_report_round_trips_with_category() {
        let (_dir, db) = open_db();
        let category = db
            .insert_category("Infrastructure".into(), Some("#f59e0b".into()))
            .await
            .unwrap();

        let mut input = new_report("alice", Coordinate::new(19.3320, -99.1870));
        input.category_id = Some(category.id.clone());
        let stored = db.insert_report(input).await.unwrap();

        assert_eq!(stored.status, ReportStatus::Pending);
        assert_eq!(stored.category_name.as_deref(), Some("Infrastructure"));
        assert_eq!(stored.category_color.as_deref(), Some("#f59e0b"));
        let location = stored.location.unwrap();
        assert_eq!(location.latitude(), 19.3320);
        assert_eq!(location.longitude(), -99.1870);

        let fetched = db.get_report(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn active_listing_filters_owner_status_and_deleted_rows() {
        let (_dir, db) = open_db();
        let point = Coordinate::new(0.0, 0.0);

        let visible = db.insert_report(new_report("alice", point)).await.unwrap();
        let _own = db.insert_report(new_report("bob", point)).await.unwrap();
        let resolved = db.insert_report(new_report("alice", point)).await.unwrap();
        let deleted = db.insert_report(new_report("alice", point)).await.unwrap();
        let in_progress = db.insert_report(new_report("carol", point)).await.unwrap();

        db.set_report_status(&resolved.id, ReportStatus::Resolved)
            .await
            .unwrap();
        db.set_report_status(&in_progress.id, ReportStatus::InProgress)
            .await
            .unwrap();
        db.soft_delete_report(&deleted.id).await.unwrap();

        let mut ids: Vec<String> = db
            .list_active_reports("bob")
            .await
            .unwrap()
            .into_iter()
            .map(|report| report.id)
            .collect();
        ids.sort();
        let mut expected = vec![visible.id, in_progress.id];
        expected.sort();

        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn legacy_location_payloads_decode_or_become_none() {
        let (_dir, db) = open_db();
        let stringy = db.insert_report(new_report("alice", None)).await.unwrap();
        let garbage = db.insert_report(new_report("alice", None)).await.unwrap();

        let (stringy_id, garbage_id) = (stringy.id.clone(), garbage.id.clone());
        db.execute(move |conn| {
            conn.execute(
                "UPDATE reports SET location = ?1 WHERE id = ?2",
                params![r#"{"lat": "19.5", "lng": "-99.2"}"#, stringy_id],
            )?;
            conn.execute(
                "UPDATE reports SET location = ?1 WHERE id = ?2",
                params!["somewhere near the gym", garbage_id],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let stringy = db.get_report(&stringy.id).await.unwrap().unwrap();
        assert_eq!(stringy.location.unwrap().latitude(), 19.5);

        let garbage = db.get_report(&garbage.id).await.unwrap().unwrap();
        assert!(garbage.location.is_none());
    }

    #[tokio::test]
    async fn writes_are_published_on_the_bus() {
        let (_dir, db) = open_db();
        let mut subscription = ReportSource::subscribe(&db);

        let created = db
            .insert_report(new_report("alice", Coordinate::new(0.0, 0.0)))
            .await
            .unwrap();
        match subscription.recv().await.unwrap() {
            ReportEvent::Created(report) => assert_eq!(report.id, created.id),
            other => panic!("unexpected event {other:?}"),
        }

        db.update_report_priority(&created.id, ReportPriority::Urgent)
            .await
            .unwrap();
        let event = subscription.recv().await.unwrap();
        assert!(event.warrants_immediate_scan());
        match event {
            ReportEvent::Updated {
                previous_priority,
                report,
            } => {
                assert_eq!(previous_priority, Some(ReportPriority::Medium));
                assert_eq!(report.priority, ReportPriority::Urgent);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn updating_a_missing_report_fails() {
        let (_dir, db) = open_db();
        assert!(db
            .update_report_priority("rep_missing", ReportPriority::High)
            .await
            .is_err());
        assert!(db
            .set_report_status("rep_missing", ReportStatus::Resolved)
            .await
            .is_err());
    }
}
