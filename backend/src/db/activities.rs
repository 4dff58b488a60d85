//! Append-only activity store and the SQLite audit recorder.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::filter::{self, ACTIVITIES};
use super::Repository;
use crate::errors::AppError;
use crate::events::{AuditEvent, AuditRecorder};
use crate::models::{Activity, ActivityFeed, ActivityKind, Page, PageParams};
use crate::policy::Predicate;

const ACTIVITY_COLUMNS: &str = "id, kind, ticket_id, ticket_title, user_id, user_name, action, details, target_user_id, target_user_name, old_value, new_value, timestamp";

/// Audit recorder writing to the `activities` table.
///
/// A failed insert is retried with doubling backoff before the failure is
/// surfaced as `Upstream`.
#[derive(Clone)]
pub struct SqliteAuditRecorder {
    pool: SqlitePool,
    max_attempts: usize,
    initial_backoff: Duration,
}

impl SqliteAuditRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(25),
        }
    }

    async fn insert(&self, event: &AuditEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO activities (id, organization_id, kind, ticket_id, ticket_title, user_id, user_name, action, details, target_user_id, target_user_name, old_value, new_value, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&event.organization_id)
        .bind(event.kind.as_str())
        .bind(&event.ticket_id)
        .bind(&event.ticket_title)
        .bind(&event.acting_user_id)
        .bind(&event.acting_user_name)
        .bind(event.kind.action())
        .bind(&event.detail)
        .bind(&event.target_user_id)
        .bind(&event.target_user_name)
        .bind(&event.old_value)
        .bind(&event.new_value)
        .bind(&event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditRecorder for SqliteAuditRecorder {
    async fn record(&self, event: &AuditEvent) -> Result<(), AppError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.insert(event).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    tracing::debug!(
                        attempt,
                        ticket_id = %event.ticket_id,
                        "Audit insert failed, retrying in {}ms: {}",
                        backoff.as_millis(),
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    return Err(AppError::Upstream(format!(
                        "Audit recorder failed after {} attempts: {}",
                        attempt, e
                    )))
                }
            }
        }
    }
}

impl Repository {
    // ==================== ACTIVITY OPERATIONS ====================

    /// History of one ticket, newest first.
    pub async fn activities_for_ticket(&self, ticket_id: &str) -> Result<Vec<Activity>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM activities WHERE ticket_id = ? ORDER BY seq DESC",
            ACTIVITY_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(activity_from_row).collect()
    }

    /// Activities a user performed or was targeted by, newest first.
    pub async fn activities_for_user(
        &self,
        user_id: &str,
        params: PageParams,
    ) -> Result<Page<Activity>, AppError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM activities WHERE user_id = ? OR target_user_id = ?",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM activities WHERE user_id = ? OR target_user_id = ? ORDER BY seq DESC LIMIT ? OFFSET ?",
            ACTIVITY_COLUMNS
        ))
        .bind(user_id)
        .bind(user_id)
        .bind(i64::from(params.limit))
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(activity_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, params))
    }

    /// Offset-paginated feed of activities visible under `predicate`.
    pub async fn activity_feed(
        &self,
        predicate: &Predicate,
        user_filter: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<ActivityFeed, AppError> {
        if predicate.is_nothing() {
            return Ok(ActivityFeed {
                activities: Vec::new(),
                total: 0,
                has_more: false,
            });
        }

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM activities WHERE 1 = 1");
        push_feed_filters(&mut count, predicate, user_filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM activities WHERE 1 = 1",
            ACTIVITY_COLUMNS
        ));
        push_feed_filters(&mut qb, predicate, user_filter);
        qb.push(" ORDER BY seq DESC LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(offset));

        let rows = qb.build().fetch_all(&self.pool).await?;
        let activities = rows.iter().map(activity_from_row).collect::<Result<Vec<_>, _>>()?;
        let has_more = i64::from(offset) + (activities.len() as i64) < total;

        Ok(ActivityFeed {
            activities,
            total,
            has_more,
        })
    }
}

fn push_feed_filters(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate, user_filter: Option<&str>) {
    filter::push_owned(qb, predicate, &ACTIVITIES);
    if let Some(user_id) = user_filter {
        qb.push(" AND (user_id = ");
        qb.push_bind(user_id.to_string());
        qb.push(" OR target_user_id = ");
        qb.push_bind(user_id.to_string());
        qb.push(")");
    }
}

fn activity_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Activity, AppError> {
    let kind_str: String = row.get("kind");
    let kind = ActivityKind::parse(&kind_str)
        .ok_or_else(|| AppError::Database(format!("Unknown activity kind: {}", kind_str)))?;

    Ok(Activity {
        id: row.get("id"),
        kind,
        ticket_id: row.get("ticket_id"),
        ticket_title: row.get("ticket_title"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        action: row.get("action"),
        details: row.get("details"),
        target_user_id: row.get("target_user_id"),
        target_user_name: row.get("target_user_name"),
        old_value: row.get("old_value"),
        new_value: row.get("new_value"),
        timestamp: row.get("timestamp"),
    })
}
