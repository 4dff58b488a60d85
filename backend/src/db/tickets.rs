//! Ticket and comment persistence.

use sqlx::{QueryBuilder, Row, Sqlite};

use super::filter;
use super::repository::parse_json_array;
use super::Repository;
use crate::errors::AppError;
use crate::models::{Comment, Page, Priority, Ticket, TicketListQuery, TicketStatus};
use crate::policy::Predicate;

const TICKET_COLUMNS: &str = "id, title, description, status, priority, project_id, project_name, author_id, author_name, assigned_to_id, assigned_to_name, labels, deadline, created_at, updated_at, version";

impl Repository {
    // ==================== TICKET OPERATIONS ====================

    /// List tickets visible under `predicate`, newest first.
    pub async fn list_tickets(
        &self,
        predicate: &Predicate,
        query: &TicketListQuery,
    ) -> Result<Page<Ticket>, AppError> {
        let params = query.page_params();
        if predicate.is_nothing() {
            return Ok(Page::empty(params));
        }

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tickets WHERE 1 = 1");
        push_ticket_filters(&mut count, predicate, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM tickets WHERE 1 = 1", TICKET_COLUMNS));
        push_ticket_filters(&mut qb, predicate, query);
        qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ");
        qb.push_bind(i64::from(params.limit));
        qb.push(" OFFSET ");
        qb.push_bind(params.offset());

        let rows = qb.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(ticket_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, params))
    }

    /// Load the listed tickets that also satisfy `predicate`, preserving the
    /// order of `ids`.
    pub async fn tickets_by_ids(
        &self,
        ids: &[String],
        predicate: &Predicate,
    ) -> Result<Vec<Ticket>, AppError> {
        if ids.is_empty() || predicate.is_nothing() {
            return Ok(Vec::new());
        }

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM tickets WHERE id IN (", TICKET_COLUMNS));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");
        filter::push_tickets(&mut qb, predicate);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut tickets = rows.iter().map(ticket_from_row).collect::<Result<Vec<_>, _>>()?;
        tickets.sort_by_key(|t| ids.iter().position(|id| *id == t.id));
        Ok(tickets)
    }

    /// Every ticket, used to rebuild the search index.
    pub async fn all_tickets(&self) -> Result<Vec<Ticket>, AppError> {
        let rows = sqlx::query(&format!("SELECT {} FROM tickets ORDER BY created_at", TICKET_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(ticket_from_row).collect()
    }

    /// Get a ticket by ID.
    pub async fn get_ticket(&self, id: &str) -> Result<Option<Ticket>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(ticket_from_row).transpose()
    }

    pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), AppError> {
        let labels_json = serde_json::to_string(&ticket.labels)?;
        sqlx::query(
            "INSERT INTO tickets (id, title, description, status, priority, project_id, project_name, author_id, author_name, assigned_to_id, assigned_to_name, labels, deadline, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ticket.id)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(ticket.status.as_str())
        .bind(ticket.priority.as_str())
        .bind(&ticket.project_id)
        .bind(&ticket.project_name)
        .bind(&ticket.author_id)
        .bind(&ticket.author_name)
        .bind(&ticket.assigned_to_id)
        .bind(&ticket.assigned_to_name)
        .bind(&labels_json)
        .bind(&ticket.deadline)
        .bind(&ticket.created_at)
        .bind(&ticket.updated_at)
        .bind(ticket.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Write every mutable field of `ticket` and bump its version.
    ///
    /// With `expected_version` the write is conditional and a stale version
    /// fails with `VersionMismatch`; without it the last writer wins.
    /// Returns the stored version.
    pub async fn update_ticket(
        &self,
        ticket: &Ticket,
        expected_version: Option<i64>,
    ) -> Result<i64, AppError> {
        let labels_json = serde_json::to_string(&ticket.labels)?;

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE tickets SET title = ");
        qb.push_bind(ticket.title.clone());
        qb.push(", description = ");
        qb.push_bind(ticket.description.clone());
        qb.push(", status = ");
        qb.push_bind(ticket.status.as_str());
        qb.push(", priority = ");
        qb.push_bind(ticket.priority.as_str());
        qb.push(", assigned_to_id = ");
        qb.push_bind(ticket.assigned_to_id.clone());
        qb.push(", assigned_to_name = ");
        qb.push_bind(ticket.assigned_to_name.clone());
        qb.push(", labels = ");
        qb.push_bind(labels_json);
        qb.push(", deadline = ");
        qb.push_bind(ticket.deadline.clone());
        qb.push(", updated_at = ");
        qb.push_bind(ticket.updated_at.clone());
        qb.push(", version = version + 1 WHERE id = ");
        qb.push_bind(ticket.id.clone());
        if let Some(expected) = expected_version {
            qb.push(" AND version = ");
            qb.push_bind(expected);
        }
        qb.push(" RETURNING version");

        let stored: Option<i64> = qb
            .build_query_scalar::<i64>()
            .fetch_optional(&self.pool)
            .await?;

        match stored {
            Some(version) => Ok(version),
            None => {
                // Either deleted concurrently or the version moved on.
                let current = self.get_ticket(&ticket.id).await?;
                match (current, expected_version) {
                    (Some(current), Some(expected)) => Err(AppError::VersionMismatch {
                        message: format!(
                            "Version mismatch: expected {}, current {}",
                            expected, current.version
                        ),
                        current_version: current.version,
                    }),
                    _ => Err(AppError::NotFound(format!("Ticket {} not found", ticket.id))),
                }
            }
        }
    }

    /// Hard delete. Activities and comments are left in place.
    pub async fn delete_ticket(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== COMMENT OPERATIONS ====================

    /// Comments on a ticket, oldest first.
    pub async fn list_comments(&self, ticket_id: &str) -> Result<Vec<Comment>, AppError> {
        let rows = sqlx::query(
            "SELECT id, ticket_id, author_id, author_name, content, created_at FROM comments WHERE ticket_id = ? ORDER BY created_at, rowid",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(comment_from_row).collect())
    }

    pub async fn get_comment(&self, id: &str) -> Result<Option<Comment>, AppError> {
        let row = sqlx::query(
            "SELECT id, ticket_id, author_id, author_name, content, created_at FROM comments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    pub async fn insert_comment(&self, comment: &Comment) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO comments (id, ticket_id, author_id, author_name, content, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.ticket_id)
        .bind(&comment.author_id)
        .bind(&comment.author_name)
        .bind(&comment.content)
        .bind(&comment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_comment(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn push_ticket_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    predicate: &Predicate,
    query: &TicketListQuery,
) {
    filter::push_tickets(qb, predicate);
    if let Some(status) = query.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(priority) = query.priority {
        qb.push(" AND priority = ");
        qb.push_bind(priority.as_str());
    }
    if let Some(project_id) = &query.project_id {
        qb.push(" AND project_id = ");
        qb.push_bind(project_id.clone());
    }
    if let Some(assignee) = &query.assigned_to_id {
        qb.push(" AND assigned_to_id = ");
        qb.push_bind(assignee.clone());
    }
}

fn ticket_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket, AppError> {
    let status_str: String = row.get("status");
    let priority_str: String = row.get("priority");
    let labels_str: String = row.get("labels");

    let status = TicketStatus::parse(&status_str)
        .ok_or_else(|| AppError::Database(format!("Unknown ticket status: {}", status_str)))?;
    let priority = Priority::parse(&priority_str)
        .ok_or_else(|| AppError::Database(format!("Unknown ticket priority: {}", priority_str)))?;

    Ok(Ticket {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status,
        priority,
        project_id: row.get("project_id"),
        project_name: row.get("project_name"),
        author_id: row.get("author_id"),
        author_name: row.get("author_name"),
        assigned_to_id: row.get("assigned_to_id"),
        assigned_to_name: row.get("assigned_to_name"),
        labels: parse_json_array(&labels_str),
        deadline: row.get("deadline"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}

fn comment_from_row(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        ticket_id: row.get("ticket_id"),
        author_id: row.get("author_id"),
        author_name: row.get("author_name"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}
