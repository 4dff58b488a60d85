//! Database repository for CRUD operations.
//!
//! Organizations and users live here; projects, tickets and activities have
//! their own `impl Repository` blocks in sibling modules.

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::filter::{self, ORGANIZATIONS, USERS};
use crate::errors::AppError;
use crate::identity::Role;
use crate::models::{
    NotificationPreferences, Organization, OrganizationStats, Page, PageParams, User,
    UserListQuery,
};
use crate::policy::Predicate;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== ORGANIZATION OPERATIONS ====================

    /// List organizations visible under `predicate`, ordered by name.
    pub async fn list_organizations(
        &self,
        predicate: &Predicate,
        params: PageParams,
    ) -> Result<Page<Organization>, AppError> {
        if predicate.is_nothing() {
            return Ok(Page::empty(params));
        }

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM organizations WHERE 1 = 1");
        filter::push_owned(&mut count, predicate, &ORGANIZATIONS);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, description, is_active, created_by, created_at, updated_at FROM organizations WHERE 1 = 1",
        );
        filter::push_owned(&mut qb, predicate, &ORGANIZATIONS);
        qb.push(" ORDER BY name LIMIT ");
        qb.push_bind(i64::from(params.limit));
        qb.push(" OFFSET ");
        qb.push_bind(params.offset());

        let rows = qb.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(organization_from_row).collect();
        Ok(Page::new(items, total, params))
    }

    /// Get an organization by ID.
    pub async fn get_organization(&self, id: &str) -> Result<Option<Organization>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, description, is_active, created_by, created_at, updated_at FROM organizations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(organization_from_row))
    }

    pub async fn insert_organization(&self, org: &Organization) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO organizations (id, name, description, is_active, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&org.id)
        .bind(&org.name)
        .bind(&org.description)
        .bind(org.is_active as i32)
        .bind(&org.created_by)
        .bind(&org.created_at)
        .bind(&org.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_organization(&self, org: &Organization) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE organizations SET name = ?, description = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&org.name)
        .bind(&org.description)
        .bind(org.is_active as i32)
        .bind(&org.updated_at)
        .bind(&org.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Organization {} not found", org.id)));
        }
        Ok(())
    }

    /// Delete an organization. Returns false when it did not exist.
    pub async fn delete_organization(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_users_in_organization(&self, id: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE organization_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn organization_stats(&self, id: &str) -> Result<OrganizationStats, AppError> {
        let users = self.count_users_in_organization(id).await?;
        let projects: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE organization_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(OrganizationStats { users, projects })
    }

    // ==================== USER OPERATIONS ====================

    /// List users visible under `predicate` with the query's filters applied.
    pub async fn list_users(
        &self,
        predicate: &Predicate,
        query: &UserListQuery,
    ) -> Result<Page<User>, AppError> {
        let params = query.page_params();
        if predicate.is_nothing() {
            return Ok(Page::empty(params));
        }

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users WHERE 1 = 1");
        push_user_filters(&mut count, predicate, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM users WHERE 1 = 1", USER_COLUMNS));
        push_user_filters(&mut qb, predicate, query);
        qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ");
        qb.push_bind(i64::from(params.limit));
        qb.push(" OFFSET ");
        qb.push_bind(params.offset());

        let rows = qb.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(user_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, params))
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Look up a user by normalized email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Insert a user. A duplicate email surfaces as `Conflict`.
    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let prefs = serde_json::to_string(&user.notification_preferences)?;
        let result = sqlx::query(
            "INSERT INTO users (id, name, email, role, organization_id, is_active, created_by, notification_preferences, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.organization_id)
        .bind(user.is_active as i32)
        .bind(&user.created_by)
        .bind(&prefs)
        .bind(&user.created_at)
        .bind(&user.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match AppError::from(e) {
                AppError::Conflict(_) => Err(AppError::Conflict(format!(
                    "User with email {} already exists",
                    user.email
                ))),
                other => Err(other),
            },
        }
    }

    pub async fn update_user(&self, user: &User) -> Result<(), AppError> {
        let prefs = serde_json::to_string(&user.notification_preferences)?;
        let result = sqlx::query(
            "UPDATE users SET name = ?, role = ?, organization_id = ?, is_active = ?, notification_preferences = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(&user.organization_id)
        .bind(user.is_active as i32)
        .bind(&prefs)
        .bind(&user.updated_at)
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        }
        Ok(())
    }

    /// Delete a user. Returns false when it did not exist.
    pub async fn delete_user(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Project rosters the user sits on and tickets currently assigned to them.
    pub async fn user_commitments(&self, user_id: &str) -> Result<(i64, i64), AppError> {
        let rosters: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM project_members WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        let tickets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE assigned_to_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok((rosters, tickets))
    }
}

const USER_COLUMNS: &str = "id, name, email, role, organization_id, is_active, created_by, notification_preferences, created_at, updated_at";

fn push_user_filters(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate, query: &UserListQuery) {
    filter::push_owned(qb, predicate, &USERS);
    if let Some(role) = query.role {
        qb.push(" AND role = ");
        qb.push_bind(role.as_str());
    }
    if let Some(active) = query.is_active {
        qb.push(" AND is_active = ");
        qb.push_bind(active as i32);
    }
    if let Some(term) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        filter::push_search(qb, &["name", "email"], term);
    }
}

fn organization_from_row(row: &sqlx::sqlite::SqliteRow) -> Organization {
    let is_active: i32 = row.get("is_active");

    Organization {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        is_active: is_active != 0,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, AppError> {
    let role_str: String = row.get("role");
    let is_active: i32 = row.get("is_active");
    let prefs_str: Option<String> = row.get("notification_preferences");

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: parse_role(&role_str)?,
        organization_id: row.get("organization_id"),
        is_active: is_active != 0,
        created_by: row.get("created_by"),
        notification_preferences: prefs_str
            .and_then(|s| serde_json::from_str::<NotificationPreferences>(&s).ok())
            .unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub(super) fn parse_role(s: &str) -> Result<Role, AppError> {
    Role::parse(s).ok_or_else(|| AppError::Database(format!("Unknown role in store: {}", s)))
}

pub(super) fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
