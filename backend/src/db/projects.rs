//! Project and team roster persistence.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Row, Sqlite};

use super::filter::{self, PROJECTS};
use super::repository::parse_role;
use super::Repository;
use crate::errors::AppError;
use crate::models::{Page, Project, ProjectListQuery, ProjectMember, ProjectStatus};
use crate::policy::Predicate;

const PROJECT_COLUMNS: &str = "id, name, description, status, organization_id, created_by, start_date, end_date, created_at, updated_at";

impl Repository {
    // ==================== PROJECT OPERATIONS ====================

    /// List projects visible under `predicate`, newest first.
    pub async fn list_projects(
        &self,
        predicate: &Predicate,
        query: &ProjectListQuery,
    ) -> Result<Page<Project>, AppError> {
        let params = query.page_params();
        if predicate.is_nothing() {
            return Ok(Page::empty(params));
        }

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM projects WHERE 1 = 1");
        push_project_filters(&mut count, predicate, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM projects WHERE 1 = 1", PROJECT_COLUMNS));
        push_project_filters(&mut qb, predicate, query);
        qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ");
        qb.push_bind(i64::from(params.limit));
        qb.push(" OFFSET ");
        qb.push_bind(params.offset());

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut items = rows
            .iter()
            .map(project_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<String> = items.iter().map(|p| p.id.clone()).collect();
        let mut rosters = self.members_for_projects(&ids).await?;
        for project in &mut items {
            project.team_members = rosters.remove(&project.id).unwrap_or_default();
        }

        Ok(Page::new(items, total, params))
    }

    /// Get a project by ID, including its team roster.
    pub async fn get_project(&self, id: &str) -> Result<Option<Project>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut project = project_from_row(&row)?;
        project.team_members = self
            .members_for_projects(&[project.id.clone()])
            .await?
            .remove(&project.id)
            .unwrap_or_default();
        Ok(Some(project))
    }

    /// Organization owning a project, without loading the roster.
    pub async fn project_organization(&self, project_id: &str) -> Result<Option<String>, AppError> {
        let org = sqlx::query_scalar("SELECT organization_id FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(org)
    }

    /// IDs of every project owned by an organization.
    pub async fn project_ids_for_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar("SELECT id FROM projects WHERE organization_id = ?")
            .bind(organization_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Insert a project together with its initial roster.
    pub async fn insert_project(&self, project: &Project) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO projects (id, name, description, status, organization_id, created_by, start_date, end_date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(&project.organization_id)
        .bind(&project.created_by)
        .bind(&project.start_date)
        .bind(&project.end_date)
        .bind(&project.created_at)
        .bind(&project.updated_at)
        .execute(&self.pool)
        .await?;

        for (position, member) in project.team_members.iter().enumerate() {
            self.insert_member(&project.id, member, position as i64).await?;
        }
        Ok(())
    }

    /// Update scalar project fields. The roster and organization are untouched.
    pub async fn update_project(&self, project: &Project) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE projects SET name = ?, description = ?, status = ?, start_date = ?, end_date = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(&project.start_date)
        .bind(&project.end_date)
        .bind(&project.updated_at)
        .bind(&project.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Project {} not found", project.id)));
        }
        Ok(())
    }

    /// Delete a project and its roster. Returns false when it did not exist.
    pub async fn delete_project(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM project_members WHERE project_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Append a member to the end of a project's roster.
    pub async fn add_project_member(
        &self,
        project_id: &str,
        member: &ProjectMember,
    ) -> Result<(), AppError> {
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM project_members WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        self.insert_member(project_id, member, next).await?;
        self.touch_project(project_id, &member.assigned_at).await
    }

    /// Remove a member. Returns false when the user was not on the roster.
    pub async fn remove_project_member(
        &self,
        project_id: &str,
        user_id: &str,
        now: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
            .bind(project_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }
        self.touch_project(project_id, now).await?;
        Ok(true)
    }

    async fn insert_member(
        &self,
        project_id: &str,
        member: &ProjectMember,
        position: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO project_members (project_id, user_id, user_name, role, assigned_at, position) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(&member.user_id)
        .bind(&member.user_name)
        .bind(member.role.as_str())
        .bind(&member.assigned_at)
        .bind(position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_project(&self, project_id: &str, now: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn members_for_projects(
        &self,
        project_ids: &[String],
    ) -> Result<HashMap<String, Vec<ProjectMember>>, AppError> {
        let mut rosters: HashMap<String, Vec<ProjectMember>> = HashMap::new();
        if project_ids.is_empty() {
            return Ok(rosters);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT project_id, user_id, user_name, role, assigned_at FROM project_members WHERE project_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in project_ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(") ORDER BY project_id, position");

        for row in qb.build().fetch_all(&self.pool).await? {
            let role_str: String = row.get("role");
            let project_id: String = row.get("project_id");
            rosters.entry(project_id).or_default().push(ProjectMember {
                user_id: row.get("user_id"),
                user_name: row.get("user_name"),
                role: parse_role(&role_str)?,
                assigned_at: row.get("assigned_at"),
            });
        }
        Ok(rosters)
    }
}

fn push_project_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    predicate: &Predicate,
    query: &ProjectListQuery,
) {
    filter::push_owned(qb, predicate, &PROJECTS);
    if let Some(status) = query.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(term) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        filter::push_search(qb, &["name", "description"], term);
    }
}

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Project, AppError> {
    let status_str: String = row.get("status");
    let status = ProjectStatus::parse(&status_str)
        .ok_or_else(|| AppError::Database(format!("Unknown project status: {}", status_str)))?;

    Ok(Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        status,
        organization_id: row.get("organization_id"),
        created_by: row.get("created_by"),
        team_members: Vec::new(),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
