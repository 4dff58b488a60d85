//! Translation of scope predicates into SQL `WHERE` fragments.
//!
//! Every list query starts from `WHERE 1 = 1` and appends ` AND ...` clauses,
//! so the same builder can be applied to both the count and the page query.

use sqlx::{QueryBuilder, Sqlite};

use crate::policy::Predicate;

/// Columns used when applying a predicate to a table that carries its own
/// organization reference.
pub(crate) struct OwnedColumns {
    pub organization: &'static str,
    /// Columns compared against the user for `InvolvingUser`.
    pub involvement: &'static [&'static str],
}

pub(crate) const ORGANIZATIONS: OwnedColumns = OwnedColumns {
    organization: "id",
    involvement: &[],
};

pub(crate) const USERS: OwnedColumns = OwnedColumns {
    organization: "organization_id",
    involvement: &["id"],
};

pub(crate) const PROJECTS: OwnedColumns = OwnedColumns {
    organization: "organization_id",
    involvement: &[],
};

pub(crate) const ACTIVITIES: OwnedColumns = OwnedColumns {
    organization: "organization_id",
    involvement: &["user_id", "target_user_id"],
};

/// Append the clause for a record-owned predicate.
pub(crate) fn push_owned(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate, cols: &OwnedColumns) {
    match predicate {
        Predicate::Everything => {}
        Predicate::OrganizationIs(org) => {
            qb.push(format!(" AND {} = ", cols.organization));
            qb.push_bind(org.clone());
        }
        Predicate::InvolvingUser {
            organization_id,
            user_id,
        } if !cols.involvement.is_empty() => {
            qb.push(format!(" AND {} = ", cols.organization));
            qb.push_bind(organization_id.clone());
            push_involvement(qb, cols.involvement, user_id);
        }
        // Ticket-shaped predicates never apply to owned records.
        _ => {
            qb.push(" AND 0");
        }
    }
}

/// Append the clause for a ticket predicate.
pub(crate) fn push_tickets(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate) {
    match predicate {
        Predicate::Everything => {}
        Predicate::Nothing => {
            qb.push(" AND 0");
        }
        Predicate::OrganizationIs(org) => {
            qb.push(" AND project_id IN (SELECT id FROM projects WHERE organization_id = ");
            qb.push_bind(org.clone());
            qb.push(")");
        }
        Predicate::ProjectIn(project_ids) => push_project_in(qb, project_ids),
        Predicate::ProjectInInvolving {
            project_ids,
            user_id,
        } => {
            push_project_in(qb, project_ids);
            push_involvement(qb, &["author_id", "assigned_to_id"], user_id);
        }
        Predicate::InvolvingUser {
            organization_id,
            user_id,
        } => {
            qb.push(" AND project_id IN (SELECT id FROM projects WHERE organization_id = ");
            qb.push_bind(organization_id.clone());
            qb.push(")");
            push_involvement(qb, &["author_id", "assigned_to_id"], user_id);
        }
    }
}

fn push_project_in(qb: &mut QueryBuilder<'_, Sqlite>, project_ids: &[String]) {
    if project_ids.is_empty() {
        qb.push(" AND 0");
        return;
    }
    qb.push(" AND project_id IN (");
    let mut separated = qb.separated(", ");
    for id in project_ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
}

fn push_involvement(qb: &mut QueryBuilder<'_, Sqlite>, columns: &[&str], user_id: &str) {
    qb.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(format!("{} = ", column));
        qb.push_bind(user_id.to_string());
    }
    qb.push(")");
}

/// Append a `LIKE` match over several columns.
pub(crate) fn push_search(qb: &mut QueryBuilder<'_, Sqlite>, columns: &[&str], term: &str) {
    let pattern = format!("%{}%", term.trim());
    qb.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(format!("{} LIKE ", column));
        qb.push_bind(pattern.clone());
    }
    qb.push(")");
}
