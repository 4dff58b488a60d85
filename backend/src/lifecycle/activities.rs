//! Read side of the audit trail.

use crate::db::Repository;
use crate::errors::AppError;
use crate::identity::IdentityContext;
use crate::models::{ActivityFeed, ActivityQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::policy::{authorize, resolve_scope, Action, Predicate, ResourceKind, TicketScopeMode};

#[derive(Clone)]
pub struct ActivityService {
    repo: Repository,
}

impl ActivityService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Newest-first feed. Developers see what they did or were targeted by,
    /// everyone else their organization, the platform role everything.
    pub async fn feed(
        &self,
        identity: &IdentityContext,
        query: &ActivityQuery,
    ) -> Result<ActivityFeed, AppError> {
        authorize(identity, ResourceKind::Activity, Action::Read)?;
        let scope = resolve_scope(
            identity,
            ResourceKind::Activity,
            None,
            TicketScopeMode::Organization,
        );

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);

        self.repo
            .activity_feed(
                &Predicate::for_owned(&scope),
                query.user_id.as_deref(),
                limit,
                offset,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database, SqliteAuditRecorder};
    use crate::events::{AuditEvent, AuditRecorder};
    use crate::identity::Role;
    use crate::lifecycle::tests_support::{ticket, user};
    use crate::models::ActivityKind;
    use tempfile::TempDir;

    async fn seeded() -> (TempDir, ActivityService) {
        let dir = TempDir::new().expect("tempdir");
        let pool = init_database(&dir.path().join("test.db"))
            .await
            .expect("database");
        let recorder = SqliteAuditRecorder::new(pool.clone());

        let qa = user("qa1", Role::Qa, "acme").identity();
        let dev = user("dev1", Role::Developer, "acme").identity();
        let other = user("qa9", Role::Qa, "other").identity();
        let t1 = ticket("t1", "p1");
        let t2 = ticket("t2", "p9");

        let events = [
            AuditEvent::new(ActivityKind::TicketCreated, &t1, Some("acme"), &qa, "Created"),
            AuditEvent::new(ActivityKind::TicketAssigned, &t1, Some("acme"), &qa, "Assigned")
                .with_target("dev1", "User dev1"),
            AuditEvent::new(ActivityKind::StatusChanged, &t1, Some("acme"), &dev, "Status")
                .with_values("assigned", "awaiting"),
            AuditEvent::new(ActivityKind::TicketCreated, &t2, Some("other"), &other, "Created"),
        ];
        for event in &events {
            recorder.record(event).await.expect("record");
        }

        (dir, ActivityService::new(Repository::new(pool)))
    }

    #[tokio::test]
    async fn test_feed_is_scoped_to_organization() {
        let (_dir, service) = seeded().await;
        let qa = user("qa1", Role::Qa, "acme").identity();

        let feed = service.feed(&qa, &ActivityQuery::default()).await.unwrap();
        assert_eq!(feed.total, 3);
        assert!(!feed.has_more);
        assert_eq!(feed.activities[0].kind, ActivityKind::StatusChanged);
    }

    #[tokio::test]
    async fn test_developer_feed_is_personal() {
        let (_dir, service) = seeded().await;
        let dev = user("dev1", Role::Developer, "acme").identity();

        let feed = service.feed(&dev, &ActivityQuery::default()).await.unwrap();
        assert_eq!(feed.total, 2);
        assert!(feed
            .activities
            .iter()
            .all(|a| a.user_id == "dev1" || a.target_user_id.as_deref() == Some("dev1")));
    }

    #[tokio::test]
    async fn test_platform_feed_pages_with_offset() {
        let (_dir, service) = seeded().await;
        let root = user("root", Role::Superadmin, "").identity();

        let query = ActivityQuery {
            limit: Some(2),
            offset: Some(1),
            user_id: None,
        };
        let feed = service.feed(&root, &query).await.unwrap();
        assert_eq!(feed.total, 4);
        assert_eq!(feed.activities.len(), 2);
        assert!(feed.has_more);
    }
}
