//! Integration tests for the ticket backend.

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::auth::issue_token;
use crate::config::Config;
use crate::db::init_database;
use crate::identity::RoleVariant;
use crate::policy::TicketScopeMode;
use crate::search::SearchIndex;
use crate::{create_router, AppState};

const SECRET: &str = "integration-test-secret";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    root_token: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_scope(TicketScopeMode::Organization).await
    }

    async fn with_scope(ticket_scope: TicketScopeMode) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let index_path = temp_dir.path().join("index");

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let search = SearchIndex::open(&index_path).expect("Failed to init search");

        let config = Config {
            db_path,
            index_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            jwt_secret: SECRET.to_string(),
            role_variant: RoleVariant::Admin,
            ticket_scope,
            superadmin_email: Some("root@example.com".to_string()),
            superadmin_name: "Root".to_string(),
        };

        let state = AppState::new(config, pool, search);
        let root = state
            .users
            .ensure_superadmin("root@example.com", "Root")
            .await
            .expect("Failed to bootstrap superadmin");

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            root_token: token_for(&root.id),
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, method: Method, token: &str, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().await.unwrap();
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap();
        (status, body)
    }

    async fn get(&self, token: &str, path: &str) -> (u16, Value) {
        self.send(Method::GET, token, path, None).await
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (u16, Value) {
        self.send(Method::POST, token, path, Some(body)).await
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> (u16, Value) {
        self.send(Method::PUT, token, path, Some(body)).await
    }

    async fn patch(&self, token: &str, path: &str, body: Value) -> (u16, Value) {
        self.send(Method::PATCH, token, path, Some(body)).await
    }

    async fn delete(&self, token: &str, path: &str) -> (u16, Value) {
        self.send(Method::DELETE, token, path, None).await
    }
}

fn token_for(user_id: &str) -> String {
    issue_token(user_id, SECRET, 3600).unwrap()
}

fn data_id(body: &Value) -> String {
    body["data"]["id"].as_str().unwrap().to_string()
}

fn kinds(history: &Value) -> Vec<String> {
    history["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["kind"].as_str().unwrap().to_string())
        .collect()
}

/// Two tenants: Acme with P1 = [dev1 (qa), dev2 (developer)], and Other with
/// a single developer.
struct World {
    acme_id: String,
    admin: String,
    dev1: String,
    dev2: String,
    other_id: String,
    other_admin: String,
    outsider: String,
    p1: String,
}

impl World {
    async fn build(f: &TestFixture) -> Self {
        let (status, acme) = f
            .post(
                &f.root_token,
                "/api/organizations/with-admin",
                json!({
                    "name": "Acme",
                    "adminUser": { "name": "Acme Admin", "email": "admin@acme.test" }
                }),
            )
            .await;
        assert_eq!(status, 200, "{}", acme);
        let acme_id = acme["data"]["organization"]["id"].as_str().unwrap().to_string();
        let admin = acme["data"]["adminUser"]["id"].as_str().unwrap().to_string();
        let admin_token = token_for(&admin);

        let (_, dev1) = f
            .post(
                &admin_token,
                "/api/users",
                json!({ "name": "Dev One", "email": "dev1@acme.test", "role": "qa" }),
            )
            .await;
        let (_, dev2) = f
            .post(
                &admin_token,
                "/api/users",
                json!({ "name": "Dev Two", "email": "dev2@acme.test", "role": "developer" }),
            )
            .await;
        let dev1 = data_id(&dev1);
        let dev2 = data_id(&dev2);

        let (_, other) = f
            .post(
                &f.root_token,
                "/api/organizations/with-admin",
                json!({
                    "name": "Other",
                    "adminUser": { "name": "Other Admin", "email": "admin@other.test" }
                }),
            )
            .await;
        let other_id = other["data"]["organization"]["id"].as_str().unwrap().to_string();
        let other_admin = other["data"]["adminUser"]["id"].as_str().unwrap().to_string();

        let (_, outsider) = f
            .post(
                &token_for(&other_admin),
                "/api/users",
                json!({ "name": "Outsider", "email": "dev@other.test", "role": "developer" }),
            )
            .await;
        let outsider = data_id(&outsider);

        let (status, p1) = f
            .post(
                &admin_token,
                "/api/projects",
                json!({ "name": "P1", "teamMemberIds": [dev1, dev2] }),
            )
            .await;
        assert_eq!(status, 200, "{}", p1);
        let p1 = data_id(&p1);

        World {
            acme_id,
            admin,
            dev1,
            dev2,
            other_id,
            other_admin,
            outsider,
            p1,
        }
    }

    async fn ticket(&self, f: &TestFixture, title: &str, assignee: Option<&str>) -> Value {
        let (status, body) = f
            .post(
                &token_for(&self.admin),
                "/api/tickets",
                json!({
                    "title": title,
                    "projectId": self.p1,
                    "assignedToId": assignee,
                }),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        body["data"].clone()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_missing_and_invalid_tokens() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/users/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = fixture.get("not-a-jwt", "/api/users/me").await;
    assert_eq!(status, 401);

    let (status, _) = fixture.get(&token_for("ghost"), "/api/users/me").await;
    assert_eq!(status, 401);

    let (status, body) = fixture.get(&fixture.root_token, "/api/users/me").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["role"], "superadmin");
}

#[tokio::test]
async fn test_deactivated_user_and_organization() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;

    let (status, body) = f
        .patch(&token_for(&w.admin), &format!("/api/users/{}/toggle-status", w.dev1), json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["isActive"], false);
    let (status, _) = f.get(&token_for(&w.dev1), "/api/users/me").await;
    assert_eq!(status, 401);

    let (status, _) = f
        .put(
            &f.root_token,
            &format!("/api/organizations/{}", w.acme_id),
            json!({ "isActive": false }),
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = f.get(&token_for(&w.dev2), "/api/users/me").await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = f.get(&f.root_token, "/api/users/me").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_assignment_scenario() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let admin = token_for(&w.admin);

    let ticket = w.ticket(&f, "Broken login", None).await;
    assert_eq!(ticket["status"], "pending");
    let path = format!("/api/tickets/{}/assign", ticket["id"].as_str().unwrap());

    let (status, body) = f.patch(&admin, &path, json!({ "assignedToId": w.dev2 })).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "assigned");
    assert_eq!(body["data"]["assignedToName"], "Dev Two");

    let (status, body) = f.patch(&admin, &path, json!({ "assignedToId": w.outsider })).await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "ASSIGNEE_CROSS_ORGANIZATION");

    let (status, body) = f.patch(&admin, &path, json!({ "assignedToId": w.admin })).await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "ASSIGNEE_ROLE_INELIGIBLE");

    // Rejections leave the ticket untouched.
    let (_, body) = f
        .get(&admin, &format!("/api/tickets/{}", ticket["id"].as_str().unwrap()))
        .await;
    assert_eq!(body["data"]["assignedToId"], w.dev2.as_str());
}

#[tokio::test]
async fn test_cross_organization_access() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let ticket = w.ticket(&f, "Acme only", None).await;
    let ticket_path = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());
    let other = token_for(&w.other_admin);

    let (status, body) = f
        .get(&other, &format!("/api/projects?organizationId={}", w.acme_id))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 0);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());

    let (_, body) = f.get(&other, "/api/tickets").await;
    assert_eq!(body["data"]["total"], 0);

    let (status, _) = f.get(&other, &ticket_path).await;
    assert_eq!(status, 404);

    let (status, _) = f.put(&other, &ticket_path, json!({ "title": "Mine now" })).await;
    assert_eq!(status, 403);

    let (status, _) = f
        .get(&other, &format!("/api/organizations/{}", w.acme_id))
        .await;
    assert_eq!(status, 404);

    let (status, _) = f
        .post(
            &other,
            "/api/tickets",
            json!({ "title": "Sneaky", "projectId": w.p1 }),
        )
        .await;
    assert_eq!(status, 403);

    // The platform role may narrow any list to one organization.
    let (_, body) = f
        .get(&f.root_token, &format!("/api/users?organizationId={}", w.other_id))
        .await;
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn test_create_with_assignee_records_both_events() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;

    let ticket = w.ticket(&f, "Preassigned", Some(&w.dev2)).await;
    assert_eq!(ticket["status"], "assigned");
    assert_eq!(ticket["version"], 1);

    let (status, history) = f
        .get(
            &token_for(&w.dev1),
            &format!("/api/tickets/{}/activities", ticket["id"].as_str().unwrap()),
        )
        .await;
    assert_eq!(status, 200);
    let kinds = kinds(&history);
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&"ticket_created".to_string()));
    assert!(kinds.contains(&"ticket_assigned".to_string()));
}

#[tokio::test]
async fn test_closing_releases_assignee_once() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let qa = token_for(&w.dev1);

    let ticket = w.ticket(&f, "Close me", Some(&w.dev2)).await;
    let id = ticket["id"].as_str().unwrap();
    let status_path = format!("/api/tickets/{}/status", id);

    let (status, body) = f.patch(&qa, &status_path, json!({ "status": "closed" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "closed");
    assert!(body["data"]["assignedToId"].is_null());

    // Re-closing is recorded as a status change but not as a second close.
    let (status, _) = f.patch(&qa, &status_path, json!({ "status": "closed" })).await;
    assert_eq!(status, 200);

    let (_, history) = f.get(&qa, &format!("/api/tickets/{}/activities", id)).await;
    let kinds = kinds(&history);
    assert_eq!(kinds.iter().filter(|k| *k == "ticket_closed").count(), 1);
    assert_eq!(kinds.iter().filter(|k| *k == "status_changed").count(), 2);
}

#[tokio::test]
async fn test_assigned_status_requires_assignee() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;

    let ticket = w.ticket(&f, "Unowned", None).await;
    let (status, body) = f
        .patch(
            &token_for(&w.dev1),
            &format!("/api/tickets/{}/status", ticket["id"].as_str().unwrap()),
            json!({ "status": "assigned" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_developer_needs_involvement_to_mutate() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let dev = token_for(&w.dev2);

    let foreign = w.ticket(&f, "Not yours", None).await;
    let foreign_path = format!("/api/tickets/{}", foreign["id"].as_str().unwrap());
    let (status, _) = f.put(&dev, &foreign_path, json!({ "title": "Taken" })).await;
    assert_eq!(status, 403);
    let (status, _) = f.delete(&dev, &foreign_path).await;
    assert_eq!(status, 403);

    let mine = w.ticket(&f, "Yours", Some(&w.dev2)).await;
    let (status, body) = f
        .patch(
            &dev,
            &format!("/api/tickets/{}/status", mine["id"].as_str().unwrap()),
            json!({ "status": "awaiting" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "awaiting");
}

#[tokio::test]
async fn test_version_mismatch() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let admin = token_for(&w.admin);

    let ticket = w.ticket(&f, "Versioned", None).await;
    let path = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());

    let (status, body) = f
        .put(&admin, &path, json!({ "title": "Second", "expectedVersion": 1 }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["version"], 2);

    let (status, body) = f
        .put(&admin, &path, json!({ "title": "Stale", "expectedVersion": 1 }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
    assert_eq!(body["error"]["details"]["currentVersion"], 2);

    // Without an expected version the write wins.
    let (status, body) = f.put(&admin, &path, json!({ "title": "Third" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["version"], 3);
}

#[tokio::test]
async fn test_update_without_changes_writes_nothing() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let admin = token_for(&w.admin);

    let ticket = w.ticket(&f, "Same", None).await;
    let id = ticket["id"].as_str().unwrap();

    let (status, body) = f
        .put(&admin, &format!("/api/tickets/{}", id), json!({ "title": "Same" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["version"], 1);

    let (_, history) = f.get(&admin, &format!("/api/tickets/{}/activities", id)).await;
    assert_eq!(kinds(&history), vec!["ticket_created".to_string()]);
}

#[tokio::test]
async fn test_update_summarizes_changes_in_one_event() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let admin = token_for(&w.admin);

    let ticket = w.ticket(&f, "Before", None).await;
    let id = ticket["id"].as_str().unwrap();

    let (status, body) = f
        .put(
            &admin,
            &format!("/api/tickets/{}", id),
            json!({ "title": "After", "priority": "high", "labels": ["ui"] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["priority"], "high");

    let (_, history) = f.get(&admin, &format!("/api/tickets/{}/activities", id)).await;
    let latest = &history["data"][0];
    assert_eq!(latest["kind"], "ticket_updated");
    let details = latest["details"].as_str().unwrap();
    assert!(details.contains("Title changed from \"Before\" to \"After\""));
    assert!(details.contains("Priority changed from medium to high"));
    assert_eq!(kinds(&history).len(), 2);
}

#[tokio::test]
async fn test_project_rename_keeps_ticket_snapshot() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let admin = token_for(&w.admin);

    let ticket = w.ticket(&f, "Snapshot", None).await;
    assert_eq!(ticket["projectName"], "P1");

    let (status, _) = f
        .put(&admin, &format!("/api/projects/{}", w.p1), json!({ "name": "Renamed" }))
        .await;
    assert_eq!(status, 200);

    let (_, body) = f
        .get(&admin, &format!("/api/tickets/{}", ticket["id"].as_str().unwrap()))
        .await;
    assert_eq!(body["data"]["projectName"], "P1");
}

#[tokio::test]
async fn test_user_rename_keeps_ticket_snapshots() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;

    let ticket = w.ticket(&f, "Names", Some(&w.dev2)).await;
    assert_eq!(ticket["assignedToName"], "Dev Two");
    assert_eq!(ticket["authorName"], "Acme Admin");

    let (status, _) = f
        .put(
            &token_for(&w.dev2),
            &format!("/api/users/{}", w.dev2),
            json!({ "name": "Dev Deux" }),
        )
        .await;
    assert_eq!(status, 200);
    let (status, _) = f
        .put(
            &token_for(&w.admin),
            &format!("/api/users/{}", w.admin),
            json!({ "name": "Acme Boss" }),
        )
        .await;
    assert_eq!(status, 200);

    let (_, body) = f
        .get(
            &token_for(&w.admin),
            &format!("/api/tickets/{}", ticket["id"].as_str().unwrap()),
        )
        .await;
    assert_eq!(body["data"]["assignedToName"], "Dev Two");
    assert_eq!(body["data"]["authorName"], "Acme Admin");
}

#[tokio::test]
async fn test_user_must_be_released_before_leaving_organization() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let admin = token_for(&w.admin);
    let user_path = format!("/api/users/{}", w.dev2);
    let project_path = format!("/api/projects/{}", w.p1);

    // Still on P1's team.
    let (status, body) = f
        .put(&f.root_token, &user_path, json!({ "organizationId": w.other_id }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, project) = f.get(&admin, &project_path).await;
    assert_eq!(project["data"]["organizationId"], w.acme_id.as_str());
    assert!(project["data"]["teamMembers"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m["userId"] == w.dev2.as_str()));

    // Holding a ticket blocks a move to a management role.
    let ticket = w.ticket(&f, "Held", Some(&w.dev2)).await;
    let ticket_id = ticket["id"].as_str().unwrap();
    let (status, _) = f.put(&admin, &user_path, json!({ "role": "admin" })).await;
    assert_eq!(status, 409);

    let (status, _) = f
        .delete(&admin, &format!("{}/members/{}", project_path, w.dev2))
        .await;
    assert_eq!(status, 200);
    let (status, _) = f
        .put(&f.root_token, &user_path, json!({ "organizationId": w.other_id }))
        .await;
    assert_eq!(status, 409);

    let (status, _) = f
        .patch(
            &admin,
            &format!("/api/tickets/{}/status", ticket_id),
            json!({ "status": "closed" }),
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = f
        .put(&f.root_token, &user_path, json!({ "organizationId": w.other_id }))
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["organizationId"], w.other_id.as_str());

    let (status, _) = f.get(&admin, &user_path).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_project_roster() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let admin = token_for(&w.admin);
    let members = format!("/api/projects/{}/members", w.p1);

    let (status, body) = f.post(&admin, &members, json!({ "userId": w.dev2 })).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, _) = f.post(&admin, &members, json!({ "userId": w.outsider })).await;
    assert_eq!(status, 400);

    let (status, body) = f.delete(&admin, &format!("{}/{}", members, w.dev2)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["teamMembers"].as_array().unwrap().len(), 1);

    let ticket = w.ticket(&f, "Roster", None).await;
    let (status, body) = f
        .patch(
            &admin,
            &format!("/api/tickets/{}/assign", ticket["id"].as_str().unwrap()),
            json!({ "assignedToId": w.dev2 }),
        )
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "ASSIGNEE_NOT_TEAM_MEMBER");

    let (status, _) = f.delete(&admin, &format!("{}/{}", members, w.dev2)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_organization_delete_conflict() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;

    let (status, body) = f
        .delete(&f.root_token, &format!("/api/organizations/{}", w.acme_id))
        .await;
    assert_eq!(status, 409);
    assert_eq!(
        body["error"]["message"],
        "Cannot delete organization with 3 user(s). Remove or reassign them first."
    );

    let (status, _) = f
        .delete(&token_for(&w.admin), &format!("/api/organizations/{}", w.acme_id))
        .await;
    assert_eq!(status, 403);

    let (_, stats) = f
        .get(&f.root_token, &format!("/api/organizations/{}/stats", w.acme_id))
        .await;
    assert_eq!(stats["data"]["users"], 3);
    assert_eq!(stats["data"]["projects"], 1);

    // No referencing users: delete goes through.
    let (status, empty) = f
        .post(&f.root_token, "/api/organizations", json!({ "name": "Empty" }))
        .await;
    assert_eq!(status, 200);
    let empty_path = format!("/api/organizations/{}", data_id(&empty));

    let (status, _) = f.delete(&f.root_token, &empty_path).await;
    assert_eq!(status, 200);
    let (status, _) = f.get(&f.root_token, &empty_path).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_saga_compensates_on_duplicate_email() {
    let f = TestFixture::new().await;
    World::build(&f).await;

    let (status, body) = f
        .post(
            &f.root_token,
            "/api/organizations/with-admin",
            json!({
                "name": "Dup Org",
                "adminUser": { "name": "Dup", "email": " DEV1@acme.test" }
            }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(
        body["error"]["message"],
        "User with email dev1@acme.test already exists"
    );

    let (_, orgs) = f.get(&f.root_token, "/api/organizations").await;
    assert_eq!(orgs["data"]["total"], 2);
    assert!(orgs["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|o| o["name"] != "Dup Org"));
}

#[tokio::test]
async fn test_user_creation_rules() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let admin = token_for(&w.admin);

    let (status, _) = f
        .post(
            &admin,
            "/api/users",
            json!({ "name": "Boss", "email": "boss@acme.test", "role": "superadmin" }),
        )
        .await;
    assert_eq!(status, 403);

    let (status, _) = f
        .post(
            &admin,
            "/api/users",
            json!({
                "name": "Spy",
                "email": "spy@acme.test",
                "role": "developer",
                "organizationId": w.other_id
            }),
        )
        .await;
    assert_eq!(status, 403);

    let (status, _) = f
        .post(
            &admin,
            "/api/users",
            json!({ "name": "PM", "email": "pm@acme.test", "role": "project-manager" }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, body) = f
        .post(
            &admin,
            "/api/users",
            json!({ "name": "Again", "email": "Dev2@Acme.test", "role": "developer" }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, _) = f.delete(&admin, &format!("/api/users/{}", w.admin)).await;
    assert_eq!(status, 400);

    // Anyone may rename themselves.
    let (status, body) = f
        .put(
            &token_for(&w.dev2),
            &format!("/api/users/{}", w.dev2),
            json!({ "name": "Dev Deux" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], "Dev Deux");
}

#[tokio::test]
async fn test_notification_preferences() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let dev = token_for(&w.dev2);
    let path = format!("/api/users/{}/preferences", w.dev2);

    let (status, body) = f.get(&dev, &path).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["ticketAssigned"], true);

    let (status, body) = f.put(&dev, &path, json!({ "ticketAssigned": false })).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["ticketAssigned"], false);
    assert_eq!(body["data"]["ticketClosed"], true);

    let (status, _) = f
        .put(
            &token_for(&w.other_admin),
            &path,
            json!({ "ticketClosed": false }),
        )
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_comments() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let qa = token_for(&w.dev1);

    let ticket = w.ticket(&f, "Discuss", Some(&w.dev2)).await;
    let comments = format!("/api/tickets/{}/comments", ticket["id"].as_str().unwrap());

    let (status, body) = f.post(&qa, &comments, json!({ "content": "Looks odd" })).await;
    assert_eq!(status, 200);
    let comment_id = data_id(&body);

    let (status, _) = f.post(&qa, &comments, json!({ "content": "   " })).await;
    assert_eq!(status, 400);

    let (_, body) = f.get(&token_for(&w.dev2), &comments).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["authorName"], "Dev One");

    let (status, _) = f
        .delete(&token_for(&w.dev2), &format!("{}/{}", comments, comment_id))
        .await;
    assert_eq!(status, 403);

    let (status, _) = f.delete(&qa, &format!("{}/{}", comments, comment_id)).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_activity_feed_scoping() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;

    w.ticket(&f, "Unrelated", None).await;
    w.ticket(&f, "For dev2", Some(&w.dev2)).await;

    let (status, feed) = f.get(&token_for(&w.admin), "/api/activities").await;
    assert_eq!(status, 200);
    assert_eq!(feed["data"]["total"], 3);

    let (_, feed) = f.get(&token_for(&w.dev2), "/api/activities").await;
    assert_eq!(feed["data"]["total"], 1);
    assert_eq!(feed["data"]["activities"][0]["targetUserId"], w.dev2.as_str());

    let (_, feed) = f.get(&token_for(&w.other_admin), "/api/activities").await;
    assert_eq!(feed["data"]["total"], 0);

    let (_, feed) = f.get(&f.root_token, "/api/activities?limit=2").await;
    assert_eq!(feed["data"]["activities"].as_array().unwrap().len(), 2);
    assert_eq!(feed["data"]["hasMore"], true);

    let (status, page) = f
        .get(&token_for(&w.admin), &format!("/api/users/{}/activities", w.dev2))
        .await;
    assert_eq!(status, 200);
    assert_eq!(page["data"]["total"], 1);

    let (status, _) = f
        .get(&token_for(&w.dev2), &format!("/api/users/{}/activities", w.admin))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_search_is_scoped() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;

    w.ticket(&f, "Login page crashes", None).await;
    w.ticket(&f, "Slow export", None).await;

    let (status, body) = f.get(&token_for(&w.dev1), "/api/search?q=login").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["results"][0]["ticket"]["title"], "Login page crashes");

    let (_, body) = f.get(&token_for(&w.other_admin), "/api/search?q=login").await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_deleted_ticket_keeps_history() {
    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let admin = token_for(&w.admin);

    let ticket = w.ticket(&f, "Short lived", None).await;
    let path = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());

    let (status, _) = f.delete(&admin, &path).await;
    assert_eq!(status, 200);
    let (status, _) = f.get(&admin, &path).await;
    assert_eq!(status, 404);

    let (_, feed) = f.get(&admin, "/api/activities").await;
    assert_eq!(feed["data"]["total"], 1);
    assert_eq!(feed["data"]["activities"][0]["ticketTitle"], "Short lived");
}

#[tokio::test]
async fn test_involvement_scope_narrows_developer_lists() {
    let f = TestFixture::with_scope(TicketScopeMode::Involvement).await;
    let w = World::build(&f).await;

    w.ticket(&f, "Someone else's", None).await;
    let mine = w.ticket(&f, "Mine", Some(&w.dev2)).await;

    let (_, body) = f.get(&token_for(&w.dev2), "/api/tickets").await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], mine["id"]);

    // Other roles still see the whole organization.
    let (_, body) = f.get(&token_for(&w.dev1), "/api/tickets").await;
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn test_notification_socket_receives_assignment() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message};

    let f = TestFixture::new().await;
    let w = World::build(&f).await;
    let ticket = w.ticket(&f, "Live", None).await;
    let ticket_id = ticket["id"].as_str().unwrap();

    let ws_url = format!("{}/api/notifications/ws", f.base_url.replacen("http", "ws", 1));
    let mut request = ws_url.into_client_request().unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", token_for(&w.dev2)).parse().unwrap(),
    );
    let (mut socket, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("Failed to connect to notification socket");

    // Registration happens after the handshake completes.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let (status, _) = f
        .patch(
            &token_for(&w.admin),
            &format!("/api/tickets/{}/assign", ticket_id),
            json!({ "assignedToId": w.dev2 }),
        )
        .await;
    assert_eq!(status, 200);

    let notification = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Text(text) = message {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["event"] == "notification" {
                    return Some(value);
                }
            }
        }
        None
    })
    .await
    .expect("Timed out waiting for notification")
    .expect("Socket closed before notification");

    assert_eq!(notification["data"]["ticketId"], ticket_id);
    assert_eq!(notification["data"]["userId"], w.dev2.as_str());

    socket.send(Message::Close(None)).await.unwrap();
}
