//! REST route tests driven through the router without a socket.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use circle_server::{AppState, ServerConfig, app};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let state = AppState::in_memory();
        Self {
            router: app(state, &ServerConfig::default()),
        }
    }

    async fn call(&self, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header("x-user-id", user);
        }
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get(&self, uri: &str, user: &str) -> (StatusCode, Value) {
        self.call("GET", uri, Some(user), None).await
    }

    async fn post(&self, uri: &str, user: &str, body: Value) -> (StatusCode, Value) {
        self.call("POST", uri, Some(user), Some(body)).await
    }

    async fn post_empty(&self, uri: &str, user: &str) -> (StatusCode, Value) {
        self.call("POST", uri, Some(user), None).await
    }

    async fn create_circle(&self, owner: &str, name: &str, private: bool) -> String {
        let (status, circle) = self
            .post(
                "/api/circles",
                owner,
                json!({ "name": name, "isPrivate": private }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        circle["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, _) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app.call("GET", "/api/circles/my", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = app.call("GET", "/api/notifications", Some("  "), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_list_circles() {
    let app = TestApp::new();
    let id = app.create_circle("alice", "Runners", false).await;

    let (status, circles) = app.get("/api/circles/my", "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(circles.as_array().unwrap().len(), 1);
    assert_eq!(circles[0]["id"], json!(id));
    assert_eq!(circles[0]["createdBy"], json!("alice"));
    assert_eq!(circles[0]["isPrivate"], json!(false));

    let (status, circle) = app.get(&format!("/api/circles/{id}"), "bob").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(circle["name"], json!("Runners"));

    let (_, circles) = app.get("/api/circles/my", "bob").await;
    assert_eq!(circles, json!([]));
}

#[tokio::test]
async fn test_invalid_bodies_are_bad_requests() {
    let app = TestApp::new();

    let (status, _) = app
        .post("/api/circles", "alice", json!({ "name": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/circles", "alice", json!({ "title": "no name field" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post_empty("/api/circles", "alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_circle_is_not_found() {
    let app = TestApp::new();
    let (status, _) = app.get("/api/circles/c404", "alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.post_empty("/api/circles/c404/join", "alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_private_circle_is_closed_to_outsiders() {
    let app = TestApp::new();
    let id = app.create_circle("alice", "Inner", true).await;

    let (status, _) = app.post_empty(&format!("/api/circles/{id}/join"), "bob").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&format!("/api/circles/{id}"), "bob").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&format!("/api/circles/{id}"), "alice").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_join_notifies_owner_and_unlocks_history() {
    let app = TestApp::new();
    let id = app.create_circle("alice", "Runners", false).await;
    let messages = format!("/api/circles/{id}/messages");

    let (status, _) = app.get(&messages, "bob").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.post_empty(&format!("/api/circles/{id}/join"), "bob").await;
    assert_eq!(status, StatusCode::OK);
    // A second join is a no-op and does not notify again.
    app.post_empty(&format!("/api/circles/{id}/join"), "bob").await;

    let (_, feed) = app.get("/api/notifications", "alice").await;
    assert_eq!(feed["unreadCount"], json!(1));
    assert_eq!(feed["notifications"][0]["kind"], json!("circle_joined"));

    let (status, message) = app
        .post(&messages, "bob", json!({ "content": "  hello  " }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["content"], json!("hello"));
    assert_eq!(message["userId"], json!("bob"));

    let (status, history) = app.get(&messages, "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, _) = app.post_empty(&format!("/api/circles/{id}/leave"), "bob").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&messages, "bob").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let app = TestApp::new();
    let id = app.create_circle("alice", "Runners", false).await;

    let (status, _) = app
        .post(
            &format!("/api/circles/{id}/messages"),
            "alice",
            json!({ "content": " " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_direct_message_flow() {
    let app = TestApp::new();

    let (status, conversation) = app
        .post("/api/dm/conversations", "alice", json!({ "userId": "bob" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let id = conversation["id"].as_str().unwrap().to_string();

    // Reopening from the other side returns the same conversation.
    let (_, again) = app
        .post("/api/dm/conversations", "bob", json!({ "userId": "alice" }))
        .await;
    assert_eq!(again["id"], json!(id));

    let (_, list) = app.get("/api/dm/conversations", "bob").await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let messages = format!("/api/dm/conversations/{id}/messages");
    let (status, message) = app
        .post(&messages, "alice", json!({ "content": "lunch?" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["senderId"], json!("alice"));
    assert_eq!(message["conversationId"], json!(id));

    let (_, history) = app.get(&messages, "bob").await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, _) = app.get(&messages, "eve").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.post(&messages, "eve", json!({ "content": "hi" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, feed) = app.get("/api/notifications", "bob").await;
    assert_eq!(feed["unreadCount"], json!(1));
    assert_eq!(feed["notifications"][0]["kind"], json!("direct_message"));
    assert_eq!(feed["notifications"][0]["body"], json!("alice: lunch?"));

    let (_, feed) = app.get("/api/notifications", "alice").await;
    assert_eq!(feed["unreadCount"], json!(0));
}

#[tokio::test]
async fn test_conversation_with_self_is_rejected() {
    let app = TestApp::new();
    let (status, _) = app
        .post("/api/dm/conversations", "alice", json!({ "userId": "alice" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mark_notifications_read() {
    let app = TestApp::new();
    let (_, conversation) = app
        .post("/api/dm/conversations", "alice", json!({ "userId": "bob" }))
        .await;
    let messages = format!(
        "/api/dm/conversations/{}/messages",
        conversation["id"].as_str().unwrap()
    );
    app.post(&messages, "alice", json!({ "content": "one" })).await;
    app.post(&messages, "alice", json!({ "content": "two" })).await;

    let (_, feed) = app.get("/api/notifications", "bob").await;
    assert_eq!(feed["unreadCount"], json!(2));
    // Newest first.
    assert_eq!(feed["notifications"][0]["body"], json!("alice: two"));
    let newest = feed["notifications"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post_empty(&format!("/api/notifications/{newest}/read"), "bob")
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, feed) = app.get("/api/notifications", "bob").await;
    assert_eq!(feed["unreadCount"], json!(1));

    // Someone else's notification is invisible.
    let (status, _) = app
        .post_empty(&format!("/api/notifications/{newest}/read"), "alice")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.post_empty("/api/notifications/read-all", "bob").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, feed) = app.get("/api/notifications", "bob").await;
    assert_eq!(feed["unreadCount"], json!(0));
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/circles/my")
        .header(header::ORIGIN, "https://circle.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-user-id")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
