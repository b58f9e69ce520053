//! Router-level tests: every request goes through the real axum router,
//! middleware included, backed by an in-memory database.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use mystery_api::auth::create_token;
use mystery_api::email::{Mailer, MailerOptions};
use mystery_api::suggest::{FALLBACK_SETS, Suggester, SuggesterOptions};
use mystery_api::{AppState, AppStateInner, build_router};
use mystery_db::Database;
use mystery_db::queries::PendingUser;

const SECRET: &str = "test-secret";

struct TestApp {
    state: AppState,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_code_exposure(false)
    }

    fn with_code_exposure(expose_code_on_email_failure: bool) -> Self {
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: SECRET.into(),
            mailer: Mailer::new(MailerOptions::default()),
            suggester: Suggester::new(SuggesterOptions::default()),
            expose_code_on_email_failure,
        });
        let router = build_router(state.clone());
        Self { state, router }
    }

    /// Creates a verified account directly in the database and returns its id
    /// and a session token.
    fn user(&self, username: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let email = format!("{username}@example.com");
        self.state
            .db
            .register_pending_user(
                &id.to_string(),
                &PendingUser {
                    username,
                    email: &email,
                    password_hash: "unused",
                    verify_code: "123456",
                    verify_code_expiry: Utc::now() + Duration::hours(1),
                },
                Utc::now(),
            )
            .unwrap();
        self.state.db.mark_verified(&id.to_string()).unwrap();
        (id, create_token(SECRET, id, username).unwrap())
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.call_raw(method, uri, token, body).await;
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn call_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send(&self, to: &str, content: &str) -> StatusCode {
        let body = json!({ "username": to, "content": content });
        self.call(Method::POST, "/api/send-message", None, Some(body)).await.0
    }

    async fn inbox(&self, token: &str) -> Vec<Value> {
        let (status, body) = self.call(Method::GET, "/api/get-messages", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        body["messages"].as_array().unwrap().clone()
    }

    async fn public_board(&self, username: &str) -> Vec<Value> {
        let uri = format!("/api/get-public-messages?username={username}");
        let (status, body) = self.call(Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        body["messages"].as_array().unwrap().clone()
    }

    async fn reply(&self, token: &str, message_id: &str, content: &str) -> StatusCode {
        let body = json!({ "messageId": message_id, "content": content });
        self.call(Method::POST, "/api/reply-message", Some(token), Some(body)).await.0
    }
}

#[tokio::test]
async fn anonymous_message_respects_acceptance_flag() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice");

    assert_eq!(app.send("alice", "hi").await, StatusCode::OK);
    let inbox = app.inbox(&alice).await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["content"], "hi");
    assert!(inbox[0].get("senderId").is_none());

    let (status, body) = app
        .call(
            Method::POST,
            "/api/accept-message",
            Some(&alice),
            Some(json!({ "acceptMessage": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updatedUser"]["isAcceptingMessages"], false);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/send-message",
            None,
            Some(json!({ "username": "alice", "content": "hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(app.inbox(&alice).await.len(), 1);
}

#[tokio::test]
async fn attributed_message_stays_off_the_public_board() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice");
    let (bob_id, bob) = app.user("bob");

    let body = json!({ "username": "alice", "content": "q", "senderId": bob_id });
    let (status, _) = app.call(Method::POST, "/api/send-message", Some(&bob), Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let inbox = app.inbox(&alice).await;
    assert_eq!(inbox[0]["senderId"], bob_id.to_string());
    let message_id = inbox[0]["id"].as_str().unwrap().to_string();

    let (status, sent) = app.call(Method::GET, "/api/get-sent-messages", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    let sent = sent["messages"].as_array().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["receiverUsername"], "alice");
    assert_eq!(sent[0]["isPrivateReply"], true);

    assert_eq!(app.reply(&alice, &message_id, "a").await, StatusCode::OK);
    assert!(app.public_board("alice").await.is_empty());

    let (_, sent) = app.call(Method::GET, "/api/get-sent-messages", Some(&bob), None).await;
    assert_eq!(sent["messages"][0]["reply"], "a");
    assert!(sent["messages"][0]["repliedAt"].is_string());
}

#[tokio::test]
async fn signed_in_sender_stays_anonymous_without_sender_id() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice");
    let (_, bob) = app.user("bob");

    let body = json!({ "username": "alice", "content": "guess who" });
    let (status, _) = app.call(Method::POST, "/api/send-message", Some(&bob), Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    assert!(app.inbox(&alice).await[0].get("senderId").is_none());
    let (_, sent) = app.call(Method::GET, "/api/get-sent-messages", Some(&bob), None).await;
    assert!(sent["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn sender_id_must_match_session() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice");
    let (bob_id, _) = app.user("bob");
    let (_, carol) = app.user("carol");

    let body = json!({ "username": "alice", "content": "spoofed", "senderId": bob_id });
    let (status, _) = app.call(Method::POST, "/api/send-message", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call(Method::POST, "/api/send-message", Some(&carol), Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // An unknown recipient wins over a mismatched sender.
    let body = json!({ "username": "nobody", "content": "spoofed", "senderId": bob_id });
    let (status, _) = app.call(Method::POST, "/api/send-message", Some(&carol), Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(app.inbox(&alice).await.is_empty());
}

#[tokio::test]
async fn send_message_validation() {
    let app = TestApp::new();
    app.user("alice");

    assert_eq!(app.send("nobody", "hi").await, StatusCode::NOT_FOUND);
    assert_eq!(app.send("alice", "   ").await, StatusCode::BAD_REQUEST);
    assert_eq!(app.send("alice", &"x".repeat(301)).await, StatusCode::BAD_REQUEST);
    assert_eq!(app.send("alice", &"x".repeat(300)).await, StatusCode::OK);

    let (status, body) = app
        .call_raw(Method::POST, "/api/send-message", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn public_board_is_sorted_by_reply_time() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice");

    for content in ["first", "second", "unanswered"] {
        assert_eq!(app.send("alice", content).await, StatusCode::OK);
    }
    let inbox = app.inbox(&alice).await;
    let id_of = |content: &str| {
        inbox
            .iter()
            .find(|m| m["content"] == content)
            .map(|m| m["id"].as_str().unwrap().to_string())
            .unwrap()
    };

    // Answer the newer one first.
    assert_eq!(app.reply(&alice, &id_of("second"), "two").await, StatusCode::OK);
    assert_eq!(app.reply(&alice, &id_of("first"), "one").await, StatusCode::OK);

    let board = app.public_board("alice").await;
    let contents: Vec<&str> = board.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, vec!["first", "second"]);
    assert_eq!(board[0]["reply"], "one");
}

#[tokio::test]
async fn public_board_requires_known_username() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::GET, "/api/get-public-messages", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .call(Method::GET, "/api/get-public-messages?username=ghost", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reply_rules() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice");
    let (_, bob) = app.user("bob");
    app.send("alice", "q").await;
    let id = app.inbox(&alice).await[0]["id"].as_str().unwrap().to_string();

    assert_eq!(app.reply(&alice, "", "text").await, StatusCode::BAD_REQUEST);
    assert_eq!(app.reply(&alice, &id, "  ").await, StatusCode::BAD_REQUEST);
    assert_eq!(app.reply(&alice, &Uuid::new_v4().to_string(), "text").await, StatusCode::NOT_FOUND);
    assert_eq!(app.reply(&bob, &id, "not mine").await, StatusCode::NOT_FOUND);

    assert_eq!(app.reply(&alice, &id, "first").await, StatusCode::OK);
    assert_eq!(app.reply(&alice, &id, "second").await, StatusCode::OK);
    let inbox = app.inbox(&alice).await;
    assert_eq!(inbox[0]["reply"], "second");
    assert!(inbox[0]["repliedAt"].is_string());
}

#[tokio::test]
async fn delete_removes_exactly_one_message() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice");
    let (_, bob) = app.user("bob");
    app.send("alice", "keep").await;
    app.send("alice", "remove").await;

    let inbox = app.inbox(&alice).await;
    let target = inbox.iter().find(|m| m["content"] == "remove").unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/delete-message/{target}");

    let (status, _) = app.call(Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.call(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let inbox = app.inbox(&alice).await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["content"], "keep");
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = TestApp::new();
    let forged = create_token("some-other-secret", Uuid::new_v4(), "mallory").unwrap();

    for (method, uri) in [
        (Method::GET, "/api/accept-message"),
        (Method::GET, "/api/get-messages"),
        (Method::GET, "/api/get-sent-messages"),
        (Method::DELETE, "/api/delete-message/whatever"),
    ] {
        let (status, body) = app.call(method.clone(), uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["message"], "Not Authenticated");

        let (status, _) = app.call(method, uri, Some(&forged), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn acceptance_status_round_trip() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice");

    let (status, body) = app.call(Method::GET, "/api/accept-message", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAcceptingMessages"], true);

    // Older clients send the plural key.
    let (status, _) = app
        .call(
            Method::POST,
            "/api/accept-message",
            Some(&alice),
            Some(json!({ "acceptMessages": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.call(Method::GET, "/api/accept-message", Some(&alice), None).await;
    assert_eq!(body["isAcceptingMessages"], false);

    // A token for an account that does not exist.
    let ghost = create_token(SECRET, Uuid::new_v4(), "ghost").unwrap();
    let (status, _) = app.call(Method::GET, "/api/accept-message", Some(&ghost), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sign_up_verify_and_sign_in() {
    let app = TestApp::new();
    let credentials = json!({ "identifier": "dana", "password": "hunter22" });

    let (status, body) = app
        .call(
            Method::POST,
            "/api/sign-up",
            None,
            Some(json!({ "username": "dana", "email": "dana@example.com", "password": "hunter22" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    // Email is not configured and the code must not leak.
    assert!(!body["message"].as_str().unwrap().contains("Code:"));

    let (status, body) = app.call(Method::POST, "/api/sign-in", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Please verify your account before logging in");

    let code = app.state.db.get_user_by_username("dana").unwrap().unwrap().verify_code;
    let wrong = if code == "999999" { "100000" } else { "999999" };

    let (status, body) = app
        .call(Method::POST, "/api/verify-code", None, Some(json!({ "username": "dana", "code": wrong })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Incorrect verification code");

    let (status, _) = app
        .call(Method::POST, "/api/verify-code", None, Some(json!({ "username": "DANA", "code": code })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/sign-in",
            None,
            Some(json!({ "identifier": "dana@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let (status, body) = app.call(Method::POST, "/api/sign-in", None, Some(credentials)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "dana");
    assert!(body["user"].get("password").is_none());
    let token = body["token"].as_str().unwrap().to_string();

    assert!(app.inbox(&token).await.is_empty());

    // A verified username cannot be registered again.
    let (status, body) = app
        .call(
            Method::POST,
            "/api/sign-up",
            None,
            Some(json!({ "username": "dana", "email": "other@example.com", "password": "hunter22" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username is already taken");
}

#[tokio::test]
async fn expired_code_is_rejected() {
    let app = TestApp::new();
    let id = Uuid::new_v4().to_string();
    app.state
        .db
        .register_pending_user(
            &id,
            &PendingUser {
                username: "late",
                email: "late@example.com",
                password_hash: "unused",
                verify_code: "123456",
                verify_code_expiry: Utc::now() - Duration::minutes(1),
            },
            Utc::now() - Duration::hours(1),
        )
        .unwrap();

    let (status, body) = app
        .call(Method::POST, "/api/verify-code", None, Some(json!({ "username": "late", "code": "123456" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("expired"));

    let (status, _) = app
        .call(Method::POST, "/api/verify-code", None, Some(json!({ "username": "nobody", "code": "123456" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sign_up_exposes_code_only_when_configured() {
    let app = TestApp::with_code_exposure(true);
    let (status, body) = app
        .call(
            Method::POST,
            "/api/sign-up",
            None,
            Some(json!({ "username": "erin", "email": "erin@example.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let code = app.state.db.get_user_by_username("erin").unwrap().unwrap().verify_code;
    assert!(body["message"].as_str().unwrap().ends_with(&format!("Code: {code}")));
}

#[tokio::test]
async fn sign_up_validation() {
    let app = TestApp::new();
    for body in [
        json!({ "username": "x", "email": "x@example.com", "password": "secret1" }),
        json!({ "username": "bad name", "email": "x@example.com", "password": "secret1" }),
        json!({ "username": "xavier", "email": "not-an-email", "password": "secret1" }),
        json!({ "username": "xavier", "email": "x@example.com", "password": "123" }),
    ] {
        let (status, body) = app.call(Method::POST, "/api/sign-up", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}

#[tokio::test]
async fn username_availability() {
    let app = TestApp::new();
    app.user("alice");

    let (status, body) = app
        .call(Method::GET, "/api/check-username-unique?username=alice", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username is already taken");

    let (status, body) = app
        .call(Method::GET, "/api/check-username-unique?username=brand_new", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Username is unique");

    let (status, _) = app
        .call(Method::GET, "/api/check-username-unique?username=no%21", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn suggestions_fall_back_without_generator() {
    let app = TestApp::new();
    let (status, bytes) = app.call_raw(Method::POST, "/api/suggest-messages", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(bytes).unwrap();
    assert!(FALLBACK_SETS.iter().any(|set| *set == text));
    assert_eq!(text.split("||").count(), 3);
}
