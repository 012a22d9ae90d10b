//! Common test utilities for integration tests.
//!
//! The app is built over the in-memory store, so these tests need no
//! database. Dispatch jobs are recorded by a `RecordingQueue` and delivered
//! on demand with [`TestApp::deliver_all`].

// Helpers are shared by several test binaries; not all of them use every one.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use domain::models::DispatchJob;
use domain::repositories::InMemoryStore;
use domain::services::{
    Dispatcher, DispatcherSettings, MockMailTransport, RecordingQueue, RetryPolicy,
};
use serde_json::{json, Value};
use shared::jwt::JwtConfig;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;
use watchparty_api::app::{self, create_app, AppState, Repositories};
use watchparty_api::config::Config;

/// A caller with an identity token.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub queue: Arc<RecordingQueue>,
    pub mail: Arc<MockMailTransport>,
    pub jwt: JwtConfig,
    repos: Repositories,
    config: Config,
}

/// Test configuration: HS256 secret, no external mail.
pub fn test_config() -> Config {
    Config::load_for_test(&[]).expect("Failed to build test config")
}

pub fn create_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(RecordingQueue::new());
    let repos = Repositories::in_memory(store.clone());
    let jwt = app::build_jwt(&config.jwt).expect("Failed to build JWT config");

    let state = AppState::new(config.clone(), None, &repos, queue.clone())
        .expect("Failed to build app state");

    TestApp {
        router: create_app(state),
        store,
        queue,
        mail: Arc::new(MockMailTransport::new()),
        jwt,
        repos,
        config,
    }
}

pub fn unique_test_email() -> String {
    format!("user_{}@example.com", &Uuid::new_v4().simple().to_string()[..12])
}

impl TestApp {
    /// A new caller with a valid token. Nothing is stored until the caller
    /// makes an authenticated request.
    pub fn user(&self) -> TestUser {
        self.user_with_email(&unique_test_email())
    }

    pub fn user_with_email(&self, email: &str) -> TestUser {
        let user_id = Uuid::new_v4();
        let token = self
            .jwt
            .issue_token(user_id, email, 3600)
            .expect("Failed to issue token");
        TestUser {
            user_id,
            email: email.to_string(),
            token,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Creates an event hosted by `host` and returns its id.
    pub async fn create_event(&self, host: &TestUser) -> Uuid {
        let response = self
            .send(json_request_with_auth(
                Method::POST,
                "/api/v1/events",
                json!({
                    "title": "Season finale",
                    "description": "Bring snacks",
                    "scheduled_at": "2030-06-01T19:00:00Z",
                    "location": "Living room"
                }),
                &host.token,
            ))
            .await;
        assert_eq!(response.status(), 201, "event creation failed");
        let body = parse_response_body(response).await;
        body["id"].as_str().unwrap().parse().unwrap()
    }

    /// Makes any authenticated request so the caller's identity is stored.
    pub async fn sign_in(&self, user: &TestUser) {
        let response = self
            .send(get_request_with_auth("/api/v1/invitations", &user.token))
            .await;
        assert_eq!(response.status(), 200);
    }

    pub async fn invite(&self, host: &TestUser, event_id: Uuid, email: &str) -> axum::response::Response {
        self.send(json_request_with_auth(
            Method::POST,
            &format!("/api/v1/events/{}/invitations", event_id),
            json!({ "invitee_email": email }),
            &host.token,
        ))
        .await
    }

    pub async fn rsvp(&self, user: &TestUser, invitation_id: &str, status: &str) -> axum::response::Response {
        self.send(json_request_with_auth(
            Method::PUT,
            &format!("/api/v1/invitations/{}/rsvp", invitation_id),
            json!({ "status": status }),
            &user.token,
        ))
        .await
    }

    /// Delivers every due dispatch job with the mock mail transport.
    pub async fn deliver_all(&self) -> usize {
        let dispatcher = Dispatcher::new(
            self.repos.dispatch.clone(),
            self.repos.notifications.clone(),
            self.repos.identities.clone(),
            self.mail.clone(),
            app::templates(&self.config.email),
            DispatcherSettings {
                retry: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::ZERO,
                    max_delay: Duration::ZERO,
                    jitter_ratio: 0.0,
                },
                attempt_timeout: Duration::from_secs(1),
            },
        );
        dispatcher
            .deliver_due(100, chrono::Duration::seconds(30))
            .await
            .expect("Failed to deliver dispatch jobs")
    }

    pub fn jobs(&self) -> Vec<DispatchJob> {
        self.store.jobs()
    }
}

/// Build a JSON request with authentication.
pub fn json_request_with_auth(method: Method, uri: &str, body: Value, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request with authentication.
pub fn get_request_with_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Build a bodiless PUT request with authentication.
pub fn put_request_with_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Build a POST request with authentication and no body.
pub fn post_request_with_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}
