//! Integration tests for join request endpoints.

mod common;

use axum::http::StatusCode;
use common::{create_test_app, parse_response_body, post_request_with_auth};
use domain::models::{DispatchKind, StepState};
use uuid::Uuid;

fn join_uri(event_id: Uuid) -> String {
    format!("/api/v1/events/{}/join-request", event_id)
}

#[tokio::test]
async fn test_join_request_success() {
    let app = create_test_app();
    let host = app.user();
    let guest = app.user();
    let event_id = app.create_event(&host).await;

    let response = app
        .send(post_request_with_auth(&join_uri(event_id), &guest.token))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = parse_response_body(response).await;
    assert_eq!(body["notification_type"], "join_request");
    assert_eq!(body["sender_id"], guest.user_id.to_string());
    assert_eq!(body["event_id"], event_id.to_string());
    assert_eq!(body["is_read"], false);
    assert!(body["message"].as_str().unwrap().contains(&guest.email));

    let notifications = app.store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].recipient_id, host.user_id);

    // The inbox entry is written up front; only the e-mail is left to deliver.
    let jobs = app.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].correlation_key.kind, DispatchKind::JoinRequested);
    assert_eq!(jobs[0].inbox_state, StepState::Done);
    assert_eq!(jobs[0].email_state, StepState::Pending);
    assert!(app.store.invitations().is_empty());
}

#[tokio::test]
async fn test_join_request_host_email_delivered() {
    let app = create_test_app();
    let host = app.user();
    let guest = app.user();
    let event_id = app.create_event(&host).await;

    let response = app
        .send(post_request_with_auth(&join_uri(event_id), &guest.token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    assert_eq!(app.deliver_all().await, 1);

    let delivered = app.mail.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].to, host.email);
    // Delivery does not duplicate the inbox entry
    assert_eq!(app.store.notifications().len(), 1);
}

#[tokio::test]
async fn test_join_request_own_event_rejected() {
    let app = create_test_app();
    let host = app.user();
    let event_id = app.create_event(&host).await;

    let response = app
        .send(post_request_with_auth(&join_uri(event_id), &host.token))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "bad_request");
    assert!(app.jobs().is_empty());
}

#[tokio::test]
async fn test_join_request_already_invited_rejected() {
    let app = create_test_app();
    let host = app.user();
    let guest = app.user();
    let event_id = app.create_event(&host).await;
    let invited = app.invite(&host, event_id, &guest.email).await;
    assert_eq!(invited.status(), StatusCode::CREATED);

    let response = app
        .send(post_request_with_auth(&join_uri(event_id), &guest.token))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "pending");
    assert!(app.store.notifications().is_empty());
    assert_eq!(app.jobs().len(), 1);
}

#[tokio::test]
async fn test_join_request_unknown_event() {
    let app = create_test_app();
    let guest = app.user();

    let response = app
        .send(post_request_with_auth(&join_uri(Uuid::new_v4()), &guest.token))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
