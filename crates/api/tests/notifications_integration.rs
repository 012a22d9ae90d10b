//! Integration tests for notification endpoints and their delivery through
//! the dispatch outbox.

mod common;

use axum::http::StatusCode;
use common::{create_test_app, get_request_with_auth, parse_response_body, put_request_with_auth};
use domain::models::DispatchStatus;
use uuid::Uuid;

#[tokio::test]
async fn test_invitation_delivered_to_registered_invitee() {
    let app = create_test_app();
    let host = app.user();
    let guest = app.user();
    app.sign_in(&guest).await;
    let event_id = app.create_event(&host).await;
    let invited = app.invite(&host, event_id, &guest.email).await;
    assert_eq!(invited.status(), StatusCode::CREATED);

    assert_eq!(app.deliver_all().await, 1);

    let response = app
        .send(get_request_with_auth("/api/v1/notifications", &guest.token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["unread_count"], 1);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["notification_type"], "invitation");
    assert_eq!(data[0]["sender_id"], host.user_id.to_string());
    assert_eq!(data[0]["event_id"], event_id.to_string());

    assert_eq!(app.mail.delivered().len(), 1);
    assert_eq!(app.jobs()[0].status, DispatchStatus::Delivered);
}

#[tokio::test]
async fn test_unregistered_invitee_gets_email_only() {
    let app = create_test_app();
    let host = app.user();
    let event_id = app.create_event(&host).await;
    let invited = app.invite(&host, event_id, "newcomer@example.com").await;
    assert_eq!(invited.status(), StatusCode::CREATED);

    app.deliver_all().await;

    assert!(app.store.notifications().is_empty());
    let delivered = app.mail.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].to, "newcomer@example.com");
    assert_eq!(app.jobs()[0].status, DispatchStatus::Delivered);
}

#[tokio::test]
async fn test_answer_notifies_host() {
    let app = create_test_app();
    let host = app.user();
    let guest = app.user();
    let event_id = app.create_event(&host).await;
    let invited = app.invite(&host, event_id, &guest.email).await;
    let invitation_id = parse_response_body(invited).await["id"]
        .as_str()
        .unwrap()
        .to_string();
    let answered = app.rsvp(&guest, &invitation_id, "accepted").await;
    assert_eq!(answered.status(), StatusCode::OK);

    assert_eq!(app.deliver_all().await, 2);

    let response = app
        .send(get_request_with_auth("/api/v1/notifications", &host.token))
        .await;
    let body = parse_response_body(response).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["sender_id"], guest.user_id.to_string());
    assert!(data[0]["message"].as_str().unwrap().contains("accepted"));

    // The guest signed in by answering, so the invitation reached their
    // inbox too. A second pass finds nothing left to deliver.
    assert_eq!(app.store.notifications().len(), 2);
    assert_eq!(app.deliver_all().await, 0);
    assert_eq!(app.store.notifications().len(), 2);
}

#[tokio::test]
async fn test_mark_notification_read() {
    let app = create_test_app();
    let host = app.user();
    let guest = app.user();
    let event_id = app.create_event(&host).await;
    let response = app
        .send(common::post_request_with_auth(
            &format!("/api/v1/events/{}/join-request", event_id),
            &guest.token,
        ))
        .await;
    let notification_id = parse_response_body(response).await["id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/v1/notifications/{}/read", notification_id);

    // Only the recipient can mark it read
    let response = app.send(put_request_with_auth(&uri, &guest.token)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(put_request_with_auth(&uri, &host.token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["is_read"], true);

    let response = app
        .send(get_request_with_auth("/api/v1/notifications", &host.token))
        .await;
    let body = parse_response_body(response).await;
    assert_eq!(body["unread_count"], 0);
}

#[tokio::test]
async fn test_mark_unknown_notification_read() {
    let app = create_test_app();
    let user = app.user();

    let response = app
        .send(put_request_with_auth(
            &format!("/api/v1/notifications/{}/read", Uuid::new_v4()),
            &user.token,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_notifications_empty() {
    let app = create_test_app();
    let user = app.user();

    let response = app
        .send(get_request_with_auth("/api/v1/notifications", &user.token))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    assert_eq!(body["unread_count"], 0);
}
