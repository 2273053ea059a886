mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn app_with_webhooks(server: &MockServer) -> TestApp {
    let crm = format!("{}/crm", server.uri());
    let email = format!("{}/email", server.uri());
    TestApp::spawn_with(move |config| {
        config.crm_webhook_url = Some(crm);
        config.email_webhook_url = Some(email);
    })
    .await
}

#[tokio::test]
async fn first_signup_issues_the_shared_code_and_notifies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let app = app_with_webhooks(&server).await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/discount-signup",
            None,
            None,
            Some(json!({"email": "New@Example.com", "phone": "555-0100", "consent": true})),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["discount_code"], "MYFIRSTSERVICE");
    assert_eq!(body["discount_percent"], "10");
    assert_eq!(body["mailchimp_synced"], true);
    assert_eq!(body["email_sent"], true);
    assert!(body.get("already_used").is_none());
}

#[tokio::test]
async fn repeat_signup_within_the_window_does_not_resend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let app = app_with_webhooks(&server).await;
    app.seed_lead(
        "repeat@example.com",
        "MYFIRSTSERVICE",
        dec!(10),
        Utc::now() - Duration::hours(1),
        None,
    )
    .await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/discount-signup",
            None,
            None,
            Some(json!({"email": "repeat@example.com", "consent": true})),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["email_sent"], false);
    assert_eq!(body["discount_code"], "MYFIRSTSERVICE");
}

#[tokio::test]
async fn signup_after_the_window_resends_the_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let app = app_with_webhooks(&server).await;
    app.seed_lead(
        "longago@example.com",
        "MYFIRSTSERVICE",
        dec!(10),
        Utc::now() - Duration::hours(25),
        None,
    )
    .await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/discount-signup",
            None,
            None,
            Some(json!({"email": "longago@example.com", "consent": true})),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["email_sent"], true);
}

#[tokio::test]
async fn redeemed_lead_is_told_the_code_was_used() {
    let app = TestApp::spawn().await;
    app.seed_lead(
        "spent@example.com",
        "MYFIRSTSERVICE",
        dec!(10),
        Utc::now() - Duration::days(5),
        Some(Utc::now() - Duration::days(2)),
    )
    .await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/discount-signup",
            None,
            None,
            Some(json!({"email": "spent@example.com", "consent": true})),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["already_used"], true);
    assert_eq!(body["email_sent"], false);
}

#[tokio::test]
async fn malformed_email_is_rejected() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/discount-signup",
            None,
            None,
            Some(json!({"email": "not-an-email", "consent": true})),
        )
        .await;

    assert_eq!(status, 400);
}
