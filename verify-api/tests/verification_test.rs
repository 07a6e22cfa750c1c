//! Integration tests for the verification code lifecycle.

mod common;

use common::{read_json, wrong_code, TestApp};
use serde_json::json;

#[tokio::test]
async fn start_email_rejects_non_student_domain() {
    let app = TestApp::spawn().await;

    let res = app
        .post(
            "/auth/bot/start-email",
            json!({ "email": "someone@gmail.com", "telegramId": "100" }),
        )
        .await;

    assert_eq!(res.status(), 400);
    let body = read_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("student domain"));
    assert!(app.email.sent().is_empty());
}

#[tokio::test]
async fn start_email_rejects_malformed_email() {
    let app = TestApp::spawn().await;

    let res = app
        .post(
            "/auth/bot/start-email",
            json!({ "email": "not-an-email", "telegramId": "100" }),
        )
        .await;

    assert_eq!(res.status(), 422);
}

#[tokio::test]
async fn start_email_issues_code() {
    let app = TestApp::spawn().await;

    let res = app
        .post(
            "/auth/bot/start-email",
            json!({ "email": "Jane.Doe@Uni.EDU", "telegramId": "100" }),
        )
        .await;

    assert_eq!(res.status(), 200);
    let body = read_json(res).await;
    assert!(body["verificationId"].as_str().is_some());
    assert!(body["expiresAt"].as_str().is_some());

    let sent = app.email.sent();
    assert_eq!(sent.len(), 1);
    // Address is normalized before anything touches it.
    assert_eq!(sent[0].0, "jane.doe@uni.edu");
    assert_eq!(sent[0].1.len(), 6);
    assert!(sent[0].1.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn happy_path_verifies_and_creates_user() {
    let app = TestApp::spawn().await;

    let (verification_id, code) = app.start_verification("a@uni.edu", "100").await;

    let res = app
        .post(
            "/auth/bot/verify-email",
            json!({ "verificationId": verification_id, "code": code, "telegramId": "100" }),
        )
        .await;

    assert_eq!(res.status(), 200);
    let body = read_json(res).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["hasPassword"], false);

    let user = app
        .state
        .db
        .find_user_by_telegram_id("100")
        .await
        .unwrap()
        .expect("user should exist");
    assert!(user.email_verified);
    assert_eq!(user.email, "a@uni.edu");
    assert_eq!(user.id, body["userId"].as_str().unwrap());
}

#[tokio::test]
async fn unknown_verification_id_is_rejected() {
    let app = TestApp::spawn().await;

    let res = app
        .post(
            "/auth/bot/verify-email",
            json!({ "verificationId": "nope", "code": "123456", "telegramId": "100" }),
        )
        .await;

    assert_eq!(res.status(), 400);
    let body = read_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("Invalid verification ID"));
}

#[tokio::test]
async fn telegram_id_mismatch_is_rejected() {
    let app = TestApp::spawn().await;

    let (verification_id, code) = app.start_verification("a@uni.edu", "100").await;

    let res = app
        .post(
            "/auth/bot/verify-email",
            json!({ "verificationId": verification_id, "code": code, "telegramId": "999" }),
        )
        .await;

    assert_eq!(res.status(), 400);
    let body = read_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("Telegram ID mismatch"));
}

#[tokio::test]
async fn wrong_code_increments_attempts_until_exhausted() {
    let app = TestApp::spawn().await;

    let (verification_id, code) = app.start_verification("a@uni.edu", "100").await;
    let bad = wrong_code(&code);
    let max_attempts = app.state.config.verification.max_attempts;

    for _ in 0..max_attempts {
        let res = app
            .post(
                "/auth/bot/verify-email",
                json!({ "verificationId": verification_id, "code": bad, "telegramId": "100" }),
            )
            .await;
        assert_eq!(res.status(), 401);
    }

    // Even the right code is refused once attempts are exhausted.
    let res = app
        .post(
            "/auth/bot/verify-email",
            json!({ "verificationId": verification_id, "code": code, "telegramId": "100" }),
        )
        .await;
    assert_eq!(res.status(), 400);
    let body = read_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("Too many attempts"));
}

#[tokio::test]
async fn consumed_code_cannot_be_reused() {
    let app = TestApp::spawn().await;

    let (verification_id, code) = app.start_verification("a@uni.edu", "100").await;

    let res = app
        .post(
            "/auth/bot/verify-email",
            json!({ "verificationId": verification_id, "code": code, "telegramId": "100" }),
        )
        .await;
    assert_eq!(res.status(), 200);

    let res = app
        .post(
            "/auth/bot/verify-email",
            json!({ "verificationId": verification_id, "code": code, "telegramId": "100" }),
        )
        .await;
    assert_eq!(res.status(), 400);
    let body = read_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("already used"));
}

#[tokio::test]
async fn expired_code_is_rejected() {
    let app = TestApp::spawn().await;

    let (verification_id, code) = app.start_verification("a@uni.edu", "100").await;

    // Age the code past its TTL.
    sqlx::query("UPDATE verification_codes SET expires_at = ?1 WHERE id = ?2")
        .bind(chrono::Utc::now() - chrono::Duration::seconds(10))
        .bind(&verification_id)
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let res = app
        .post(
            "/auth/bot/verify-email",
            json!({ "verificationId": verification_id, "code": code, "telegramId": "100" }),
        )
        .await;
    assert_eq!(res.status(), 400);
    let body = read_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("expired"));
}

#[tokio::test]
async fn resend_cooldown_applies_per_email() {
    let mut config = common::test_config();
    config.verification.resend_cooldown_seconds = 60;
    let app = TestApp::spawn_with(config).await;

    let res = app
        .post(
            "/auth/bot/start-email",
            json!({ "email": "a@uni.edu", "telegramId": "100" }),
        )
        .await;
    assert_eq!(res.status(), 200);

    let res = app
        .post(
            "/auth/bot/start-email",
            json!({ "email": "a@uni.edu", "telegramId": "100" }),
        )
        .await;
    assert_eq!(res.status(), 429);
    assert!(res.headers().get("retry-after").is_some());

    // A different address is not affected.
    let res = app
        .post(
            "/auth/bot/start-email",
            json!({ "email": "b@uni.edu", "telegramId": "200" }),
        )
        .await;
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn reverifying_moves_telegram_binding() {
    let app = TestApp::spawn().await;

    let first = app.verify_user("a@uni.edu", "100").await;
    let second = app.verify_user("a@uni.edu", "200").await;
    assert_eq!(first, second);

    let user = app
        .state
        .db
        .find_user_by_telegram_id("200")
        .await
        .unwrap()
        .expect("user rebound to new chat");
    assert_eq!(user.email, "a@uni.edu");
    assert!(app
        .state
        .db
        .find_user_by_telegram_id("100")
        .await
        .unwrap()
        .is_none());
}
