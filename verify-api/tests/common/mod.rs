//! Test helpers for verify-api integration tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use http_body_util::BodyExt;
use service_core::config::Environment;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use std::sync::Arc;
use tower::util::ServiceExt;
use verify_api::{
    build_router,
    config::{
        ApiConfig, DatabaseConfig, RateLimitConfig, SessionConfig, SmtpConfig, VerificationConfig,
    },
    db::create_test_pool,
    services::{Database, JwtService, MockEmailService},
    AppState,
};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub email: Arc<MockEmailService>,
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        environment: Environment::Dev,
        service_name: "verify-api-test".to_string(),
        log_level: "warn".to_string(),
        port: 0,
        frontend_url: "http://frontend.test".to_string(),
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            user: "noreply@localhost".to_string(),
            password: String::new(),
            from_email: "noreply@localhost".to_string(),
        },
        session: SessionConfig {
            jwt_secret: "test-session-secret".to_string(),
            url_ttl_seconds: 120,
        },
        verification: VerificationConfig {
            student_domains: vec![".edu".to_string(), ".ac.uk".to_string()],
            code_ttl_seconds: 900,
            max_attempts: 5,
            // No cooldown by default so tests can issue codes freely.
            resend_cooldown_seconds: 0,
            pepper: "test-pepper".to_string(),
        },
        rate_limit: RateLimitConfig {
            start_email_attempts: 1000,
            start_email_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: ApiConfig) -> Self {
        let pool = create_test_pool().await.expect("in-memory pool");
        let db = Database::new(pool);
        let email = Arc::new(MockEmailService::new());
        let jwt = JwtService::new(&config.session);

        let start_email_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.start_email_attempts,
            config.rate_limit.start_email_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        let state = AppState {
            config,
            db,
            email: email.clone(),
            jwt,
            start_email_rate_limiter,
            ip_rate_limiter,
        };

        let router = build_router(state.clone());

        Self {
            router,
            state,
            email,
        }
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Response<Body> {
        self.request(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_from_ip(
        &self,
        path: &str,
        ip: &str,
        body: serde_json::Value,
    ) -> Response<Body> {
        self.request(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .header("x-forwarded-for", ip)
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, path: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .method("GET")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed")
    }

    /// Run start-email and return (verification_id, code from the mock inbox).
    pub async fn start_verification(&self, email: &str, telegram_id: &str) -> (String, String) {
        let res = self
            .post(
                "/auth/bot/start-email",
                serde_json::json!({ "email": email, "telegramId": telegram_id }),
            )
            .await;
        assert_eq!(res.status(), 200, "start-email should succeed");
        let body = read_json(res).await;
        let verification_id = body["verificationId"].as_str().unwrap().to_string();
        let code = self.email.last_code().expect("code should have been sent");
        (verification_id, code)
    }

    /// Complete a full verification for the given identity.
    pub async fn verify_user(&self, email: &str, telegram_id: &str) -> String {
        let (verification_id, code) = self.start_verification(email, telegram_id).await;
        let res = self
            .post(
                "/auth/bot/verify-email",
                serde_json::json!({
                    "verificationId": verification_id,
                    "code": code,
                    "telegramId": telegram_id,
                }),
            )
            .await;
        assert_eq!(res.status(), 200, "verify-email should succeed");
        let body = read_json(res).await;
        body["userId"].as_str().unwrap().to_string()
    }
}

pub async fn read_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body read failed")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is not valid JSON")
}

/// A code guaranteed to differ from `actual` while staying 6 digits.
pub fn wrong_code(actual: &str) -> String {
    if actual == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}
