#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;

use marquee_api::auth::hash_password;
use marquee_api::config::{AppConfig, Environment};
use marquee_api::database::models::{Scope, User};
use marquee_api::database::Models;
use marquee_api::mailer::{Email, MailError, Mailer};
use marquee_api::routes::router;
use marquee_api::state::AppState;

pub const PASSWORD: &str = "pa55word-for-tests";

/// Mailer that keeps every message for inspection
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Development preset with the limiter off so tests don't trip it by accident
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::for_environment(Environment::Development);
    config.limiter.enabled = false;
    config
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config())
}

pub fn spawn_app_with(config: AppConfig) -> TestApp {
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(config, Models::memory(), mailer.clone());
    let router = router(state.clone());
    TestApp {
        state,
        mailer,
        router,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json)?))?,
            None => builder.body(Body::empty())?,
        };
        self.send_from(request, "127.0.0.1:40000".parse()?).await
    }

    /// Sends a prebuilt request as if it came from `peer`.
    pub async fn send_from(&self, request: Request<Body>, peer: SocketAddr) -> Result<TestResponse> {
        let response = self
            .router
            .clone()
            .layer(MockConnectInfo(peer))
            .oneshot(request)
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(TestResponse {
            status,
            headers,
            body,
        })
    }

    /// Inserts a user with the given permissions and returns it with a live
    /// authentication token.
    pub async fn seed_user(
        &self,
        email: &str,
        activated: bool,
        permissions: &[&str],
    ) -> Result<(User, String)> {
        let models = &self.state.models;
        let user = models
            .users
            .insert(&User {
                id: 0,
                created_at: Utc::now(),
                name: "Seeded User".to_string(),
                email: email.to_string(),
                password_hash: hash_password(PASSWORD)?,
                activated,
                version: 0,
            })
            .await?;
        models.permissions.add_for_user(user.id, permissions).await?;
        let token = models
            .tokens
            .new_token(user.id, Duration::hours(1), Scope::Authentication)
            .await?;
        Ok((user, token.plaintext))
    }

    pub fn sent_mail(&self) -> Vec<Email> {
        self.mailer.sent.lock().unwrap().clone()
    }
}

impl TestResponse {
    pub fn vary(&self) -> Vec<String> {
        self.headers
            .get_all(header::VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(',').map(|s| s.trim().to_string()))
            .collect()
    }
}
