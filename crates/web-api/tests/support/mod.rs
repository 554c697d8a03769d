#![allow(dead_code)]

use std::sync::Arc;

use application::{ServiceContainer, StoreSet, SystemClock};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use config::AppConfig;
use domain::UserId;
use infrastructure::Infrastructure;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use web_api::{router, AppState, JwtService};

pub struct TestServer {
    pub router: Router,
    pub jwt: Arc<JwtService>,
}

pub fn build_server() -> TestServer {
    let mut config = AppConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;

    let infra = Infrastructure::in_memory(config.feed.capacity);
    let stores = StoreSet {
        feed: infra.feed,
        interests: infra.interests,
        conversations: infra.conversations,
        messages: infra.messages,
        presence: infra.presence,
        notifications: infra.notifications,
    };
    let services = ServiceContainer::new(stores, Arc::new(SystemClock), &config);
    let jwt = Arc::new(JwtService::new(&config.auth));

    TestServer {
        router: router(AppState::new(services, jwt.clone())),
        jwt,
    }
}

impl TestServer {
    pub fn token_for(&self, user: UserId) -> String {
        self.jwt
            .issue_token(user, chrono::Duration::minutes(10))
            .expect("issue token")
    }

    /// 发送一个请求，返回状态码与 JSON 响应体（空响应体为 `Value::Null`）
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.token_for(user)),
            );
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }
}

pub fn user() -> UserId {
    UserId::from(Uuid::new_v4())
}
