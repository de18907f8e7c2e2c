#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use tutorly_backend::config::Config;
use tutorly_backend::services::llm_provider::{LLMConfig, LLMProvider};

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestApp {
    pub router: Router,
    _dir: tempfile::TempDir,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(LLMConfig::mock(), |_| {}).await
}

pub async fn create_test_app_with(llm: LLMConfig, tweak: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::for_database(dir.path().join("tutorly.db"));
    config.admin_token = Some(ADMIN_TOKEN.to_string());
    tweak(&mut config);

    let router = tutorly_backend::create_app_with(config, LLMProvider::new(llm))
        .await
        .unwrap();
    TestApp { router, _dir: dir }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, user: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, &[("x-user-id", user)], None)
            .await
    }

    pub async fn post(&self, uri: &str, user: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, &[("x-user-id", user)], Some(body))
            .await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(method, uri, &[("x-admin-token", ADMIN_TOKEN)], Some(body))
            .await
    }

    /// Creates a lesson through the admin API and returns its id.
    pub async fn seed_lesson(&self, title: &str, premium: bool, cards: usize) -> String {
        let cards: Vec<Value> = (0..cards)
            .map(|i| {
                json!({
                    "prompt": format!("{title} prompt {i}"),
                    "answer": format!("{title} answer {i}"),
                    "topic": if i % 2 == 0 { "even" } else { "odd" },
                })
            })
            .collect();
        let (status, body) = self
            .admin(
                Method::POST,
                "/api/admin/lessons",
                json!({
                    "title": title,
                    "topic": "general",
                    "premium": premium,
                    "cards": cards,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn set_plan(&self, user: &str, tier: &str, status: &str) {
        let (code, body) = self
            .admin(
                Method::PUT,
                &format!("/api/admin/users/{user}/plan"),
                json!({ "tier": tier, "status": status }),
            )
            .await;
        assert_eq!(code, StatusCode::OK, "{body}");
    }
}
