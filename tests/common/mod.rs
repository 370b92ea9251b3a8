//! Common test utilities
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use balance_service::{
    server, BalanceService, DynBalanceStore, MemoryBalanceStore, PgBalanceStore, ServiceSettings,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::util::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub report_dir: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.report_dir).ok();
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn msg(&self) -> String {
        self.json()["msg"].as_str().unwrap_or_default().to_string()
    }
}

/// Scratch directory under the system temp dir
pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("balance-test-{}", uuid::Uuid::new_v4()))
}

fn build_app(store: DynBalanceStore, history_page_size: i64) -> TestApp {
    let report_dir = scratch_dir();
    let service = BalanceService::new(
        store,
        ServiceSettings {
            history_page_size,
            report_directory: report_dir.clone(),
        },
    );

    TestApp {
        router: server::build_router(service, Duration::from_secs(5)),
        report_dir,
    }
}

/// Full router over a fresh in-memory ledger
pub fn memory_app() -> TestApp {
    memory_app_with_page_size(100)
}

pub fn memory_app_with_page_size(history_page_size: i64) -> TestApp {
    build_app(Arc::new(MemoryBalanceStore::new()), history_page_size)
}

/// In-memory ledger whose clock is stopped at `now`
pub fn memory_app_at(now: DateTime<Utc>) -> TestApp {
    build_app(Arc::new(MemoryBalanceStore::with_clock(move || now)), 100)
}

/// Full router over a migrated and emptied Postgres database
pub async fn postgres_app() -> TestApp {
    let pool = setup_test_db().await;
    build_app(Arc::new(PgBalanceStore::new(pool)), 100)
}

pub async fn send(app: &TestApp, method: &str, uri: &str, body: Option<&str>) -> TestResponse {
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> TestResponse {
    send(app, "GET", uri, None).await
}

pub async fn post(app: &TestApp, uri: &str, body: &str) -> TestResponse {
    send(app, "POST", uri, Some(body)).await
}

/// Setup test database - apply migrations and truncate ledger tables
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    balance_service::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    sqlx::query("TRUNCATE TABLE history, transactions, services, users RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    pool
}
