use std::path::PathBuf;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use medprice::server::{AppState, router};
use medprice::store::Store;
use medprice::types::{Source, SourceRecord};

/// A database in a temporary directory, removed when dropped.
pub struct TestDb {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("medicines.db");
        Self { _dir: dir, path }
    }

    /// Seeds both source tables with a small, known catalogue.
    pub fn seeded() -> Self {
        let db = Self::new();
        let store = Store::open(&db.path).expect("Failed to open store");

        for (source, name, brand, price, discount) in [
            (Source::Pharmeasy, "paracetamol", "Cipla", "₹50", "10% off"),
            (Source::Pharmeasy, "crocin", "GSK", "₹30", "5% off"),
            (Source::Apollo, "dolo 650", "Micro Labs", "₹25", "20% off"),
            (Source::Apollo, "zincovit", "Apex", "₹100", "5% CB"),
        ] {
            store
                .insert_source_record(source, &row(name, brand, price, discount))
                .expect("Failed to insert row");
        }
        db
    }

    /// Fills the apollo table with `count` distinct products.
    pub fn with_apollo_rows(count: usize) -> Self {
        let db = Self::new();
        let store = Store::open(&db.path).expect("Failed to open store");
        for i in 0..count {
            store
                .insert_source_record(
                    Source::Apollo,
                    &row(&format!("medicine {i}"), "Generic", "₹10", "5% off"),
                )
                .expect("Failed to insert row");
        }
        db
    }

    pub fn app(&self) -> Router {
        router(AppState::new(&self.path))
    }
}

pub fn row(name: &str, brand: &str, price: &str, discount: &str) -> SourceRecord {
    SourceRecord {
        name: Some(name.to_string()),
        brand: Some(brand.to_string()),
        price: Some(price.to_string()),
        discount: Some(discount.to_string()),
        ..Default::default()
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("Response body is not JSON")
}

pub async fn expect_json(response: Response<Body>, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}

/// The entry for `(name, brand)` in a combined-view response.
pub fn find<'a>(rows: &'a Value, name: &str, brand: &str) -> &'a Value {
    rows.as_array()
        .expect("Expected a JSON array")
        .iter()
        .find(|r| r["name"] == name && r["brand"] == brand)
        .unwrap_or_else(|| panic!("No row for {name} ({brand})"))
}
