//! Integration tests for the Souk catalog.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests (in-memory storage, no services needed)
//! cargo test -p souk-integration-tests
//!
//! # Including PostgreSQL-backed tests
//! DATABASE_URL=postgres://localhost/souk_test cargo test -p souk-integration-tests -- --ignored
//! ```
//!
//! The helpers here build the same router the server runs, backed by
//! in-memory repositories and blob storage, and drive it with
//! `tower::ServiceExt::oneshot`.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::io::Cursor;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

use souk_catalog::config::CatalogConfig;
use souk_catalog::db::{MemoryHeartRepository, MemoryProductRepository, ProductRepository};
use souk_catalog::images::MemoryBlobStore;
use souk_catalog::middleware::USER_ID_HEADER;
use souk_catalog::routes;
use souk_catalog::state::AppState;
use souk_core::UserId;

const BOUNDARY: &str = "souk-test-boundary";

/// A catalog app running on in-memory storage.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub blobs: Arc<MemoryBlobStore>,
}

/// Status, content type, and raw body of a response.
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    /// The body parsed as JSON (`Null` when empty).
    #[must_use]
    pub fn json(&self) -> Value {
        if self.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&self.body).unwrap()
        }
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_products(Arc::new(MemoryProductRepository::new())).await
    }

    /// An app backed by the given product repository.
    pub async fn with_products(products: Arc<dyn ProductRepository>) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        let state = AppState::from_parts(
            CatalogConfig::default(),
            None,
            products,
            Arc::new(MemoryHeartRepository::new()),
            blobs.clone(),
        )
        .await
        .unwrap();

        Self {
            router: routes::app(state.clone()),
            state,
            blobs,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            content_type,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn get_as(&self, uri: &str, user: UserId) -> TestResponse {
        let request = Request::get(uri)
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Send a request with an empty body as `user`.
    pub async fn call_as(&self, method: Method, uri: &str, user: UserId) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, user.to_string())
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// POST a multipart form, as `user` when given.
    pub async fn post_form(
        &self,
        uri: &str,
        user: Option<UserId>,
        form: MultipartForm,
    ) -> TestResponse {
        let mut request = Request::post(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(user) = user {
            request = request.header(USER_ID_HEADER, user.to_string());
        }
        self.send(request.body(Body::from(form.finish())).unwrap())
            .await
    }

    /// Create a product with a valid form and return its JSON.
    pub async fn create_product(&self, seller: UserId, form: MultipartForm) -> Value {
        let response = self.post_form("/products", Some(seller), form).await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "create failed: {}",
            String::from_utf8_lossy(&response.body)
        );
        response.json()
    }
}

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A complete product form at the given coordinates.
    #[must_use]
    pub fn product(name: &str, lng: f64, lat: f64) -> Self {
        Self::new()
            .text("name", name)
            .text("description", "Lovingly used")
            .text("price", "25")
            .text("location[type]", "Point")
            .text("location[address]", "12 Market Row")
            .text("location[coordinates][0]", &lng.to_string())
            .text("location[coordinates][1]", &lat.to_string())
    }

    #[must_use]
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    #[must_use]
    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

/// A solid-color PNG of the given size.
#[must_use]
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([30, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
