//! Text and proximity search through the HTTP API.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::Value;
use souk_core::{GeoPoint, UserId};
use souk_integration_tests::{MultipartForm, TestApp};

fn names(results: &Value) -> Vec<String> {
    results
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn test_text_search_ranks_by_relevance() {
    let app = TestApp::new().await;
    let seller = UserId::generate();
    app.create_product(
        seller,
        MultipartForm::product("Garden chair", 0.0, 0.0).text("description", "Folding chair"),
    )
    .await;
    app.create_product(
        seller,
        MultipartForm::product("Desk", 0.0, 0.0)
            .text("description", "Solid oak desk, sold with a matching lamp"),
    )
    .await;
    app.create_product(
        seller,
        MultipartForm::product("Reading lamp", 0.0, 0.0)
            .text("description", "A lamp for reading; lamps like this are rare"),
    )
    .await;

    let results = app.get("/api/search?q=lamps").await;
    assert_eq!(results.status, StatusCode::OK);
    let found = names(&results.json());
    assert_eq!(found.len(), 2);
    assert_eq!(found[0], "Reading lamp");
}

#[tokio::test]
async fn test_text_search_without_match_is_empty() {
    let app = TestApp::new().await;
    app.create_product(UserId::generate(), MultipartForm::product("Lamp", 0.0, 0.0))
        .await;

    for uri in ["/api/search?q=submarine", "/api/search?q=", "/api/search"] {
        let response = app.get(uri).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.json().as_array().unwrap().is_empty(), "{uri}");
    }
}

#[tokio::test]
async fn test_text_search_reflects_updates_and_deletes() {
    let app = TestApp::new().await;
    let seller = UserId::generate();
    let product = app
        .create_product(seller, MultipartForm::product("Brass lamp", 0.0, 0.0))
        .await;
    let uri = format!("/products/{}", product["id"].as_str().unwrap());

    app.post_form(&uri, Some(seller), MultipartForm::new().text("name", "Copper kettle"))
        .await;
    assert!(names(&app.get("/api/search?q=brass").await.json()).is_empty());
    assert_eq!(
        names(&app.get("/api/search?q=kettle").await.json()),
        ["Copper kettle"]
    );

    app.call_as(axum::http::Method::DELETE, &uri, seller).await;
    assert!(names(&app.get("/api/search?q=kettle").await.json()).is_empty());
}

#[tokio::test]
async fn test_near_search_orders_by_distance_and_limits() {
    let app = TestApp::new().await;
    let seller = UserId::generate();
    let spots = [
        ("Paris", 2.35, 48.85),
        ("Soho", -0.13, 51.51),
        ("Oxford", -1.26, 51.75),
        ("Brighton", -0.14, 50.82),
    ];
    for (name, lng, lat) in spots {
        app.create_product(seller, MultipartForm::product(name, lng, lat))
            .await;
    }

    let response = app.get("/api/products/near?lng=-0.1&lat=51.5&limit=3").await;
    assert_eq!(response.status, StatusCode::OK);
    let results = response.json();
    assert_eq!(names(&results), ["Soho", "Brighton", "Oxford"]);

    let origin = GeoPoint::new(-0.1, 51.5).unwrap();
    let distances: Vec<f64> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            let point: GeoPoint =
                serde_json::from_value(p["location"]["coordinates"].clone()).unwrap();
            origin.distance_meters(&point)
        })
        .collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));

    // reduced projection only
    let first = &results[0];
    assert!(first.get("slug").is_some());
    assert!(first.get("id").is_none());
    assert!(first.get("seller").is_none());
}

#[tokio::test]
async fn test_near_search_default_limit() {
    let app = TestApp::new().await;
    let seller = UserId::generate();
    for i in 0..12 {
        let lng = -0.1 + f64::from(i) * 0.01;
        app.create_product(seller, MultipartForm::product(&format!("Stall {i}"), lng, 51.5))
            .await;
    }
    let results = app.get("/api/products/near?lng=-0.1&lat=51.5").await.json();
    assert_eq!(results.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_near_search_rejects_malformed_coordinates() {
    let app = TestApp::new().await;
    for uri in [
        "/api/products/near?lng=abc&lat=51.5",
        "/api/products/near?lng=-0.1",
        "/api/products/near?lng=-0.1&lat=95",
        "/api/products/near?lng=-0.1&lat=51.5&limit=many",
    ] {
        assert_eq!(app.get(uri).await.status, StatusCode::BAD_REQUEST, "{uri}");
    }
}
