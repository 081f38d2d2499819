use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use docsift::{api, AnalyzerConfig, BatchIndexer, IndexStore, SearchSettings, Searcher, SourceDocument};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn build_app() -> Router {
    let store = Arc::new(IndexStore::in_memory(AnalyzerConfig::default()).unwrap());
    BatchIndexer::new(&store)
        .index(vec![
            Ok(SourceDocument::new("docs/cats.html", "Cats", "cats are great pets", "docs/cats.html")),
            Ok(SourceDocument::new("docs/dogs.html", "Dogs", "dogs are loyal pets", "docs/dogs.html")),
        ])
        .unwrap();

    let searcher = Arc::new(Searcher::new(store, SearchSettings::default()));
    api::create_router(searcher, 10)
}

async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn search_returns_ranked_snippets() {
    let (status, json) = call(build_app(), "/search?q=pets").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let results = json["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], "docs/cats.html");
    assert_eq!(results[0]["title"], "Cats");
    assert_eq!(results[0]["snippet"], "cats are great <mark>pets</mark>");
    assert_eq!(results[1]["id"], "docs/dogs.html");
}

#[tokio::test]
async fn search_respects_limit() {
    let (_, json) = call(build_app(), "/search?q=pets&limit=1").await;
    assert_eq!(json["data"]["total"], 1);
}

#[tokio::test]
async fn bad_limit_uses_error_envelope() {
    let (status, json) = call(build_app(), "/search?q=pets&limit=x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["message"].as_str().unwrap().starts_with("malformed input"));
}

#[tokio::test]
async fn no_results_is_success() {
    let (status, json) = call(build_app(), "/search?q=elephant").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 0);

    let (status, json) = call(build_app(), "/search").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn document_lookup_by_path_id() {
    let (status, json) = call(build_app(), "/documents/docs/dogs.html").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["title"], "Dogs");
    assert_eq!(json["data"]["length"], 5);

    let (status, json) = call(build_app(), "/documents/missing.html").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn stats_and_health() {
    let (status, json) = call(build_app(), "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_documents"], 2);
    assert_eq!(json["data"]["avg_document_length"], 5.0);

    let (status, json) = call(build_app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], "OK");
}
