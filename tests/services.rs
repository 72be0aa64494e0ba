// Integration tests for the HTTP services hydration depends on: the card
// extractor, the browser rendering API and the public AppView.
//
// Each service is stood up as a local axum router that records what it
// was asked for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use blue_report::bluesky::{PostLookup, PublicAtpClient};
use blue_report::card::{apple_news_destination, CardFetcher, CardSource};
use blue_report::rendering::BrowserRenderingClient;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[derive(Clone, Default)]
struct Calls(Arc<AtomicUsize>);

impl Calls {
    fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

fn og_response() -> Value {
    json!({
        "success": true,
        "result": [
            {"selector": "meta[property=\"og:title\"]",
             "results": [{"attributes": [{"name": "content", "value": "Rendered Title"}], "text": ""}]},
            {"selector": "meta[property=\"og:image\"]",
             "results": [{"attributes": [{"name": "content", "value": "https://img.example/og.jpg"}], "text": ""}]}
        ]
    })
}

// ============================================================
// Card extractor
// ============================================================

#[tokio::test]
async fn cardyb_card_is_used_when_complete() {
    let calls = Calls::default();
    let app = Router::new()
        .route(
            "/v1/extract",
            get(
                |State(calls): State<Calls>, Query(q): Query<HashMap<String, String>>| async move {
                    calls.bump();
                    Json(json!({
                        "error": "",
                        "url": q.get("url").cloned().unwrap_or_default(),
                        "title": "Extracted",
                        "image": "https://img.example/a.jpg"
                    }))
                },
            ),
        )
        .with_state(calls.clone());
    let base = serve(app).await;

    let cards = CardFetcher::new(&base, None).unwrap();
    let card = cards.card_metadata("https://example.com/a").await;
    assert_eq!(card.title, "Extracted");
    assert_eq!(card.image_url, "https://img.example/a.jpg");
    assert_eq!(calls.count(), 1);
}

#[tokio::test]
async fn rendering_fills_what_the_extractor_missed() {
    let app = Router::new()
        .route(
            "/v1/extract",
            get(|| async { Json(json!({"title": "From Extractor", "image": ""})) }),
        )
        .route(
            "/accounts/acct/browser-rendering/scrape",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer secret")
                );
                assert_eq!(body["url"], "https://example.com/b");
                assert_eq!(body["elements"].as_array().map(Vec::len), Some(2));
                Json(og_response())
            }),
        );
    let base = serve(app).await;

    let rendering = Arc::new(BrowserRenderingClient::new(&base, "acct", "secret").unwrap());
    let cards = CardFetcher::new(&base, Some(rendering)).unwrap();
    let card = cards.card_metadata("https://example.com/b").await;
    assert_eq!(card.title, "From Extractor");
    assert_eq!(card.image_url, "https://img.example/og.jpg");
}

#[tokio::test]
async fn extractor_failure_degrades_to_empty_card() {
    let app = Router::new().route(
        "/v1/extract",
        get(|| async { StatusCode::BAD_GATEWAY }),
    );
    let base = serve(app).await;

    let cards = CardFetcher::new(&base, None).unwrap();
    assert!(cards.fetch_cardyb("https://example.com/c").await.is_err());
    let card = cards.card_metadata("https://example.com/c").await;
    assert!(card.title.is_empty());
    assert!(card.image_url.is_empty());
}

// ============================================================
// Browser rendering
// ============================================================

#[tokio::test]
async fn rendering_retries_after_rate_limit() {
    let calls = Calls::default();
    let app = Router::new()
        .route(
            "/accounts/acct/browser-rendering/scrape",
            post(|State(calls): State<Calls>| async move {
                if calls.bump() == 1 {
                    return StatusCode::TOO_MANY_REQUESTS.into_response();
                }
                Json(og_response()).into_response()
            }),
        )
        .with_state(calls.clone());
    let base = serve(app).await;

    let rendering = BrowserRenderingClient::new(&base, "acct", "secret").unwrap();
    let response = rendering
        .scrape("https://example.com/d", &["meta[property=\"og:title\"]"])
        .await
        .unwrap();
    assert_eq!(
        response
            .first_attribute("meta[property=\"og:title\"]", "content")
            .as_deref(),
        Some("Rendered Title")
    );
    assert_eq!(calls.count(), 2);
}

#[tokio::test]
async fn rendering_reports_unsuccessful_scrapes() {
    let app = Router::new().route(
        "/accounts/acct/browser-rendering/scrape",
        post(|| async { Json(json!({"success": false, "result": []})) }),
    );
    let base = serve(app).await;

    let rendering = BrowserRenderingClient::new(&base, "acct", "secret").unwrap();
    assert!(rendering.scrape("https://example.com/e", &["a"]).await.is_err());
}

#[tokio::test]
async fn apple_news_page_yields_no_destination_without_publisher_link() {
    let app = Router::new().route(
        "/accounts/acct/browser-rendering/scrape",
        post(|| async {
            Json(json!({
                "success": true,
                "result": [{"selector": "a", "results": [
                    {"attributes": [{"name": "href", "value": "https://www.apple.com/apple-news/"}]}
                ]}]
            }))
        }),
    );
    let base = serve(app).await;

    let rendering = BrowserRenderingClient::new(&base, "acct", "secret").unwrap();
    let destination = apple_news_destination(&rendering, "https://apple.news/AbC")
        .await
        .unwrap();
    assert!(destination.is_none());
}

// ============================================================
// Public AppView
// ============================================================

async fn get_posts(Query(q): Query<Vec<(String, String)>>) -> Response {
    let uri = q
        .into_iter()
        .find(|(k, _)| k == "uris")
        .map(|(_, v)| v)
        .unwrap_or_default();
    if uri.ends_with("/deleted") {
        return Json(json!({"posts": []})).into_response();
    }
    if uri.ends_with("/error") {
        return (StatusCode::BAD_REQUEST, "InvalidRequest").into_response();
    }
    Json(json!({
        "posts": [{
            "uri": uri,
            "author": {"handle": "alice.bsky.social", "displayName": "Alice"},
            "record": {"text": "worth a read", "langs": ["en"], "createdAt": "2024-06-01T12:00:00Z"},
            "likeCount": 77
        }]
    }))
    .into_response()
}

#[tokio::test]
async fn post_lookup_reads_get_posts() {
    let app = Router::new().route("/xrpc/app.bsky.feed.getPosts", get(get_posts));
    let base = serve(app).await;
    let client = PublicAtpClient::new(&base).unwrap();

    let view = client
        .get_post("at://did:plc:a/app.bsky.feed.post/3kabc")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.uri, "at://did:plc:a/app.bsky.feed.post/3kabc");
    assert_eq!(view.author.display_name, "Alice");
    assert_eq!(view.like_count, 77);
    assert_eq!(view.rkey(), "3kabc");

    assert!(client
        .get_post("at://did:plc:a/app.bsky.feed.post/deleted")
        .await
        .unwrap()
        .is_none());
    assert!(client
        .get_post("at://did:plc:a/app.bsky.feed.post/error")
        .await
        .is_err());
}
