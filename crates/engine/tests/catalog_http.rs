use std::net::SocketAddr;

use axum::Router;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use wallshift_engine::catalog::CatalogClient;
use wallshift_engine::client::create_client;
use wallshift_engine::error::ErrorKind;
use wallshift_engine::retry::RetryPolicy;
use wallshift_engine::validate::Validator;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

fn local_validator() -> Validator {
    Validator::new(vec!["127.0.0.1".to_string()], MAX_FILE_SIZE)
}

fn catalog_for(addr: SocketAddr) -> CatalogClient {
    CatalogClient::new(
        create_client(std::time::Duration::from_secs(5)).unwrap(),
        format!("http://{addr}"),
        local_validator(),
        RetryPolicy::new(0),
    )
}

async fn start_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn resolve_returns_validated_entry() {
    async fn entry(Path(id): Path<String>) -> impl IntoResponse {
        let id = id.trim_end_matches(".json").to_string();
        axum::Json(serde_json::json!({
            "id": id,
            "path": format!("http://127.0.0.1/images/{id}.png"),
            "fileSize": 12345,
        }))
    }
    let addr = start_server(Router::new().route("/images/{id}", get(entry))).await;

    let catalog = catalog_for(addr);
    let entry = catalog
        .resolve("sunset-42", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(entry.identifier, "sunset-42");
    assert_eq!(entry.url, "http://127.0.0.1/images/sunset-42.png");
    assert_eq!(entry.size_hint, Some(12345));
    assert_eq!(entry.format.as_deref(), Some("png"));
}

#[tokio::test]
async fn resolve_prefers_path_over_other_fields() {
    async fn entry() -> impl IntoResponse {
        axum::Json(serde_json::json!({
            "thumbnailUrl": "http://127.0.0.1/thumb.jpg",
            "url": "http://127.0.0.1/full.jpg",
            "path": "http://127.0.0.1/original.jpg",
        }))
    }
    let addr = start_server(Router::new().route("/images/{id}", get(entry))).await;

    let entry = catalog_for(addr)
        .resolve("abc", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(entry.url, "http://127.0.0.1/original.jpg");
}

#[tokio::test]
async fn resolve_skips_empty_url_fields() {
    async fn entry() -> impl IntoResponse {
        axum::Json(serde_json::json!({
            "path": "",
            "url": "http://127.0.0.1/full.jpg",
        }))
    }
    let addr = start_server(Router::new().route("/images/{id}", get(entry))).await;

    let entry = catalog_for(addr)
        .resolve("abc", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(entry.url, "http://127.0.0.1/full.jpg");
}

#[tokio::test]
async fn missing_entry_is_an_api_error() {
    let addr = start_server(Router::new()).await;

    let err = catalog_for(addr)
        .resolve("nope", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ApiError);
}

#[tokio::test]
async fn entry_without_url_field_is_an_api_error() {
    async fn entry() -> impl IntoResponse {
        axum::Json(serde_json::json!({ "id": "abc", "title": "no links here" }))
    }
    let addr = start_server(Router::new().route("/images/{id}", get(entry))).await;

    let err = catalog_for(addr)
        .resolve("abc", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ApiError);
}

#[tokio::test]
async fn entry_pointing_off_allow_list_is_rejected() {
    async fn entry() -> impl IntoResponse {
        axum::Json(serde_json::json!({ "path": "https://evil.example.com/x.jpg" }))
    }
    let addr = start_server(Router::new().route("/images/{id}", get(entry))).await;

    let err = catalog_for(addr)
        .resolve("abc", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOrUntrustedUrl);
}

#[tokio::test]
async fn invalid_identifier_never_hits_the_network() {
    // Deliberately unroutable base URL: validation must fail first.
    let catalog = CatalogClient::new(
        create_client(std::time::Duration::from_secs(5)).unwrap(),
        "http://127.0.0.1:1",
        local_validator(),
        RetryPolicy::new(0),
    );

    let err = catalog
        .resolve("../../etc/passwd", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
}

#[tokio::test]
async fn connection_refused_is_a_network_error() {
    // Bind and immediately drop to get a port nothing listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let err = catalog_for(addr)
        .resolve("abc", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkError);
}

#[tokio::test]
async fn failed_lookup_is_retried_before_giving_up() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let app = Router::new().route(
        "/images/{id}",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }),
    );
    let addr = start_server(app).await;

    let catalog = CatalogClient::new(
        create_client(std::time::Duration::from_secs(5)).unwrap(),
        format!("http://{addr}"),
        local_validator(),
        RetryPolicy::new(1),
    );

    let err = catalog
        .resolve("abc", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ApiError);
    // One initial attempt plus one retry.
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn pick_random_returns_a_listed_identifier() {
    async fn list() -> impl IntoResponse {
        axum::Json(serde_json::json!(["alpha", "beta", "gamma"]))
    }
    let addr = start_server(Router::new().route("/images.json", get(list))).await;

    let identifier = catalog_for(addr)
        .pick_random(&CancellationToken::new())
        .await
        .unwrap();
    assert!(["alpha", "beta", "gamma"].contains(&identifier.as_str()));
}

#[tokio::test]
async fn pick_random_from_empty_list_is_a_network_error() {
    async fn list() -> impl IntoResponse {
        axum::Json(serde_json::json!([]))
    }
    let addr = start_server(Router::new().route("/images.json", get(list))).await;

    let err = catalog_for(addr)
        .pick_random(&CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkError);
}

#[tokio::test]
async fn cancelled_lookup_stops_immediately() {
    let addr = start_server(Router::new()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = catalog_for(addr).resolve("abc", &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DownloadFailed);
}
