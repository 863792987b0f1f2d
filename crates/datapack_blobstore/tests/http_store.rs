use std::{collections::HashMap, sync::Arc};

use assert_matches::assert_matches;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use datapack_blobstore::{BlobOrchestrator, BlobStore, BlobStoreError, HttpBlobStore, PutOutcome};
use datapack_types::{GenerateOptions, Manifest};
use parking_lot::Mutex;
use url::Url;

type Blobs = Arc<Mutex<HashMap<String, Bytes>>>;

async fn get_blob(State(blobs): State<Blobs>, Path(hash): Path<String>) -> Result<Bytes, StatusCode> {
    blobs.lock().get(&hash).cloned().ok_or(StatusCode::NOT_FOUND)
}

async fn put_blob(
    State(blobs): State<Blobs>,
    Path(hash): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if headers.get("authorization").is_none() {
        return StatusCode::UNAUTHORIZED;
    }
    blobs.lock().insert(hash, body);
    StatusCode::CREATED
}

/// Serves `/blob/{hash}`. Uploads require an `Authorization` header.
async fn serve() -> (Url, Blobs) {
    let blobs = Blobs::default();
    let app = Router::new()
        .route("/blob/{hash}", get(get_blob).put(put_blob))
        .route("/broken/blob/{hash}", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .with_state(blobs.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (Url::parse(&format!("http://{addr}/")).unwrap(), blobs)
}

fn client(token: Option<&str>) -> reqwest_middleware::ClientWithMiddleware {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
    }
    let client = reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .unwrap();
    reqwest_middleware::ClientBuilder::new(client).build()
}

const KEY: &str = "/blob/aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

#[tokio::test]
async fn test_put_has_get() {
    let (url, blobs) = serve().await;
    let store = HttpBlobStore::new(client(Some("token")), url);

    assert!(!store.has(KEY).await.unwrap());
    store.put(KEY, Bytes::from_static(b"hello")).await.unwrap();
    assert!(store.has(KEY).await.unwrap());
    assert_eq!(store.get(KEY).await.unwrap(), "hello");
    assert_eq!(blobs.lock().len(), 1);

    assert_matches!(
        store.get("/blob/missing").await,
        Err(BlobStoreError::NotFound(key)) if key == "/blob/missing"
    );
}

#[tokio::test]
async fn test_rejected_credentials() {
    let (url, _blobs) = serve().await;
    let store = HttpBlobStore::new(client(None), url);
    assert_matches!(
        store.put(KEY, Bytes::from_static(b"hello")).await,
        Err(BlobStoreError::Unauthorized(_))
    );
}

#[tokio::test]
async fn test_server_error_is_not_not_found() {
    let (url, _blobs) = serve().await;
    let store = HttpBlobStore::new(client(None), url.join("broken/").unwrap());
    assert_matches!(store.has(KEY).await, Err(BlobStoreError::Transport(_)));
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = HttpBlobStore::new(client(None), Url::parse(&format!("http://{addr}/")).unwrap());
    let err = store.has(KEY).await.unwrap_err();
    assert_matches!(&err, BlobStoreError::Transport(http) if http.is_connect());
}

#[tokio::test]
async fn test_upload_dataset_over_http() {
    let (url, blobs) = serve().await;
    let store = Arc::new(HttpBlobStore::new(client(Some("token")), url));
    let orchestrator = BlobOrchestrator::new(store);

    let dir = tempfile::tempdir().unwrap();
    fs_err::write(dir.path().join("a.txt"), "hello").unwrap();
    fs_err::write(dir.path().join("b.txt"), "hello").unwrap();
    let mut manifest = Manifest::new(dir.path());
    manifest.generate(&GenerateOptions::default()).unwrap();

    let mut hashes: Vec<String> = manifest.all_hashes().iter().map(ToString::to_string).collect();
    hashes.push(manifest.manifest_hash().unwrap().to_string());

    let report = orchestrator.put_blobs(&manifest, &hashes).await.unwrap();
    assert_eq!(report.count(|o| *o == PutOutcome::Uploaded), 2);
    assert_eq!(blobs.lock().len(), 2);
    assert!(blobs
        .lock()
        .contains_key("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"));
}
