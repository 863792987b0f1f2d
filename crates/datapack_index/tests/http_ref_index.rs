use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use assert_matches::assert_matches;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use chrono::{TimeZone, Utc};
use datapack_blobstore::MemoryBlobStore;
use datapack_digest::{compute_bytes_digest, ContentHash};
use datapack_index::{DataIndex, DataIndexError, DatasetIndex, RefIndex, RefIndexError};
use datapack_types::{DatasetRefs, Handle};
use parking_lot::Mutex;
use url::Url;

#[derive(Clone, Default)]
struct Server {
    refs: Arc<Mutex<BTreeMap<String, DatasetRefs>>>,
    gets: Arc<AtomicUsize>,
}

async fn get_refs(
    State(server): State<Server>,
    Path((author, name)): Path<(String, String)>,
) -> Result<String, StatusCode> {
    server.gets.fetch_add(1, Ordering::SeqCst);
    let refs = server.refs.lock();
    let refs = refs
        .get(&format!("{author}/{name}"))
        .ok_or(StatusCode::NOT_FOUND)?;
    refs.to_yaml_string()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn post_ref(
    State(server): State<Server>,
    Path((author, name, hash)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> StatusCode {
    if headers.get("authorization").is_none() {
        return StatusCode::UNAUTHORIZED;
    }
    let Ok(hash) = hash.parse::<ContentHash>() else {
        return StatusCode::BAD_REQUEST;
    };
    server
        .refs
        .lock()
        .entry(format!("{author}/{name}"))
        .or_default()
        .publish(hash, Utc::now());
    StatusCode::OK
}

async fn serve(server: Server) -> Url {
    let app = Router::new()
        .route("/{author}/{name}/refs", get(get_refs))
        .route("/{author}/{name}/refs/{hash}", post(post_ref))
        .route(
            "/{author}/{name}/archive/{file}",
            get(|| async { "archive bytes" }),
        )
        .route("/garbage/refs/refs", get(|| async { "- [not, refs" }))
        .with_state(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

fn index(url: Url, token: Option<&str>) -> DataIndex {
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
    DataIndex::new(
        url,
        reqwest_middleware::ClientBuilder::new(client).build(),
        Arc::new(MemoryBlobStore::new()),
    )
}

#[tokio::test]
async fn test_fetch_and_publish_refs() {
    let server = Server::default();
    let h1 = compute_bytes_digest("snapshot 1");
    let mut refs = DatasetRefs::default();
    refs.publish(h1, Utc.with_ymd_and_hms(2014, 5, 1, 12, 0, 0).unwrap());
    refs.versions.insert("1.0".to_string(), h1);
    server.refs.lock().insert("jbenet/foo".to_string(), refs);

    let url = serve(server.clone()).await;
    let index = index(url, Some("token"));
    let refs = index.ref_index("jbenet/foo").unwrap();

    assert_eq!(refs.version_ref("1.0").await.unwrap(), h1);
    assert_eq!(refs.version_ref("latest").await.unwrap(), h1);
    assert_eq!(refs.ref_version(&h1.to_string()).await.unwrap(), "1.0");

    let h2 = compute_bytes_digest("snapshot 2");
    refs.put(&h2).await.unwrap();

    // Cached refs do not see the new ref until they are refreshed.
    assert_eq!(server.gets.load(Ordering::SeqCst), 1);
    assert!(refs.ref_timestamp(&h2).await.unwrap().is_none());
    let fresh = refs.fetch_refs(true).await.unwrap();
    assert_eq!(server.gets.load(Ordering::SeqCst), 2);
    assert_eq!(fresh.latest(), Some(h2));
    assert_eq!(refs.sorted_published().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_dataset() {
    let url = serve(Server::default()).await;
    let refs = index(url, None).ref_index("jbenet/missing").unwrap();
    let err = refs.version_ref("1.0").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().ends_with("/jbenet/missing/refs not found"));
}

#[tokio::test]
async fn test_publish_without_credentials() {
    let url = serve(Server::default()).await;
    let refs = index(url, None).ref_index("jbenet/foo").unwrap();
    let err = refs.put(&compute_bytes_digest("x")).await.unwrap_err();
    assert_matches!(err, RefIndexError::Unauthorized(_));
}

#[tokio::test]
async fn test_invalid_refs_document() {
    let url = serve(Server::default()).await;
    let refs = index(url, None).ref_index("garbage/refs").unwrap();
    assert_matches!(
        refs.fetch_refs(false).await,
        Err(RefIndexError::Parse { .. })
    );
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let index = index(Url::parse(&format!("http://{addr}/")).unwrap(), None);
    let err = index
        .ref_index("jbenet/foo")
        .unwrap()
        .fetch_refs(false)
        .await
        .unwrap_err();
    assert!(err.is_connect());
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_download_archive() {
    let url = serve(Server::default()).await;
    let index = index(url, None);
    let dir = tempfile::tempdir().unwrap();

    let handle = Handle::parse("jbenet/foo@1.0").unwrap();
    let archive = index.archive_url(&handle).unwrap();
    assert!(datapack_index::is_archive_url(archive.as_str()));

    let path = index.download_archive(&archive, dir.path()).await.unwrap();
    assert_eq!(
        path,
        dir.path().join("datasets").join(".downloads").join("1.0.tar.gz")
    );
    assert_eq!(fs_err::read_to_string(&path).unwrap(), "archive bytes");

    let missing = index.url().join("nope/archive.tar.gz").unwrap();
    assert_matches!(
        index.download_archive(&missing, dir.path()).await,
        Err(DataIndexError::Http(err)) if err.is_not_found()
    );
}
