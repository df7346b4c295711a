//! Artifact store behavior against a local stub storage backend.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;

use cartolina::domain::types::{ImageFormat, RenderedImage, UploadTarget};
use cartolina::infra::storage::{ArtifactStore, FALLBACK_BUCKET, StorageError};
use cartolina::infra::supabase::SupabaseClient;

/// Which bucket-creation requests the stub refuses.
#[derive(Clone, Copy, PartialEq)]
enum Deny {
    Nothing,
    NonFallback,
    Everything,
}

#[derive(Clone)]
struct StubState {
    buckets: Arc<Mutex<HashSet<String>>>,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    deny: Deny,
}

async fn get_bucket(State(state): State<StubState>, Path(id): Path<String>) -> StatusCode {
    if state.buckets.lock().expect("buckets lock").contains(&id) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn create_bucket(
    State(state): State<StubState>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let id = body["id"].as_str().unwrap_or_default().to_string();
    let denied = match state.deny {
        Deny::Nothing => false,
        Deny::Everything => true,
        Deny::NonFallback => id != FALLBACK_BUCKET,
    };
    if denied {
        return StatusCode::BAD_REQUEST;
    }
    state.buckets.lock().expect("buckets lock").insert(id);
    StatusCode::OK
}

async fn put_object(
    State(state): State<StubState>,
    Path((bucket, path)): Path<(String, String)>,
    body: Bytes,
) -> StatusCode {
    let key = format!("{bucket}/{path}");
    let mut objects = state.objects.lock().expect("objects lock");
    if objects.contains_key(&key) {
        return StatusCode::CONFLICT;
    }
    objects.insert(key, body.to_vec());
    StatusCode::OK
}

async fn spawn_stub(deny: Deny) -> (SocketAddr, StubState) {
    let state = StubState {
        buckets: Arc::new(Mutex::new(HashSet::new())),
        objects: Arc::new(Mutex::new(HashMap::new())),
        deny,
    };
    let router = Router::new()
        .route("/storage/v1/bucket/{id}", get(get_bucket))
        .route("/storage/v1/bucket", post(create_bucket))
        .route("/storage/v1/object/{bucket}/{*path}", post(put_object))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("serve stub");
    });
    (addr, state)
}

fn store_for(addr: SocketAddr) -> ArtifactStore {
    let client = SupabaseClient::new(&format!("http://{addr}"), "service-key").expect("client");
    ArtifactStore::new(client)
}

fn image() -> RenderedImage {
    RenderedImage {
        bytes: Bytes::from_static(b"\x89PNG-not-really"),
        format: ImageFormat::Png,
    }
}

fn target(bucket: &str, base_dir: &str, file_name: &str) -> UploadTarget {
    UploadTarget {
        bucket: Some(bucket.to_string()),
        base_dir: base_dir.to_string(),
        file_name: Some(file_name.to_string()),
    }
}

#[tokio::test]
async fn upload_creates_the_bucket_and_returns_a_public_url() {
    let (addr, state) = spawn_stub(Deny::Nothing).await;
    let store = store_for(addr);

    let artifact = store
        .upload(&image(), "podcast-seo", &target("cards", "previews", "alpha"))
        .await
        .expect("upload succeeds");

    assert_eq!(artifact.bucket, "cards");
    assert!(!artifact.fallback);
    assert_eq!(artifact.object_path, "previews/alpha.png");
    assert_eq!(
        artifact.public_url,
        format!("http://{addr}/storage/v1/object/public/cards/previews/alpha.png")
    );
    assert!(state.buckets.lock().expect("buckets lock").contains("cards"));
    assert!(
        state
            .objects
            .lock()
            .expect("objects lock")
            .contains_key("cards/previews/alpha.png")
    );
}

#[tokio::test]
async fn existing_buckets_are_not_recreated() {
    let (addr, state) = spawn_stub(Deny::Everything).await;
    state
        .buckets
        .lock()
        .expect("buckets lock")
        .insert("cards".to_string());
    let store = store_for(addr);

    let artifact = store
        .upload(&image(), "podcast-seo", &target("cards", "", "beta"))
        .await
        .expect("upload succeeds despite creation being denied");
    assert_eq!(artifact.bucket, "cards");
    assert!(!artifact.fallback);
}

#[tokio::test]
async fn fallback_fires_exactly_once_and_flags_the_artifact() {
    let (addr, state) = spawn_stub(Deny::NonFallback).await;
    let store = store_for(addr);

    let artifact = store
        .upload(&image(), "podcast-seo", &target("cards", "", "gamma"))
        .await
        .expect("fallback upload succeeds");

    assert_eq!(artifact.bucket, FALLBACK_BUCKET);
    assert!(artifact.fallback);
    assert!(
        artifact
            .public_url
            .contains(&format!("/storage/v1/object/public/{FALLBACK_BUCKET}/gamma.png"))
    );
    assert!(
        !state
            .buckets
            .lock()
            .expect("buckets lock")
            .contains("cards")
    );
}

#[tokio::test]
async fn exhausted_fallback_is_a_hard_failure() {
    let (addr, _state) = spawn_stub(Deny::Everything).await;
    let store = store_for(addr);

    let err = store
        .upload(&image(), "podcast-seo", &target("cards", "", "delta"))
        .await
        .unwrap_err();

    match err {
        StorageError::BucketUnavailable { bucket, reason } => {
            assert_eq!(bucket, "cards");
            assert!(reason.contains("fallback"));
        }
        other => panic!("expected bucket failure, got {other}"),
    }
}

#[tokio::test]
async fn collisions_never_overwrite() {
    let (addr, state) = spawn_stub(Deny::Nothing).await;
    state
        .buckets
        .lock()
        .expect("buckets lock")
        .insert("cards".to_string());
    state
        .objects
        .lock()
        .expect("objects lock")
        .insert("cards/epsilon.png".to_string(), b"original".to_vec());
    let store = store_for(addr);

    let err = store
        .upload(&image(), "podcast-seo", &target("cards", "", "epsilon"))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Collision { .. }));
    assert_eq!(
        state
            .objects
            .lock()
            .expect("objects lock")
            .get("cards/epsilon.png"),
        Some(&b"original".to_vec())
    );
}

#[tokio::test]
async fn missing_file_names_get_a_generated_one() {
    let (addr, state) = spawn_stub(Deny::Nothing).await;
    let store = store_for(addr);

    let artifact = store
        .upload(
            &image(),
            "podcast-seo",
            &UploadTarget {
                bucket: Some("cards".to_string()),
                base_dir: String::new(),
                file_name: None,
            },
        )
        .await
        .expect("upload succeeds");

    assert!(artifact.object_path.starts_with("podcast-seo-"));
    assert!(artifact.object_path.ends_with(".png"));
    assert_eq!(state.objects.lock().expect("objects lock").len(), 1);
}
