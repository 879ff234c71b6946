use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::{TimeZone, Utc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use wallshift_engine::cache::CacheStore;
use wallshift_engine::catalog::CatalogClient;
use wallshift_engine::client::create_client;
use wallshift_engine::config::{EngineConfig, RotationSource};
use wallshift_engine::error::ErrorKind;
use wallshift_engine::fetch::ContentFetcher;
use wallshift_engine::retry::RetryPolicy;
use wallshift_engine::rotation::{BackgroundApplier, Rotator};
use wallshift_engine::scheduler::Scheduler;
use wallshift_engine::validate::Validator;

struct RecordingApplier {
    applied: Mutex<Vec<PathBuf>>,
    succeed: bool,
}

impl RecordingApplier {
    fn new(succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            applied: Mutex::new(Vec::new()),
            succeed,
        })
    }

    fn applied(&self) -> Vec<PathBuf> {
        self.applied.lock().unwrap().clone()
    }
}

impl BackgroundApplier for RecordingApplier {
    fn apply(&self, path: &Path) -> bool {
        self.applied.lock().unwrap().push(path.to_path_buf());
        self.succeed
    }
}

#[derive(Clone)]
struct ServerState {
    addr: SocketAddr,
}

async fn entry(
    State(state): State<ServerState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> impl IntoResponse {
    let id = id.trim_end_matches(".json").to_string();
    axum::Json(serde_json::json!({
        "id": id,
        "path": format!("http://{}/content/{id}.jpg", state.addr),
    }))
}

async fn content() -> impl IntoResponse {
    vec![3u8; 2000]
}

async fn list() -> impl IntoResponse {
    axum::Json(serde_json::json!(["scheduled-1"]))
}

/// One server playing both catalog and content host.
async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/images.json", get(list))
        .route("/images/{id}", get(entry))
        .route("/content/{id}", get(content))
        .with_state(ServerState { addr });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn rotator_in(
    dir: &Path,
    addr: SocketAddr,
    applier: Arc<RecordingApplier>,
    max_cache_size: u64,
) -> Rotator {
    let validator = Validator::new(vec!["127.0.0.1".to_string()], 1024 * 1024);
    let retry = RetryPolicy::new(0);
    let store = Arc::new(CacheStore::new(dir, validator.clone()).await.unwrap());
    let client = create_client(Duration::from_secs(5)).unwrap();

    Rotator::new(
        CatalogClient::new(
            client.clone(),
            format!("http://{addr}"),
            validator.clone(),
            retry,
        ),
        ContentFetcher::new(client, Arc::clone(&store), validator.clone(), retry),
        store,
        applier,
        validator,
        max_cache_size,
    )
}

#[tokio::test]
async fn full_pipeline_resolves_fetches_and_applies() {
    let addr = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let applier = RecordingApplier::new(true);

    let rotator = rotator_in(dir.path(), addr, Arc::clone(&applier), 1024 * 1024).await;
    let path = rotator
        .set_from_identifier("forest-9", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("forest-9.jpg"));
    assert!(path.exists());
    assert_eq!(applier.applied(), vec![path]);
}

#[tokio::test]
async fn failed_apply_is_a_system_apply_error_and_skips_cleanup() {
    let addr = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let applier = RecordingApplier::new(false);

    // Limit of zero: any cleanup pass would delete everything.
    let rotator = rotator_in(dir.path(), addr, Arc::clone(&applier), 0).await;
    let err = rotator
        .set_from_identifier("forest-9", None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SystemApplyError);
    assert_eq!(applier.applied().len(), 1);
    // The downloaded file survives because cleanup never ran.
    assert!(dir.path().join("forest-9.jpg").exists());
}

#[tokio::test]
async fn successful_rotation_evicts_older_items_over_the_limit() {
    let addr = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let applier = RecordingApplier::new(true);

    // 2500-byte limit: the 2000-byte download plus a 2000-byte leftover is
    // over, so the least recently used leftover must go.
    let rotator = rotator_in(dir.path(), addr, Arc::clone(&applier), 2500).await;
    let stale = dir.path().join("stale.jpg");
    tokio::fs::write(&stale, vec![0u8; 2000]).await.unwrap();
    rotator
        .store()
        .set_access_time("stale", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());

    rotator
        .set_from_identifier("forest-9", None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!stale.exists());
    assert!(dir.path().join("forest-9.jpg").exists());
}

#[tokio::test]
async fn invalid_identifier_fails_before_any_stage_runs() {
    let addr = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let applier = RecordingApplier::new(true);

    let rotator = rotator_in(dir.path(), addr, Arc::clone(&applier), 1024).await;
    let err = rotator
        .set_from_identifier("bad id!", None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
    assert!(applier.applied().is_empty());
}

#[tokio::test]
async fn forced_rotation_from_catalog_applies_a_listed_identifier() {
    let addr = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let applier = RecordingApplier::new(true);

    let rotator = Arc::new(rotator_in(dir.path(), addr, Arc::clone(&applier), 1024 * 1024).await);
    let config = EngineConfig {
        rotation_source: RotationSource::Catalog,
        ..EngineConfig::default()
    };
    let scheduler = Scheduler::new(Arc::clone(&rotator), &config);

    scheduler.force_rotation(None).await.unwrap();

    assert_eq!(applier.applied(), vec![dir.path().join("scheduled-1.jpg")]);
}

#[tokio::test]
async fn forced_rotation_from_history_picks_an_existing_file() {
    let addr = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let applier = RecordingApplier::new(true);

    let rotator = Arc::new(rotator_in(dir.path(), addr, Arc::clone(&applier), 1024 * 1024).await);
    // Seed history with one real file and one stale index entry.
    tokio::fs::write(dir.path().join("kept.jpg"), vec![1u8; 100])
        .await
        .unwrap();
    rotator.store().touch("kept");
    rotator.store().touch("ghost");

    let config = EngineConfig {
        rotation_source: RotationSource::History,
        ..EngineConfig::default()
    };
    let scheduler = Scheduler::new(Arc::clone(&rotator), &config);
    scheduler.force_rotation(None).await.unwrap();

    // Only "kept" has a file on disk, so it must be the one applied.
    assert_eq!(applier.applied(), vec![dir.path().join("kept.jpg")]);
}

/// Poll a condition every 10ms, failing the test after five seconds.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within five seconds");
}

#[tokio::test]
async fn scheduler_loop_rotates_periodically_until_stopped() {
    let addr = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let applier = RecordingApplier::new(true);

    let rotator = Arc::new(rotator_in(dir.path(), addr, Arc::clone(&applier), 1024 * 1024).await);
    tokio::fs::write(dir.path().join("kept.jpg"), vec![1u8; 100])
        .await
        .unwrap();
    rotator.store().touch("kept");

    // Zero-minute interval so ticks fire back to back.
    let config = EngineConfig {
        scheduler_enabled: true,
        scheduler_interval_minutes: 0,
        rotation_source: RotationSource::History,
        ..EngineConfig::default()
    };
    let mut scheduler = Scheduler::new(Arc::clone(&rotator), &config);
    let mut next = scheduler.subscribe_next_rotation();

    scheduler.start();
    assert!(scheduler.is_running());

    // At least two full ticks must complete on their own.
    wait_until(|| applier.applied().len() >= 2).await;
    assert!(next.borrow_and_update().is_some());

    scheduler.stop();
    assert!(!scheduler.is_running());
    assert!(next.borrow_and_update().is_none());
}

#[tokio::test]
async fn failing_ticks_leave_the_loop_running() {
    let addr = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    // Every apply fails, so every tick ends in an error.
    let applier = RecordingApplier::new(false);

    let rotator = Arc::new(rotator_in(dir.path(), addr, Arc::clone(&applier), 1024 * 1024).await);
    let config = EngineConfig {
        scheduler_enabled: true,
        scheduler_interval_minutes: 0,
        rotation_source: RotationSource::Catalog,
        ..EngineConfig::default()
    };
    let mut scheduler = Scheduler::new(Arc::clone(&rotator), &config);
    let mut next = scheduler.subscribe_next_rotation();
    scheduler.start();

    // A failed tick must not kill the loop: further attempts keep coming.
    wait_until(|| applier.applied().len() >= 2).await;
    assert!(scheduler.is_running());
    assert!(next.borrow_and_update().is_some());

    // Disabling through update stops the loop and clears the published time.
    scheduler.update(false, Duration::from_secs(60), RotationSource::Catalog);
    assert!(!scheduler.is_running());
    assert!(next.borrow_and_update().is_none());

    // Re-enabling restarts it.
    scheduler.update(true, Duration::ZERO, RotationSource::Catalog);
    assert!(scheduler.is_running());
    let before = applier.applied().len();
    wait_until(|| applier.applied().len() > before).await;
    scheduler.stop();
}

#[tokio::test]
async fn forced_rotation_from_empty_history_is_a_no_op() {
    let addr = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let applier = RecordingApplier::new(true);

    let rotator = Arc::new(rotator_in(dir.path(), addr, Arc::clone(&applier), 1024).await);
    let config = EngineConfig {
        rotation_source: RotationSource::History,
        ..EngineConfig::default()
    };
    let scheduler = Scheduler::new(Arc::clone(&rotator), &config);

    scheduler.force_rotation(None).await.unwrap();
    assert!(applier.applied().is_empty());
}
