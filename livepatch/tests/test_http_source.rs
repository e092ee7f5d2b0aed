use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use livepatch::applicator::PatchApplicator;
use livepatch::domain::SourceError;
use livepatch::host::{DirectoryReplacer, DirectoryResolver, ResolutionChain};
use livepatch::ledger::AppliedLedger;
use livepatch::scheduler::{CycleOutcome, PatchCycle};
use livepatch::source::{Fetched, HttpSource, PatchSource};
use std::sync::Arc;
use std::time::Duration;

const MANIFEST: &str = r#"{
    "version": "2.1",
    "timestamp": 1700000000,
    "patches": [ { "className": "com.example.Billing", "path": "com/example/Billing.bin" } ]
}"#;

/// Serve `router` on an ephemeral port and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/patches")
}

fn patch_server() -> Router {
    Router::new()
        .route("/patches/manifest.json", get(|| async { MANIFEST }))
        .route("/patches/2.1/com/example/Billing.bin", get(|| async { b"billing-v2".to_vec() }))
}

#[tokio::test]
async fn test_missing_manifest_is_not_found() {
    let base = serve(Router::new()).await;
    let source = HttpSource::new(&base, Duration::from_secs(5)).unwrap();

    assert_eq!(source.fetch_manifest().await.unwrap(), Fetched::NotFound);
}

#[tokio::test]
async fn test_server_error_is_a_source_error() {
    let router = Router::new()
        .route("/patches/manifest.json", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }));
    let base = serve(router).await;
    let source = HttpSource::new(&base, Duration::from_secs(5)).unwrap();

    let err = source.fetch_manifest().await.unwrap_err();
    assert!(matches!(err, SourceError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_fetches_manifest_and_versioned_body() {
    let base = serve(patch_server()).await;
    let source = HttpSource::new(&base, Duration::from_secs(5)).unwrap();

    let manifest = source.fetch_manifest().await.unwrap().found().unwrap();
    assert_eq!(manifest.version, "2.1");
    assert_eq!(manifest.patches.len(), 1);

    let body = source.fetch_body("2.1", &manifest.patches[0].path).await.unwrap();
    assert_eq!(body, Fetched::Found(b"billing-v2".to_vec()));
    assert_eq!(source.fetch_body("2.0", "com/example/Billing.bin").await.unwrap(), Fetched::NotFound);
}

#[tokio::test]
async fn test_cycle_over_http_replaces_unit() {
    let base = serve(patch_server()).await;
    let deploy = tempfile::tempdir().unwrap();
    let unit = deploy.path().join("com/example/Billing.bin");
    std::fs::create_dir_all(unit.parent().unwrap()).unwrap();
    std::fs::write(&unit, b"billing-v1").unwrap();

    let cycle = PatchCycle::new(
        PatchSource::from_endpoint(&base, Duration::from_secs(5)).unwrap(),
        Arc::new(AppliedLedger::new()),
        Arc::new(PatchApplicator::new(
            ResolutionChain::new().then(DirectoryResolver::new("primary", deploy.path())),
            Arc::new(DirectoryReplacer::new()),
        )),
    );

    let CycleOutcome::Applied(report) = cycle.run_once().await else {
        panic!("manifest should be applied");
    };
    assert_eq!(report.applied(), 1);
    assert_eq!(std::fs::read(&unit).unwrap(), b"billing-v2");
    assert!(matches!(cycle.run_once().await, CycleOutcome::AlreadyApplied { .. }));
}
