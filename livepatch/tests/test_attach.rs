use livepatch::config::AgentConfig;
use livepatch::host::{DirectoryReplacer, ResolutionChain};
use livepatch::interception::DispatchTable;
use livepatch::HostBindings;
use std::sync::Arc;

fn bindings() -> HostBindings {
    HostBindings {
        resolvers: ResolutionChain::new(),
        replacer: Arc::new(DirectoryReplacer::new()),
        interception: Arc::new(DispatchTable::new()),
    }
}

#[test]
fn test_attach_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig {
        endpoint: dir.path().join("patches").display().to_string(),
        deprecation_config: dir.path().join("missing-mappings.json"),
        security_patterns: dir.path().join("missing-patterns.json"),
        report_dir: dir.path().join("profiler-data"),
        ..AgentConfig::default()
    };

    assert!(livepatch::agent::attached().is_none());
    let first = livepatch::attach(config.clone(), bindings()).unwrap();
    let second = livepatch::attach(AgentConfig::default(), bindings()).unwrap();

    assert!(std::ptr::eq(first, second));
    assert_eq!(second.config().endpoint, config.endpoint);
    assert!(first.scheduler().is_running());

    first.hotspots().record("com.example.Billing.charge()");
    let report = livepatch::detach().unwrap();
    assert!(report.ends_with("profiler-data/hotspots.csv"));
    assert_eq!(
        std::fs::read_to_string(&report).unwrap(),
        "method,hits\ncom.example.Billing.charge(),1\n"
    );
    assert!(!second.scheduler().is_running());
    assert_eq!(livepatch::detach(), None);
    assert_eq!(second.shutdown(), None);
}
