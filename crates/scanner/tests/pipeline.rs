use async_trait::async_trait;
use snaphound_analyzer::{Classifier, RuleSet};
use snaphound_core::{CaptureOutcome, FetchOutcome, OutputLayout, PathsLike, Shutdown, Target};
use snaphound_scanner::{
    CaptureError, FetchError, FetchResponse, Fetcher, Orchestrator, PipelineSettings, Renderer,
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tempfile::TempDir;

#[derive(Default)]
struct Gauge {
    live: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct MockFetcher {
    gauge: Arc<Gauge>,
    latency: Duration,
}

impl MockFetcher {
    fn new(latency: Duration) -> Self {
        Self {
            gauge: Arc::new(Gauge::default()),
            latency,
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchResponse, FetchError> {
        self.gauge.enter();
        tokio::time::sleep(self.latency).await;
        self.gauge.leave();

        let page = |body: &str| FetchResponse {
            status: 200,
            headers: vec![("Server".into(), "mock".into())],
            body: body.to_string(),
            final_url: url.to_string(),
            redirect_chain: vec![],
            cert_error: None,
        };
        if url.contains("timeout") {
            Err(FetchError::Timeout)
        } else if url.contains("refused") {
            Err(FetchError::ConnectionRefused)
        } else if url.contains("cred") {
            Ok(page("<html><title>Admin Portal</title><form>Login as admin</form></html>"))
        } else if url.contains("denied") {
            Ok(FetchResponse {
                status: 401,
                ..page("nope")
            })
        } else if url.contains("redirect") {
            Ok(FetchResponse {
                redirect_chain: vec![format!("{url}/next"), format!("{url}/final")],
                final_url: format!("{url}/final"),
                ..page("<title>Landed</title>")
            })
        } else if url.contains("panic") {
            panic!("fetcher exploded");
        } else {
            Ok(page("<html><title>Welcome</title>hello</html>"))
        }
    }
}

struct MockRenderer {
    gauge: Arc<Gauge>,
    latency: Duration,
}

impl MockRenderer {
    fn new(latency: Duration) -> Self {
        Self {
            gauge: Arc::new(Gauge::default()),
            latency,
        }
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn capture(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, CaptureError> {
        self.gauge.enter();
        if url.contains("hang") {
            // never honours its deadline; the orchestrator must stop waiting
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        tokio::time::sleep(self.latency).await;
        self.gauge.leave();
        if url.contains("broken") {
            return Err(CaptureError::Navigation("net::ERR_FAILED".into()));
        }
        Ok(b"\x89PNG fake".to_vec())
    }
}

fn settings(fetch: usize, capture: usize) -> PipelineSettings {
    PipelineSettings {
        fetch_concurrency: fetch,
        capture_concurrency: capture,
        fetch_timeout: Duration::from_secs(2),
        capture_timeout: Duration::from_millis(300),
        jitter: Duration::ZERO,
        trace_redirects: true,
        prepend_https: false,
    }
}

fn classifier() -> Classifier {
    Classifier::new(
        RuleSet::parse("login|Identified Logins\n"),
        RuleSet::parse("login;admin|admin:admin\n"),
    )
}

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn orchestrator(
    fetcher: Arc<MockFetcher>,
    renderer: Arc<MockRenderer>,
    settings: PipelineSettings,
    shutdown: Shutdown,
) -> Orchestrator {
    Orchestrator::new(fetcher, renderer, classifier(), settings, shutdown)
}

fn layout() -> (TempDir, OutputLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = OutputLayout::new(dir.path().join("report"));
    layout.create().unwrap();
    (dir, layout)
}

#[tokio::test]
async fn three_target_scenario() {
    let (_dir, layout) = layout();
    let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(5)));
    let renderer = Arc::new(MockRenderer::new(Duration::from_millis(5)));
    let orch = orchestrator(fetcher, renderer, settings(10, 2), Shutdown::new());

    let result = orch
        .process(
            &urls(&["http://good.example", "http://timeout.example", "http://cred.example"]),
            &layout,
        )
        .await;

    assert_eq!(result.targets.len(), 3);
    assert_eq!(result.skipped, 0);

    let good = &result.targets[0];
    assert!(good.fetch.is_success());
    assert_eq!(good.category, "uncategorized");
    assert!(matches!(good.capture, CaptureOutcome::Captured(_)));

    let timeout = &result.targets[1];
    assert!(matches!(timeout.fetch, FetchOutcome::Timeout));
    assert!(matches!(timeout.capture, CaptureOutcome::NotAttempted));
    assert!(timeout.source_artifact.is_none());

    let cred = &result.targets[2];
    assert_eq!(cred.category, "Identified Logins");
    assert_eq!(cred.credentials, vec!["admin:admin"]);
    assert_eq!(cred.title(), Some("Admin Portal"));

    // the timed-out target is an error, not an uncategorized page
    assert_eq!(result.tally.total(), 2);
    assert_eq!(result.tally.count("identifiedLogin"), 1);
    assert_eq!(result.tally.count("uncategorized"), 1);
}

#[tokio::test]
async fn artifacts_land_in_the_layout() {
    let (_dir, layout) = layout();
    let orch = orchestrator(
        Arc::new(MockFetcher::new(Duration::ZERO)),
        Arc::new(MockRenderer::new(Duration::ZERO)),
        settings(4, 1),
        Shutdown::new(),
    );
    let result = orch.process(&urls(&["http://good.example/"]), &layout).await;
    let t = &result.targets[0];

    let root = layout.root_dir();
    let source = root.join(t.source_artifact.as_ref().unwrap());
    let headers = root.join(t.header_artifact.as_ref().unwrap());
    let shot = root.join(t.screenshot().unwrap());
    assert!(std::fs::read_to_string(source).unwrap().contains("hello"));
    assert_eq!(std::fs::read_to_string(headers).unwrap(), "Server: mock\n");
    assert!(shot.starts_with(root.join("screens")));
    assert!(shot.is_file());
}

#[tokio::test]
async fn pools_never_exceed_their_limits() {
    let (_dir, layout) = layout();
    let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(20)));
    let renderer = Arc::new(MockRenderer::new(Duration::from_millis(10)));
    let orch = orchestrator(fetcher.clone(), renderer.clone(), settings(10, 2), Shutdown::new());

    let input: Vec<String> = (0..60).map(|i| format!("http://host{i}.example")).collect();
    let result = orch.process(&input, &layout).await;

    assert_eq!(result.targets.len(), 60);
    assert_eq!(fetcher.gauge.calls.load(Ordering::SeqCst), 60);
    assert!(fetcher.gauge.peak() <= 10, "fetch peak {}", fetcher.gauge.peak());
    assert!(fetcher.gauge.peak() > 1);
    assert!(renderer.gauge.peak() <= 2, "capture peak {}", renderer.gauge.peak());
    assert_eq!(renderer.gauge.calls.load(Ordering::SeqCst), 60);
}

#[tokio::test]
async fn hung_capture_is_bounded_by_its_timeout() {
    let (_dir, layout) = layout();
    let orch = orchestrator(
        Arc::new(MockFetcher::new(Duration::ZERO)),
        Arc::new(MockRenderer::new(Duration::from_millis(5))),
        settings(10, 2),
        Shutdown::new(),
    );

    let started = Instant::now();
    let result = orch
        .process(
            &urls(&["http://hang.example", "http://a.example", "http://broken.example", "http://b.example"]),
            &layout,
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(result.targets[0].capture, CaptureOutcome::Timeout));
    assert!(matches!(result.targets[1].capture, CaptureOutcome::Captured(_)));
    assert!(matches!(result.targets[2].capture, CaptureOutcome::Failed(_)));
    assert!(matches!(result.targets[3].capture, CaptureOutcome::Captured(_)));
}

#[tokio::test]
async fn every_input_gets_exactly_one_outcome() {
    let (_dir, layout) = layout();
    let orch = orchestrator(
        Arc::new(MockFetcher::new(Duration::ZERO)),
        Arc::new(MockRenderer::new(Duration::ZERO)),
        settings(3, 1),
        Shutdown::new(),
    );
    let input = urls(&[
        "good.example",
        "http://",
        "http://refused.example",
        "http://denied.example",
        "http://panic.example",
        "good.example",
        "http://good.example/",
    ]);
    let result = orch.process(&input, &layout).await;

    assert_eq!(result.targets.len(), input.len());
    let indices: Vec<usize> = result.targets.iter().map(|t| t.index).collect();
    assert_eq!(indices, (0..input.len()).collect::<Vec<_>>());

    assert!(matches!(result.targets[1].fetch, FetchOutcome::BadUrl(_)));
    assert!(matches!(result.targets[2].fetch, FetchOutcome::ConnectionRefused));
    assert!(matches!(result.targets[3].fetch, FetchOutcome::Unauthorized { status: 401, .. }));
    assert!(result.targets[3].header_artifact.is_some());
    match &result.targets[4].fetch {
        FetchOutcome::UnknownError(msg) => assert!(msg.contains("fetcher exploded")),
        other => panic!("unexpected outcome {other:?}"),
    }

    let names: HashSet<&str> = result.targets.iter().map(|t| t.saved_name.as_str()).collect();
    assert_eq!(names.len(), input.len(), "artifact names collided");
}

#[tokio::test]
async fn redirect_chain_is_kept_when_tracing() {
    let (_dir, layout) = layout();
    let orch = orchestrator(
        Arc::new(MockFetcher::new(Duration::ZERO)),
        Arc::new(MockRenderer::new(Duration::ZERO)),
        settings(2, 1),
        Shutdown::new(),
    );
    let result = orch.process(&urls(&["http://redirect.example"]), &layout).await;
    assert_eq!(
        result.targets[0].redirect_chain,
        vec!["http://redirect.example/next", "http://redirect.example/final"]
    );

    let mut quiet = settings(2, 1);
    quiet.trace_redirects = false;
    let orch = orchestrator(
        Arc::new(MockFetcher::new(Duration::ZERO)),
        Arc::new(MockRenderer::new(Duration::ZERO)),
        quiet,
        Shutdown::new(),
    );
    let result = orch.process(&urls(&["http://redirect.example"]), &layout).await;
    assert!(result.targets[0].redirect_chain.is_empty());
}

#[tokio::test]
async fn interrupt_returns_partial_results() {
    let (_dir, layout) = layout();
    let shutdown = Shutdown::new();
    let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(100)));
    let orch = orchestrator(
        fetcher,
        Arc::new(MockRenderer::new(Duration::ZERO)),
        settings(2, 1),
        shutdown.clone(),
    );

    let input: Vec<String> = (0..20).map(|i| format!("http://slow{i}.example")).collect();
    let trigger = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            shutdown.trigger();
        })
    };

    let started = Instant::now();
    let result = orch.process(&input, &layout).await;
    trigger.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(result.skipped > 0);
    assert_eq!(result.targets.len() + result.skipped, input.len());
    assert!(!result.targets.is_empty());
    assert!(result
        .targets
        .iter()
        .all(|t| matches!(t.capture, CaptureOutcome::NotAttempted)));
}

#[tokio::test]
async fn resume_fetches_only_what_is_missing() {
    let (_dir, layout) = layout();
    let first = orchestrator(
        Arc::new(MockFetcher::new(Duration::ZERO)),
        Arc::new(MockRenderer::new(Duration::ZERO)),
        settings(4, 1),
        Shutdown::new(),
    );
    let earlier = first
        .process(&urls(&["http://cred.example", "http://timeout.example"]), &layout)
        .await;
    let mut previous: Vec<Target> = earlier.targets;
    // a run cut short before its capture pass
    previous[0].capture = CaptureOutcome::NotAttempted;

    let fetcher = Arc::new(MockFetcher::new(Duration::ZERO));
    let renderer = Arc::new(MockRenderer::new(Duration::ZERO));
    let second = orchestrator(fetcher.clone(), renderer.clone(), settings(4, 1), Shutdown::new());
    let result = second
        .resume(
            &urls(&["http://good.example", "http://cred.example", "http://timeout.example"]),
            &layout,
            previous,
        )
        .await;

    assert_eq!(fetcher.gauge.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.targets.len(), 3);
    let indices: Vec<usize> = result.targets.iter().map(|t| t.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let cred = &result.targets[1];
    assert_eq!(cred.category, "Identified Logins");
    assert!(matches!(cred.capture, CaptureOutcome::Captured(_)));
    assert!(matches!(result.targets[2].fetch, FetchOutcome::Timeout));
    assert_eq!(renderer.gauge.calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.tally.total(), 2);
}
