//! Target Orchestrator: the fetch pass, then the capture pass.
//!
//! Each pass is a fixed-size pool over the target set. A target that fails,
//! times out or panics becomes a failure entry; it never takes the pool or
//! the run down with it. The fetch pass finishes for every target before the
//! first capture starts.

use crate::{
    capture::{CaptureError, Renderer},
    fetch::{outcome_for_response, Fetcher},
};
use futures::{stream, Future, StreamExt};
use rand::Rng;
use snaphound_analyzer::{canonical_key, display_label, Classifier};
use snaphound_config::ScanConfig;
use snaphound_core::{
    utils::{normalize_url, save_bytes, saved_name, write_str_to_file},
    CaptureOutcome, CategoryTally, FetchOutcome, OutputLayout, PathsLike, PendingTarget, Shutdown,
    Target,
};
use std::{
    any::Any,
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Knobs the orchestrator reads from `ScanConfig`.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fetch_concurrency: usize,
    pub capture_concurrency: usize,
    pub fetch_timeout: Duration,
    pub capture_timeout: Duration,
    pub jitter: Duration,
    pub trace_redirects: bool,
    pub prepend_https: bool,
}

impl From<&ScanConfig> for PipelineSettings {
    fn from(cfg: &ScanConfig) -> Self {
        Self {
            fetch_concurrency: cfg.fetch_concurrency,
            capture_concurrency: cfg.capture_concurrency,
            fetch_timeout: cfg.fetch_timeout(),
            capture_timeout: cfg.capture_timeout(),
            jitter: cfg.jitter(),
            trace_redirects: cfg.trace_redirects,
            prepend_https: cfg.prepend_https,
        }
    }
}

#[derive(Debug)]
pub struct ScanResult {
    /// In input order.
    pub targets: Vec<Target>,
    pub tally: CategoryTally,
    /// Inputs never fetched because the run was interrupted.
    pub skipped: usize,
}

pub struct Orchestrator {
    fetcher: Arc<dyn Fetcher>,
    renderer: Arc<dyn Renderer>,
    classifier: Arc<Classifier>,
    settings: PipelineSettings,
    shutdown: Shutdown,
}

enum Slot<R> {
    Done(R),
    Panicked(String),
    Skipped,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn Renderer>,
        classifier: Classifier,
        settings: PipelineSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            classifier: Arc::new(classifier),
            settings,
            shutdown,
        }
    }

    /// Run both passes over `urls` and return every processed target.
    pub async fn process(&self, urls: &[String], layout: &OutputLayout) -> ScanResult {
        self.resume(urls, layout, Vec::new()).await
    }

    /// Like `process`, but inputs whose normalized URL is already in
    /// `previous` are carried over instead of fetched again. Carried targets
    /// without a screenshot go through the capture pass once more.
    pub async fn resume(
        &self,
        urls: &[String],
        layout: &OutputLayout,
        previous: Vec<Target>,
    ) -> ScanResult {
        let mut done: HashMap<String, Target> =
            previous.into_iter().map(|t| (t.url.clone(), t)).collect();
        let mut carried = Vec::new();
        let mut pending = Vec::new();
        for p in self.prepare(urls) {
            match done.remove(&p.url) {
                Some(mut t) => {
                    t.index = p.index;
                    carried.push(t);
                }
                None => pending.push(p),
            }
        }
        if !carried.is_empty() {
            info!(carried = carried.len(), "resuming, skipping targets fetched earlier");
        }

        let (mut targets, skipped) = self.fetch_phase(pending, layout).await;
        targets.extend(carried);
        targets.sort_by_key(|t| t.index);
        let tally = tally_categories(&targets);
        self.capture_phase(&mut targets, layout).await;
        ScanResult {
            targets,
            tally,
            skipped,
        }
    }

    /// Normalize inputs and hand out unique artifact names.
    pub fn prepare(&self, urls: &[String]) -> Vec<PendingTarget> {
        let mut issued: HashMap<String, usize> = HashMap::new();
        urls.iter()
            .enumerate()
            .map(|(index, raw)| {
                let (url, parse_error) = match normalize_url(raw, self.settings.prepend_https) {
                    Ok(url) => (url, None),
                    Err(e) => (raw.trim().to_string(), Some(e)),
                };
                let base = saved_name(&url);
                let seen = issued.entry(base.clone()).or_insert(0);
                *seen += 1;
                let saved_name = if *seen == 1 {
                    base
                } else {
                    debug!(%url, copy = *seen, "duplicate artifact name, suffixing");
                    format!("{base}_{seen}")
                };
                PendingTarget {
                    index,
                    url,
                    parse_error,
                    saved_name,
                }
            })
            .collect()
    }

    /// Fetch and classify every target. Returns targets in input order and
    /// the number skipped because of an interrupt.
    pub async fn fetch_phase(
        &self,
        pending: Vec<PendingTarget>,
        layout: &OutputLayout,
    ) -> (Vec<Target>, usize) {
        let started = Instant::now();
        let total = pending.len();
        info!(targets = total, workers = self.settings.fetch_concurrency, "fetch pass starting");

        let ctx = Arc::new(FetchContext {
            fetcher: self.fetcher.clone(),
            classifier: self.classifier.clone(),
            settings: self.settings.clone(),
            layout: layout.clone(),
        });
        let fallback = pending.clone();
        let items = pending.into_iter().enumerate().collect();

        let slots = run_bounded(items, self.settings.fetch_concurrency, &self.shutdown, |p| {
            fetch_target(ctx.clone(), p)
        })
        .await;

        let mut targets = Vec::with_capacity(total);
        let mut skipped = 0;
        for (pos, slot) in slots {
            match slot {
                Slot::Done(target) => targets.push(target),
                Slot::Panicked(msg) => {
                    warn!(url = %fallback[pos].url, "fetch worker panicked: {msg}");
                    targets.push(Target::new(
                        fallback[pos].clone(),
                        FetchOutcome::UnknownError(format!("worker failure: {msg}")),
                    ));
                }
                Slot::Skipped => skipped += 1,
            }
        }
        targets.sort_by_key(|t| t.index);

        let ok = targets.iter().filter(|t| t.fetch.is_success()).count();
        info!(
            fetched = targets.len(),
            ok,
            failed = targets.len() - ok,
            skipped,
            elapsed = ?started.elapsed(),
            "fetch pass finished"
        );
        (targets, skipped)
    }

    /// Screenshot every successfully fetched target that has no screenshot yet.
    pub async fn capture_phase(&self, targets: &mut [Target], layout: &OutputLayout) {
        let started = Instant::now();
        let jobs: Vec<(usize, CaptureJob)> = targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.fetch.is_success() && t.screenshot().is_none())
            .map(|(pos, t)| {
                (
                    pos,
                    CaptureJob {
                        url: t.url.clone(),
                        saved_name: t.saved_name.clone(),
                    },
                )
            })
            .collect();
        if jobs.is_empty() {
            return;
        }
        if self.shutdown.is_triggered() {
            info!("interrupted, skipping capture pass");
            return;
        }
        info!(targets = jobs.len(), workers = self.settings.capture_concurrency, "capture pass starting");

        let renderer = self.renderer.clone();
        let limit = self.settings.capture_timeout;
        let screens = layout.screenshots_dir().to_path_buf();
        let slots = run_bounded(jobs, self.settings.capture_concurrency, &self.shutdown, |job| {
            capture_target(renderer.clone(), job, limit, screens.clone())
        })
        .await;

        let mut captured = 0;
        for (pos, slot) in slots {
            let target = &mut targets[pos];
            target.capture = match slot {
                Slot::Done(outcome) => outcome,
                Slot::Panicked(msg) => CaptureOutcome::Failed(format!("worker failure: {msg}")),
                Slot::Skipped => CaptureOutcome::NotAttempted,
            };
            if matches!(target.capture, CaptureOutcome::Captured(_)) {
                captured += 1;
            }
        }
        info!(captured, elapsed = ?started.elapsed(), "capture pass finished");
    }
}

/// One entry per successfully fetched target, keyed by category and
/// labelled from the catalogue. Failed targets have no category.
pub fn tally_categories(targets: &[Target]) -> CategoryTally {
    let mut tally = CategoryTally::new();
    for t in targets.iter().filter(|t| t.fetch.is_success()) {
        let key = canonical_key(&t.category);
        tally.record(key, display_label(key));
    }
    tally
}

struct FetchContext {
    fetcher: Arc<dyn Fetcher>,
    classifier: Arc<Classifier>,
    settings: PipelineSettings,
    layout: OutputLayout,
}

async fn fetch_target(ctx: Arc<FetchContext>, pending: PendingTarget) -> Target {
    if let Some(reason) = pending.parse_error.clone() {
        warn!(url = %pending.url, "unusable URL: {reason}");
        return Target::new(pending, FetchOutcome::BadUrl(reason));
    }

    if !ctx.settings.jitter.is_zero() {
        let factor = 1.0 - rand::thread_rng().gen_range(0..=30) as f64 * 0.01;
        tokio::time::sleep(ctx.settings.jitter.mul_f64(factor)).await;
    }

    let resp = match ctx.fetcher.fetch(&pending.url, ctx.settings.fetch_timeout).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(url = %pending.url, "fetch failed: {e}");
            return Target::new(pending, FetchOutcome::from(&e));
        }
    };

    let chain = resp.redirect_chain.clone();
    let outcome = outcome_for_response(resp);
    let classification = match &outcome {
        FetchOutcome::Success(meta) => Some(ctx.classifier.evaluate(&meta.body, meta.title.as_deref())),
        _ => None,
    };

    let mut target = Target::new(pending, outcome);
    if ctx.settings.trace_redirects {
        target.redirect_chain = chain;
    }
    if let Some(c) = classification {
        target.category = c.category;
        target.credentials = c.credentials;
    }
    if let FetchOutcome::Unauthorized { status, .. } = &target.fetch {
        warn!(url = %target.url, status, "authentication required");
    }
    write_fetch_artifacts(&mut target, &ctx.layout);
    debug!(url = %target.url, category = %target.category, "fetched");
    target
}

fn write_fetch_artifacts(target: &mut Target, layout: &OutputLayout) {
    if let FetchOutcome::Success(meta) = &target.fetch {
        let path = layout.source_dir().join(format!("{}.txt", target.saved_name));
        match write_str_to_file(&path, &meta.body) {
            Ok(()) => target.source_artifact = Some(relative_to(layout.root_dir(), &path)),
            Err(e) => warn!(url = %target.url, "saving source: {e}"),
        }
    }

    let headers = target.fetch.headers();
    if !headers.is_empty() {
        let dump: String = headers.iter().map(|(k, v)| format!("{k}: {v}\n")).collect();
        let path = layout.headers_dir().join(format!("{}.txt", target.saved_name));
        match write_str_to_file(&path, &dump) {
            Ok(()) => target.header_artifact = Some(relative_to(layout.root_dir(), &path)),
            Err(e) => warn!(url = %target.url, "saving headers: {e}"),
        }
    }
}

struct CaptureJob {
    url: String,
    saved_name: String,
}

async fn capture_target(
    renderer: Arc<dyn Renderer>,
    job: CaptureJob,
    limit: Duration,
    screens: PathBuf,
) -> CaptureOutcome {
    let result = match tokio::time::timeout(limit, renderer.capture(&job.url, limit)).await {
        Ok(res) => res,
        Err(_) => Err(CaptureError::Timeout),
    };

    match result {
        Ok(png) => {
            let file = format!("{}.png", job.saved_name);
            match save_bytes(&screens.join(&file), &png) {
                Ok(()) => CaptureOutcome::Captured(PathBuf::from(OutputLayout::SCREENS).join(file)),
                Err(e) => {
                    warn!(url = %job.url, "saving screenshot: {e}");
                    CaptureOutcome::Failed(format!("saving screenshot: {e}"))
                }
            }
        }
        Err(CaptureError::Timeout) => {
            warn!(url = %job.url, ?limit, "screenshot timed out");
            CaptureOutcome::Timeout
        }
        Err(e) => {
            warn!(url = %job.url, "screenshot failed: {e}");
            CaptureOutcome::Failed(e.to_string())
        }
    }
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// Run `work` over `items` with at most `limit` tasks alive at once.
///
/// Each item runs in its own task so a panic is contained to that item.
/// After `shutdown` fires no new item starts and running ones are aborted.
async fn run_bounded<T, R, F, Fut>(
    items: Vec<(usize, T)>,
    limit: usize,
    shutdown: &Shutdown,
    work: F,
) -> Vec<(usize, Slot<R>)>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    stream::iter(items)
        .map(|(key, item)| {
            let shutdown = shutdown.clone();
            let fut = work(item);
            async move {
                if shutdown.is_triggered() {
                    return (key, Slot::Skipped);
                }
                let handle = tokio::spawn(fut);
                let abort = handle.abort_handle();
                tokio::select! {
                    biased;
                    joined = handle => (key, slot_from_join(joined)),
                    _ = shutdown.triggered() => {
                        abort.abort();
                        (key, Slot::Skipped)
                    }
                }
            }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}

fn slot_from_join<R>(joined: Result<R, JoinError>) -> Slot<R> {
    match joined {
        Ok(r) => Slot::Done(r),
        Err(e) if e.is_panic() => Slot::Panicked(panic_message(e.into_panic())),
        Err(_) => Slot::Skipped,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn run_bounded_caps_in_flight_tasks() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<(usize, usize)> = (0..40).map(|i| (i, i)).collect();

        let slots = run_bounded(items, 3, &Shutdown::new(), |i| {
            let live = live.clone();
            let peak = peak.clone();
            async move {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                live.fetch_sub(1, Ordering::SeqCst);
                i * 2
            }
        })
        .await;

        assert_eq!(slots.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(slots
            .iter()
            .all(|(k, s)| matches!(s, Slot::Done(v) if *v == k * 2)));
    }

    #[tokio::test]
    async fn panics_stay_inside_their_slot() {
        let items: Vec<(usize, usize)> = (0..5).map(|i| (i, i)).collect();
        let slots = run_bounded(items, 2, &Shutdown::new(), |i| async move {
            if i == 2 {
                panic!("boom on {i}");
            }
            i
        })
        .await;

        let panicked: Vec<usize> = slots
            .iter()
            .filter_map(|(k, s)| match s {
                Slot::Panicked(msg) => {
                    assert!(msg.contains("boom"));
                    Some(*k)
                }
                _ => None,
            })
            .collect();
        assert_eq!(panicked, vec![2]);
        assert_eq!(slots.iter().filter(|(_, s)| matches!(s, Slot::Done(_))).count(), 4);
    }

    #[test]
    fn settings_survive_unvalidated_jitter() {
        let cfg = ScanConfig {
            jitter: f64::INFINITY,
            ..ScanConfig::default()
        };
        assert_eq!(PipelineSettings::from(&cfg).jitter, Duration::ZERO);
    }

    #[test]
    fn failed_targets_stay_out_of_the_tally() {
        let pending = |index: usize| PendingTarget {
            index,
            url: format!("http://t{index}.example"),
            parse_error: None,
            saved_name: format!("t{index}"),
        };
        let ok = Target::new(
            pending(0),
            FetchOutcome::Success(snaphound_core::PageMeta::default()),
        );
        let slow = Target::new(pending(1), FetchOutcome::Timeout);
        let refused = Target::new(pending(2), FetchOutcome::ConnectionRefused);

        let tally = tally_categories(&[ok, slow, refused]);
        assert_eq!(tally.count("uncategorized"), 1);
        assert_eq!(tally.total(), 1);
    }

    #[tokio::test]
    async fn triggered_shutdown_skips_everything() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let items: Vec<(usize, usize)> = (0..4).map(|i| (i, i)).collect();
        let slots = run_bounded(items, 2, &shutdown, |i| async move { i }).await;
        assert!(slots.iter().all(|(_, s)| matches!(s, Slot::Skipped)));
    }
}
