use crate::args::Cli;
use anyhow::{Context, anyhow};
use snaphound_analyzer::{Classifier, RuleError, RuleSet};
use snaphound_config::{ConfigError, ScanConfig};
use snaphound_core::{OutputLayout, PathsLike, Shutdown, Target, utils::read_urls};
use snaphound_report::{
    ReportOptions, compress_dir, read_results_json, serve, write_report, write_requests_csv,
    write_results_json,
};
use snaphound_scanner::{ChromeRenderer, HttpFetcher, Orchestrator, PipelineSettings};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_CATEGORY_FILE: &str = "categories.txt";
const DEFAULT_SIGNATURE_FILE: &str = "signatures.txt";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error("input: {0:#}")]
    Input(anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// 2 for anything wrong with what the user asked for, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Rules(_) | AppError::Input(_) => 2,
            AppError::Other(_) => 1,
        }
    }
}

pub fn load_config(cli: &Cli) -> Result<ScanConfig, AppError> {
    let mut cfg = match &cli.config {
        Some(path) => ScanConfig::from_file(path.as_std_path())?,
        None => ScanConfig::default(),
    };
    cli.apply(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// A rule file named explicitly must exist; the default one may be absent.
fn load_rules(explicit: Option<&PathBuf>, default_name: &str) -> Result<RuleSet, RuleError> {
    match explicit {
        Some(path) => RuleSet::load(path),
        None => Ok(RuleSet::load_or_empty(Path::new(default_name))),
    }
}

pub fn load_classifier(cfg: &ScanConfig) -> Result<Classifier, AppError> {
    let categories = load_rules(cfg.category_file.as_ref(), DEFAULT_CATEGORY_FILE)?;
    let signatures = load_rules(cfg.signature_file.as_ref(), DEFAULT_SIGNATURE_FILE)?;
    info!(
        categories = categories.len(),
        signatures = signatures.len(),
        "rules loaded"
    );
    Ok(Classifier::new(categories, signatures))
}

async fn read_input(cli: &Cli) -> Result<Vec<String>, AppError> {
    if let Some(url) = &cli.single {
        return Ok(vec![url.trim().to_string()]);
    }
    let path = cli
        .file
        .as_ref()
        .ok_or_else(|| AppError::Input(anyhow!("no input source given")))?;
    read_urls(path.as_std_path())
        .await
        .with_context(|| format!("reading {path}"))
        .map_err(AppError::Input)
}

/// Targets from an earlier run named by `--resume`. A missing or unreadable
/// file is an input error; resuming from nothing is not what was asked for.
fn load_previous(cli: &Cli) -> Result<Vec<Target>, AppError> {
    let Some(path) = &cli.resume else {
        return Ok(Vec::new());
    };
    let previous = read_results_json(path.as_std_path()).map_err(AppError::Input)?;
    info!(targets = previous.len(), "resuming from {path}");
    Ok(previous)
}

fn watch_for_interrupt(shutdown: Shutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing with what has been fetched");
            shutdown.trigger();
        }
    });
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    let cfg = load_config(&cli)?;
    let classifier = load_classifier(&cfg)?;
    let urls = read_input(&cli).await?;
    info!(targets = urls.len(), "input read");
    let previous = load_previous(&cli)?;

    let layout = OutputLayout::new(cfg.output_dir.clone());
    layout.create()?;

    let cookies = cfg.cookie_header();
    let fetcher = HttpFetcher::new(
        cfg.user_agent.as_deref(),
        cfg.proxy.as_deref(),
        cookies.as_deref(),
        cfg.max_redirects,
    )
    .map_err(|e| AppError::Config(ConfigError::Invalid(format!("{e:#}"))))?;
    let renderer = ChromeRenderer::new(
        cfg.window_size,
        cfg.capture_delay(),
        cfg.capture_concurrency,
        cookies,
    );

    let shutdown = Shutdown::new();
    watch_for_interrupt(shutdown.clone());

    let orchestrator = Orchestrator::new(
        Arc::new(fetcher),
        Arc::new(renderer),
        classifier,
        PipelineSettings::from(&cfg),
        shutdown,
    );

    let started = Instant::now();
    let result = orchestrator.resume(&urls, &layout, previous).await;
    if result.skipped > 0 {
        warn!(
            skipped = result.skipped,
            "run interrupted, report covers {} of {} targets",
            result.targets.len(),
            urls.len()
        );
    }

    let root = layout.root_dir();
    let opts = ReportOptions::from_config(&cfg);
    let pages = write_report(root, &result.targets, &result.tally, &opts)?;
    write_requests_csv(root, &result.targets)?;
    write_results_json(root, &result.targets)?;
    info!(
        pages = pages.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "report ready at {}",
        root.join("report.html").display()
    );

    if cfg.compress {
        compress_dir(root)?;
    }

    if let Some(port) = cli.serve {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || serve(&root, port))
            .await
            .context("preview server task")??;
    }

    Ok(())
}
