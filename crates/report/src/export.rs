//! Machine-readable companions to the HTML report.

use anyhow::{Context, Result};
use csv::Writer;
use snaphound_core::Target;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};
use url::Url;

pub const REQUESTS_CSV: &str = "Requests.csv";
pub const RESULTS_JSON: &str = "results.json";

const CSV_HEADER: [&str; 6] = [
    "Protocol",
    "Port",
    "Domain",
    "Request Status",
    "Screenshot Path",
    "Source Path",
];

fn path_cell(root: &Path, rel: Option<&PathBuf>) -> String {
    rel.map(|p| root.join(p).to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One line per target, in input order.
pub fn write_requests_csv(root: &Path, targets: &[Target]) -> Result<PathBuf> {
    let csv_path = root.join(REQUESTS_CSV);
    let mut w = Writer::from_path(&csv_path)
        .with_context(|| format!("open csv for write: {}", csv_path.display()))?;
    w.write_record(CSV_HEADER)?;

    let mut ordered: Vec<&Target> = targets.iter().collect();
    ordered.sort_by_key(|t| t.index);

    for t in ordered {
        let parsed = Url::parse(&t.url).ok();
        let protocol = parsed.as_ref().map(|u| u.scheme().to_string()).unwrap_or_default();
        let port = parsed
            .as_ref()
            .and_then(Url::port_or_known_default)
            .map(|p| p.to_string())
            .unwrap_or_default();
        let domain = parsed
            .as_ref()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| t.url.clone());

        w.write_record([
            protocol,
            port,
            domain,
            t.fetch.label().to_string(),
            path_cell(root, t.screenshot()),
            path_cell(root, t.source_artifact.as_ref()),
        ])?;
    }

    w.flush()?;
    Ok(csv_path)
}

/// Full per-target records, without response bodies.
pub fn write_results_json(root: &Path, targets: &[Target]) -> Result<PathBuf> {
    let json_path = root.join(RESULTS_JSON);
    let file = File::create(&json_path)
        .with_context(|| format!("create {}", json_path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), targets)
        .with_context(|| format!("serialize {}", json_path.display()))?;
    Ok(json_path)
}

/// Targets saved by an earlier `write_results_json`, for resuming a run.
pub fn read_results_json(path: &Path) -> Result<Vec<Target>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse {}", path.display()))
}
