//! Paginated HTML report.
//!
//! Rows are streamed into page buffers as sections are walked. A page is
//! sealed as soon as it holds `page_size` rows; the navigation bar is added
//! to every buffered page once the final page count is known, and only
//! then is anything written to disk.

use crate::{
    fragment::{escape_html, render_row},
    templates::{self, PAGE_FOOT, STYLE_CSS, STYLE_CSS_NAME, TABLE_FOOT, TABLE_HEAD},
};
use anyhow::{Context, Result};
use snaphound_analyzer::{canonical_key, cluster, display_label, section_rank};
use snaphound_config::{ReportMode, ScanConfig};
use snaphound_core::{utils::write_str_to_file, CategoryTally, Target};
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

const REPORT_TITLE: &str = "SnapHound Report";
const ERRORS_SECTION: &str = "Errors";

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub mode: ReportMode,
    pub page_size: usize,
    pub similarity_threshold: f64,
    /// Timestamp printed in every page header.
    pub generated: String,
}

impl ReportOptions {
    pub fn from_config(cfg: &ScanConfig) -> Self {
        Self {
            mode: cfg.report_mode,
            page_size: cfg.results_per_page,
            similarity_threshold: cfg.similarity_threshold,
            generated: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// A finished page, ready to write.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub number: usize,
    pub file_name: String,
    pub rows: usize,
    pub html: String,
}

pub fn page_file_name(number: usize) -> String {
    if number <= 1 {
        "report.html".to_string()
    } else {
        format!("report_page{number}.html")
    }
}

struct Section<'a> {
    id: String,
    title: String,
    rows: Vec<&'a Target>,
}

#[derive(Debug, Clone)]
struct TocEntry {
    id: String,
    title: String,
    page: usize,
    count: usize,
}

#[derive(Default)]
struct PageBuf {
    body: String,
    rows: usize,
    table_open: bool,
}

struct Paginator {
    page_size: usize,
    sealed: Vec<PageBuf>,
    current: PageBuf,
    /// Title of the section whose rows are still coming.
    open_section: Option<String>,
    toc: Vec<TocEntry>,
}

impl Paginator {
    fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            sealed: Vec::new(),
            current: PageBuf::default(),
            open_section: None,
            toc: Vec::new(),
        }
    }

    fn page_number(&self) -> usize {
        self.sealed.len() + 1
    }

    fn begin_section(&mut self, id: &str, title: &str, count: usize) {
        self.toc.push(TocEntry {
            id: id.to_string(),
            title: title.to_string(),
            page: self.page_number(),
            count,
        });
        let _ = writeln!(
            self.current.body,
            r#"<h2 id="{}">{}</h2>"#,
            escape_html(id),
            escape_html(title)
        );
        self.current.body.push_str(TABLE_HEAD);
        self.current.table_open = true;
        self.open_section = Some(title.to_string());
    }

    fn push_row(&mut self, row: &str) {
        if !self.current.table_open {
            if let Some(title) = &self.open_section {
                let _ = writeln!(self.current.body, "<h2>{} (continued)</h2>", escape_html(title));
            }
            self.current.body.push_str(TABLE_HEAD);
            self.current.table_open = true;
        }
        self.current.body.push_str(row);
        self.current.rows += 1;
        if self.current.rows == self.page_size {
            self.seal();
        }
    }

    fn end_section(&mut self) {
        self.close_table();
        self.open_section = None;
    }

    fn close_table(&mut self) {
        if self.current.table_open {
            self.current.body.push_str(TABLE_FOOT);
            self.current.table_open = false;
        }
    }

    fn seal(&mut self) {
        self.close_table();
        let full = std::mem::take(&mut self.current);
        self.sealed.push(full);
    }

    /// Flush the trailing page. Runs once; a page left empty by an exact
    /// multiple of `page_size` is dropped unless it is the only page.
    fn finish(mut self) -> (Vec<PageBuf>, Vec<TocEntry>) {
        self.close_table();
        if self.current.rows > 0 || self.sealed.is_empty() {
            let last = std::mem::take(&mut self.current);
            self.sealed.push(last);
        }
        (self.sealed, self.toc)
    }
}

fn by_title_then_url(a: &&Target, b: &&Target) -> std::cmp::Ordering {
    a.sort_title()
        .cmp(b.sort_title())
        .then_with(|| a.url.cmp(&b.url))
        .then_with(|| a.index.cmp(&b.index))
}

/// `{prefix}-{n}-{slug}`. The position keeps keys that slug alike apart.
fn anchor(prefix: &str, n: usize, key: &str) -> String {
    let slug: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{prefix}-{n}-{slug}")
}

/// Failed fetches, grouped at the end of either layout.
fn error_section(targets: &[Target]) -> Option<Section<'_>> {
    let mut rows: Vec<&Target> = targets.iter().filter(|t| !t.fetch.is_success()).collect();
    if rows.is_empty() {
        return None;
    }
    rows.sort_by(|a, b| {
        a.fetch
            .label()
            .cmp(b.fetch.label())
            .then_with(|| a.url.cmp(&b.url))
            .then_with(|| a.index.cmp(&b.index))
    });
    Some(Section {
        id: "errors".to_string(),
        title: ERRORS_SECTION.to_string(),
        rows,
    })
}

fn category_sections(targets: &[Target]) -> Vec<Section<'_>> {
    let mut by_category: BTreeMap<&str, Vec<&Target>> = BTreeMap::new();
    for t in targets.iter().filter(|t| t.fetch.is_success()) {
        by_category.entry(canonical_key(&t.category)).or_default().push(t);
    }

    let mut keys: Vec<&str> = by_category.keys().copied().collect();
    keys.sort_by_key(|k| section_rank(*k));

    keys.into_iter()
        .filter_map(|key| by_category.remove(key).map(|rows| (key, rows)))
        .enumerate()
        .map(|(n, (key, mut rows))| {
            rows.sort_by(by_title_then_url);
            Section {
                id: anchor("cat", n + 1, key),
                title: display_label(key).to_string(),
                rows,
            }
        })
        .collect()
}

fn similarity_sections(targets: &[Target], threshold: f64) -> Vec<Section<'_>> {
    cluster(targets.iter().filter(|t| t.fetch.is_success()), threshold)
        .into_iter()
        .enumerate()
        .map(|(n, group)| {
            let seed = match group.seed().title() {
                Some(title) if !title.trim().is_empty() => title.trim().to_string(),
                _ => "(no title)".to_string(),
            };
            Section {
                id: format!("group-{}", n + 1),
                title: format!("{seed} [{}]", group.len()),
                rows: group.members,
            }
        })
        .collect()
}

/// Category counts over fetched pages, then failures, then every input.
fn summary_block(tally: &CategoryTally, errors: usize) -> String {
    let mut entries: Vec<(&str, &str, usize)> = tally
        .iter()
        .map(|(key, entry)| (key, entry.label.as_str(), entry.count))
        .collect();
    entries.sort_by_key(|(key, _, _)| section_rank(*key));

    let mut html = String::from("<table class=\"summary\">\n<tr><th>Category</th><th>Count</th></tr>\n");
    for (_, label, count) in entries {
        let _ = writeln!(
            html,
            r#"<tr><td>{}</td><td class="count">{count}</td></tr>"#,
            escape_html(label)
        );
    }
    if errors > 0 {
        let _ = writeln!(
            html,
            r#"<tr><td>{ERRORS_SECTION}</td><td class="count">{errors}</td></tr>"#
        );
    }
    let _ = writeln!(
        html,
        r#"<tr><th>Total</th><th class="count">{}</th></tr>"#,
        tally.total() + errors
    );
    html.push_str("</table>\n");
    html
}

fn toc_block(toc: &[TocEntry]) -> String {
    let mut html = String::from("<h2>Table of Contents</h2>\n<ul class=\"toc\">\n");
    for entry in toc {
        let _ = writeln!(
            html,
            r#"<li><a href="{}#{}">{}</a> ({})</li>"#,
            page_file_name(entry.page),
            escape_html(&entry.id),
            escape_html(&entry.title),
            entry.count
        );
    }
    html.push_str("</ul>\n");
    html
}

/// `Page 1 ... Page N` plus Prev/Next. Empty for a single page.
fn navigation(page: usize, total: usize) -> String {
    if total <= 1 {
        return String::new();
    }
    let mut html = String::from("<div class=\"nav\">\n");
    if page > 1 {
        let _ = write!(html, r#"<a href="{}">Previous Page</a> "#, page_file_name(page - 1));
    }
    for n in 1..=total {
        if n == page {
            let _ = write!(html, r#"<span class="current">Page {n}</span>"#);
        } else {
            let _ = write!(html, r#"<a href="{}">Page {n}</a>"#, page_file_name(n));
        }
    }
    if page < total {
        let _ = write!(html, r#" <a href="{}">Next Page</a>"#, page_file_name(page + 1));
    }
    html.push_str("\n</div>\n");
    html
}

/// Lay out every target into pages without touching the disk.
pub fn assemble(targets: &[Target], tally: &CategoryTally, opts: &ReportOptions) -> Vec<RenderedPage> {
    let mut sections = match opts.mode {
        ReportMode::Category => category_sections(targets),
        ReportMode::Similarity => similarity_sections(targets, opts.similarity_threshold),
    };
    sections.extend(error_section(targets));

    let mut pager = Paginator::new(opts.page_size);
    for section in &sections {
        pager.begin_section(&section.id, &section.title, section.rows.len());
        for target in &section.rows {
            pager.push_row(&render_row(target));
        }
        pager.end_section();
    }
    let (bufs, toc) = pager.finish();

    let total = bufs.len();
    let errors = targets.iter().filter(|t| !t.fetch.is_success()).count();
    let summary = summary_block(tally, errors);
    bufs.into_iter()
        .enumerate()
        .map(|(i, buf)| {
            let number = i + 1;
            let title = if total > 1 {
                format!("{REPORT_TITLE} - Page {number}")
            } else {
                REPORT_TITLE.to_string()
            };
            let nav = navigation(number, total);

            let mut html = templates::page_head(&title, &opts.generated);
            html.push_str(&summary);
            if number == 1 && !toc.is_empty() {
                html.push_str(&toc_block(&toc));
            }
            html.push_str(&nav);
            html.push_str(&buf.body);
            html.push_str(&nav);
            html.push_str(PAGE_FOOT);

            RenderedPage {
                number,
                file_name: page_file_name(number),
                rows: buf.rows,
                html,
            }
        })
        .collect()
}

/// Assemble and write `style.css` plus every page under `root`.
pub fn write_report(
    root: &Path,
    targets: &[Target],
    tally: &CategoryTally,
    opts: &ReportOptions,
) -> Result<Vec<PathBuf>> {
    write_str_to_file(&root.join(STYLE_CSS_NAME), STYLE_CSS)
        .with_context(|| format!("writing stylesheet under {}", root.display()))?;

    let pages = assemble(targets, tally, opts);
    let mut written = Vec::with_capacity(pages.len());
    for page in pages {
        let path = root.join(&page.file_name);
        write_str_to_file(&path, &page.html)
            .with_context(|| format!("writing report page {}", path.display()))?;
        debug!(page = page.number, rows = page.rows, "wrote {}", path.display());
        written.push(path);
    }
    info!(pages = written.len(), targets = targets.len(), "report written");
    Ok(written)
}
