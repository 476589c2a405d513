//! One report row per target.

use snaphound_analyzer::display_label;
use snaphound_core::{CaptureOutcome, FetchOutcome, Target, UNCATEGORIZED};
use std::fmt::Write as _;
use std::path::Path;

/// Escape text for use in element content and quoted attributes.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Relative artifact path as an href, always with forward slashes.
fn href(path: &Path) -> String {
    let joined = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    escape_html(&joined)
}

/// Why there is no screenshot, or `None` when there is one.
pub fn placard_text(target: &Target) -> Option<String> {
    let text = match &target.fetch {
        FetchOutcome::Success(_) => match &target.capture {
            CaptureOutcome::Captured(_) => return None,
            CaptureOutcome::Timeout => "Hit timeout limit while attempting to screenshot".to_string(),
            CaptureOutcome::Failed(msg) => format!("Screenshot failed: {msg}"),
            CaptureOutcome::NotAttempted => "No screenshot taken".to_string(),
        },
        FetchOutcome::Timeout => "Hit timeout limit while attempting to fetch".to_string(),
        FetchOutcome::ConnectionRefused => "Connection refused".to_string(),
        FetchOutcome::Unauthorized { status, .. } => {
            format!("401/403 Unauthorized (HTTP {status})")
        }
        FetchOutcome::TlsError(msg) => format!("SSL/TLS handshake error: {msg}"),
        FetchOutcome::BadUrl(msg) => format!("Invalid URL or unresolvable host: {msg}"),
        FetchOutcome::UnknownError(msg) => format!("Unknown error while fetching: {msg}"),
        FetchOutcome::Offline => "Host offline or connection reset".to_string(),
    };
    Some(text)
}

fn info_cell(target: &Target) -> String {
    let url = escape_html(&target.url);
    let mut cell = String::new();
    let _ = writeln!(cell, r#"<a href="{url}" target="_blank">{url}</a><br>"#);

    if !target.redirect_chain.is_empty() {
        let hops: Vec<String> = target.redirect_chain.iter().map(|u| escape_html(u)).collect();
        let _ = writeln!(
            cell,
            r#"<div class="chain"><b>Redirects:</b> {}</div>"#,
            hops.join(" &rarr; ")
        );
    }

    for cred in &target.credentials {
        let _ = writeln!(
            cell,
            r#"<div class="creds">Default credentials: {}</div>"#,
            escape_html(cred)
        );
    }

    if target.category != UNCATEGORIZED {
        let _ = writeln!(
            cell,
            "<b>Category:</b> {}<br>",
            escape_html(display_label(&target.category))
        );
    }

    match &target.fetch {
        FetchOutcome::Success(meta) => {
            let title = meta.title.as_deref().unwrap_or("");
            let _ = writeln!(cell, "<b>Page Title:</b> {}<br>", escape_html(title));
            let _ = writeln!(cell, "<b>Status:</b> {}<br>", meta.status);
            if meta.final_url != target.url {
                let _ = writeln!(cell, "<b>Final URL:</b> {}<br>", escape_html(&meta.final_url));
            }
            if let Some(reason) = &meta.cert_error {
                let _ = writeln!(
                    cell,
                    r#"<div class="cert" title="{}">SSL Certificate error present</div>"#,
                    escape_html(reason)
                );
            }
        }
        FetchOutcome::Unauthorized { status, .. } => {
            let _ = writeln!(cell, "<b>Status:</b> {status}<br>");
        }
        other => {
            let _ = writeln!(cell, "<b>Error:</b> {}<br>", other.label());
        }
    }

    let headers = target.fetch.headers();
    if !headers.is_empty() {
        cell.push_str("<div class=\"headers\">\n");
        for (name, value) in headers {
            let _ = writeln!(
                cell,
                "<b>{}:</b> {}<br>",
                escape_html(name),
                escape_html(value)
            );
        }
        cell.push_str("</div>\n");
    }

    let mut links = Vec::new();
    if let Some(source) = &target.source_artifact {
        links.push(format!(
            r#"<a href="{}" target="_blank">Source Code</a>"#,
            href(source)
        ));
    }
    if let Some(headers) = &target.header_artifact {
        links.push(format!(
            r#"<a href="{}" target="_blank">Headers</a>"#,
            href(headers)
        ));
    }
    if !links.is_empty() {
        let _ = writeln!(cell, "<br>{}", links.join(" | "));
    }
    cell
}

fn shot_cell(target: &Target) -> String {
    if let Some(text) = placard_text(target) {
        let kind = if target.fetch.is_success() { "placard capture" } else { "placard" };
        return format!(r#"<div class="{kind}">{}</div>"#, escape_html(&text));
    }
    match target.screenshot() {
        Some(path) => {
            let src = href(path);
            format!(
                r#"<a href="{src}" target="_blank"><img class="shot" src="{src}" alt="{}"></a>"#,
                escape_html(&target.url)
            )
        }
        None => String::new(),
    }
}

/// The `<tr>` for one target.
pub fn render_row(target: &Target) -> String {
    format!(
        "<tr>\n<td class=\"info\">\n{}</td>\n<td>{}</td>\n</tr>\n",
        info_cell(target),
        shot_cell(target)
    )
}
