use anyhow::{anyhow, Result};
use std::{
    fs,
    path::{Component, Path, PathBuf},
};
use tiny_http::{Header, Response, Server};
use tracing::{debug, info};

const INDEX: &str = "report.html";

/// Map a request path onto a file under `root`.
///
/// Query strings and fragments are ignored and directories fall back to the
/// report index. Anything that would climb out of `root` yields `None`.
pub fn resolve_request_path(root: &Path, raw: &str) -> Option<PathBuf> {
    let raw = raw.split(['?', '#']).next().unwrap_or(raw);
    let mut req_path = raw.trim_start_matches('/').to_string();
    if req_path.is_empty() || req_path.ends_with('/') {
        req_path.push_str(INDEX);
    }

    let mut resolved = root.to_path_buf();
    for component in Path::new(&req_path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

fn content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => return None,
    };
    Some(mime)
}

/// Serve the report directory on loopback until the process is stopped.
pub fn serve(out_dir: &Path, port: u16) -> Result<()> {
    let server =
        Server::http(format!("127.0.0.1:{port}")).map_err(|e| anyhow!("Server::http: {e}"))?;
    info!("report available at http://127.0.0.1:{port}/ (serving {})", out_dir.display());

    for rq in server.incoming_requests() {
        let raw = rq.url().to_string();

        let resp = match resolve_request_path(out_dir, &raw) {
            None => Response::from_string("403\n").with_status_code(403),
            Some(fs_path) if fs_path.is_file() => match fs::read(&fs_path) {
                Ok(bytes) => {
                    let mut resp = Response::from_data(bytes);
                    if let Some(mime) = content_type(&fs_path) {
                        if let Ok(h) = Header::from_bytes("Content-Type", mime) {
                            resp.add_header(h);
                        }
                    }
                    resp
                }
                Err(e) => Response::from_string(format!("500: {e}\n")).with_status_code(500),
            },
            Some(_) => Response::from_string("404\n").with_status_code(404),
        };

        debug!(method = %rq.method(), path = %raw, status = resp.status_code().0, "served");
        let _ = rq.respond(resp);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_nested_files_resolve_under_root() {
        let root = Path::new("/srv/report");
        assert_eq!(resolve_request_path(root, "/"), Some(root.join("report.html")));
        assert_eq!(
            resolve_request_path(root, "/report_page2.html?x=1#top"),
            Some(root.join("report_page2.html"))
        );
        assert_eq!(
            resolve_request_path(root, "/screens/a.png"),
            Some(root.join("screens").join("a.png"))
        );
    }

    #[test]
    fn traversal_is_rejected() {
        let root = Path::new("/srv/report");
        assert_eq!(resolve_request_path(root, "/../etc/passwd"), None);
        assert_eq!(resolve_request_path(root, "/screens/../../secret"), None);
    }

    #[test]
    fn known_extensions_get_a_content_type() {
        assert_eq!(content_type(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(content_type(Path::new("style.css")), Some("text/css"));
        assert_eq!(content_type(Path::new("blob.bin")), None);
    }
}
