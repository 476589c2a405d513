use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const UNCATEGORIZED: &str = "uncategorized";

pub type Header = (String, String);

/// What a successful fetch leaves behind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMeta {
    pub status: u16,
    pub final_url: String,
    pub headers: Vec<Header>,
    pub title: Option<String>,
    /// Set when the page was only reachable by accepting a bad certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_error: Option<String>,
    #[serde(skip)]
    pub body: String,
}

/// Result of the single network attempt made for a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail")]
pub enum FetchOutcome {
    Success(PageMeta),
    Timeout,
    ConnectionRefused,
    /// HTTP 401/403. The response headers are still worth showing.
    Unauthorized { status: u16, headers: Vec<Header> },
    TlsError(String),
    BadUrl(String),
    UnknownError(String),
    Offline,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    /// Short state name, used in logs and `Requests.csv`.
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Success(_) => "Successful",
            FetchOutcome::Timeout => "Timeout",
            FetchOutcome::ConnectionRefused => "ConnectionRefused",
            FetchOutcome::Unauthorized { .. } => "Unauthorized",
            FetchOutcome::TlsError(_) => "TLSError",
            FetchOutcome::BadUrl(_) => "BadURL",
            FetchOutcome::UnknownError(_) => "UnknownError",
            FetchOutcome::Offline => "Offline",
        }
    }

    pub fn headers(&self) -> &[Header] {
        match self {
            FetchOutcome::Success(meta) => &meta.headers,
            FetchOutcome::Unauthorized { headers, .. } => headers,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail")]
pub enum CaptureOutcome {
    /// Path relative to the report root.
    Captured(PathBuf),
    Timeout,
    Failed(String),
    #[default]
    NotAttempted,
}

/// A normalized URL waiting for the fetch pass.
#[derive(Debug, Clone)]
pub struct PendingTarget {
    /// Position in the input list; reports keep input order stable on ties.
    pub index: usize,
    pub url: String,
    /// Set when normalization failed; the fetch pass turns it into `BadUrl`.
    pub parse_error: Option<String>,
    pub saved_name: String,
}

/// One endpoint under assessment.
///
/// Built by the fetch pass, touched once more by the capture pass, then
/// read-only. `results.json` is a list of these, which is what `--resume`
/// reads back; the page body is not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    #[serde(skip)]
    pub index: usize,
    pub url: String,
    pub saved_name: String,
    pub fetch: FetchOutcome,
    pub redirect_chain: Vec<String>,
    pub category: String,
    pub credentials: Vec<String>,
    pub capture: CaptureOutcome,
    pub source_artifact: Option<PathBuf>,
    pub header_artifact: Option<PathBuf>,
}

impl Target {
    pub fn new(pending: PendingTarget, fetch: FetchOutcome) -> Self {
        Self {
            index: pending.index,
            url: pending.url,
            saved_name: pending.saved_name,
            fetch,
            redirect_chain: Vec::new(),
            category: UNCATEGORIZED.to_string(),
            credentials: Vec::new(),
            capture: CaptureOutcome::NotAttempted,
            source_artifact: None,
            header_artifact: None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match &self.fetch {
            FetchOutcome::Success(meta) => meta.title.as_deref(),
            _ => None,
        }
    }

    /// Title used for sorting and similarity; empty when there is none.
    pub fn sort_title(&self) -> &str {
        self.title().unwrap_or("")
    }

    pub fn screenshot(&self) -> Option<&PathBuf> {
        match &self.capture {
            CaptureOutcome::Captured(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(url: &str) -> PendingTarget {
        PendingTarget {
            index: 0,
            url: url.to_string(),
            parse_error: None,
            saved_name: "x".into(),
        }
    }

    #[test]
    fn new_target_defaults() {
        let t = Target::new(pending("http://a.example"), FetchOutcome::Timeout);
        assert_eq!(t.category, UNCATEGORIZED);
        assert!(t.credentials.is_empty());
        assert!(matches!(t.capture, CaptureOutcome::NotAttempted));
        assert_eq!(t.title(), None);
        assert_eq!(t.sort_title(), "");
    }

    #[test]
    fn unauthorized_keeps_headers() {
        let outcome = FetchOutcome::Unauthorized {
            status: 401,
            headers: vec![("WWW-Authenticate".into(), "Basic".into())],
        };
        assert_eq!(outcome.headers().len(), 1);
        assert_eq!(outcome.label(), "Unauthorized");
        assert!(!outcome.is_success());
    }

    #[test]
    fn body_is_not_serialized() {
        let meta = PageMeta {
            status: 200,
            final_url: "http://a.example/".into(),
            headers: vec![],
            title: Some("Home".into()),
            cert_error: None,
            body: "<html>secret</html>".into(),
        };
        let t = Target::new(pending("http://a.example"), FetchOutcome::Success(meta));
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"Home\""));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn saved_targets_load_back_without_body() {
        let meta = PageMeta {
            status: 200,
            final_url: "https://a.example/".into(),
            title: Some("Home".into()),
            cert_error: Some("invalid peer certificate: UnknownIssuer".into()),
            body: "<html>gone</html>".into(),
            ..PageMeta::default()
        };
        let mut t = Target::new(pending("https://a.example"), FetchOutcome::Success(meta));
        t.index = 7;
        t.capture = CaptureOutcome::Captured(PathBuf::from("screens/x.png"));

        let json = serde_json::to_string(&t).unwrap();
        let back: Target = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index, 0);
        assert_eq!(back.screenshot(), Some(&PathBuf::from("screens/x.png")));
        match back.fetch {
            FetchOutcome::Success(meta) => {
                assert!(meta.body.is_empty());
                assert!(meta.cert_error.unwrap().contains("UnknownIssuer"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
