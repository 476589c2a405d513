use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 7;
pub const DEFAULT_FETCH_CONCURRENCY: usize = 10;
pub const DEFAULT_CAPTURE_CONCURRENCY: usize = 2;
pub const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RESULTS_PER_PAGE: usize = 25;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
/// Upper bound for `jitter` and `capture_delay`, seconds.
pub const MAX_DELAY_SECS: f64 = 3600.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Layout of the generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// One section per category, in catalogue order.
    #[default]
    Category,
    /// One run of rows per near-duplicate title cluster.
    Similarity,
}

/// Everything the pipeline needs to know about one run.
///
/// Every field has a default, so a TOML file only has to name what it
/// changes. CLI flags are layered on top by the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Per-request fetch timeout, seconds.
    pub timeout: u64,
    pub fetch_concurrency: usize,
    pub capture_concurrency: usize,
    /// Hard wall-clock limit for one screenshot, seconds.
    pub capture_timeout: u64,
    /// Pause between navigation and screenshot, seconds.
    pub capture_delay: f64,
    pub results_per_page: usize,
    /// Upper bound of the random pause before each fetch, seconds.
    pub jitter: f64,
    pub proxy: Option<String>,
    pub trace_redirects: bool,
    pub max_redirects: usize,
    pub user_agent: Option<String>,
    /// `name=value` pairs separated by commas, sent with every request.
    pub cookies: Option<String>,
    pub prepend_https: bool,
    pub report_mode: ReportMode,
    pub similarity_threshold: f64,
    pub compress: bool,
    pub category_file: Option<PathBuf>,
    pub signature_file: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub window_size: (u32, u32),
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            capture_concurrency: DEFAULT_CAPTURE_CONCURRENCY,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT_SECS,
            capture_delay: 0.0,
            results_per_page: DEFAULT_RESULTS_PER_PAGE,
            jitter: 0.0,
            proxy: None,
            trace_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: None,
            cookies: None,
            prepend_https: false,
            report_mode: ReportMode::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            compress: false,
            category_file: None,
            signature_file: None,
            output_dir: PathBuf::from("snaphound-report"),
            window_size: (1200, 800),
        }
    }
}

impl ScanConfig {
    /// Load a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_concurrency == 0 || self.capture_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency limits must be at least 1".into(),
            ));
        }
        if self.capture_concurrency >= self.fetch_concurrency {
            return Err(ConfigError::Invalid(format!(
                "capture concurrency ({}) must be smaller than fetch concurrency ({})",
                self.capture_concurrency, self.fetch_concurrency
            )));
        }
        if self.results_per_page == 0 {
            return Err(ConfigError::Invalid("results per page must be at least 1".into()));
        }
        if self.timeout == 0 || self.capture_timeout == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least 1 second".into()));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "similarity threshold {} is outside (0, 1]",
                self.similarity_threshold
            )));
        }
        for (name, value) in [("jitter", self.jitter), ("capture delay", self.capture_delay)] {
            if !(0.0..=MAX_DELAY_SECS).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} {value} must be between 0 and {MAX_DELAY_SECS} seconds"
                )));
            }
        }
        if let Some(raw) = &self.cookies {
            if let Some(bad) = raw.split(',').map(str::trim).find(|pair| !is_cookie_pair(pair)) {
                return Err(ConfigError::Invalid(format!("cookie {bad:?} is not name=value")));
            }
        }
        if self.max_redirects == 0 {
            return Err(ConfigError::Invalid("max redirects must be at least 1".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout)
    }

    pub fn capture_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.capture_delay).unwrap_or(Duration::ZERO)
    }

    pub fn jitter(&self) -> Duration {
        Duration::try_from_secs_f64(self.jitter).unwrap_or(Duration::ZERO)
    }

    /// `cookies` as a `Cookie` header value.
    pub fn cookie_header(&self) -> Option<String> {
        let raw = self.cookies.as_deref()?;
        let pairs: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

fn is_cookie_pair(pair: &str) -> bool {
    match pair.split_once('=') {
        Some((name, _)) => !name.trim().is_empty(),
        None => pair.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = ScanConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.results_per_page, 25);
        assert!(cfg.capture_concurrency < cfg.fetch_concurrency);
    }

    #[test]
    fn capture_pool_must_be_smaller() {
        let cfg = ScanConfig {
            fetch_concurrency: 2,
            capture_concurrency: 2,
            ..ScanConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_page_size_and_bad_threshold() {
        let cfg = ScanConfig {
            results_per_page: 0,
            ..ScanConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ScanConfig {
            similarity_threshold: 1.5,
            ..ScanConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn delays_must_be_finite_and_bounded() {
        for jitter in [f64::INFINITY, f64::NAN, -1.0, 1e12] {
            let cfg = ScanConfig {
                jitter,
                ..ScanConfig::default()
            };
            assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))), "jitter {jitter}");
        }
        for capture_delay in [f64::INFINITY, f64::NAN, MAX_DELAY_SECS + 1.0] {
            let cfg = ScanConfig {
                capture_delay,
                ..ScanConfig::default()
            };
            assert!(cfg.validate().is_err(), "delay {capture_delay}");
        }
        let cfg = ScanConfig {
            similarity_threshold: f64::NAN,
            ..ScanConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ScanConfig {
            jitter: 2.5,
            capture_delay: MAX_DELAY_SECS,
            ..ScanConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.jitter(), Duration::from_millis(2500));
    }

    #[test]
    fn unvalidated_delays_do_not_panic() {
        let cfg = ScanConfig {
            jitter: f64::INFINITY,
            capture_delay: f64::NAN,
            ..ScanConfig::default()
        };
        assert_eq!(cfg.jitter(), Duration::ZERO);
        assert_eq!(cfg.capture_delay(), Duration::ZERO);
    }

    #[test]
    fn cookies_become_one_header() {
        let cfg = ScanConfig {
            cookies: Some("session=abc, theme=dark".into()),
            ..ScanConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cookie_header().as_deref(), Some("session=abc; theme=dark"));

        let cfg = ScanConfig {
            cookies: Some("session".into()),
            ..ScanConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(ScanConfig::default().cookie_header(), None);
    }

    #[test]
    fn toml_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "results_per_page = 10\nreport_mode = \"similarity\"\nproxy = \"http://127.0.0.1:8080\""
        )
        .unwrap();

        let cfg = ScanConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.results_per_page, 10);
        assert_eq!(cfg.report_mode, ReportMode::Similarity);
        assert_eq!(cfg.proxy.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "threads = 4").unwrap();
        assert!(matches!(
            ScanConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
