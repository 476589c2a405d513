use camino::Utf8PathBuf;
use clap::{ArgAction, ArgGroup, Parser};
use snaphound_config::{ReportMode, ScanConfig};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "snaphound",
    version,
    about = "Fetch, classify and screenshot web endpoints into a paginated HTML report"
)]
#[command(group(ArgGroup::new("input").required(true).args(["file", "single"])))]
pub struct Cli {
    /// File with one URL per line
    #[arg(short = 'f', long = "file")]
    pub file: Option<Utf8PathBuf>,

    /// Assess a single URL
    #[arg(long = "single")]
    pub single: Option<String>,

    /// Report directory
    #[arg(short = 'd', long = "directory")]
    pub directory: Option<Utf8PathBuf>,

    /// TOML config file; flags override its values
    #[arg(long = "config")]
    pub config: Option<Utf8PathBuf>,

    /// Per-request fetch timeout, seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Concurrent fetches
    #[arg(long = "threads")]
    pub threads: Option<usize>,

    /// Concurrent screenshots
    #[arg(long = "capture-threads")]
    pub capture_threads: Option<usize>,

    /// Wall-clock limit for one screenshot, seconds
    #[arg(long = "capture-timeout")]
    pub capture_timeout: Option<u64>,

    /// Pause between page load and screenshot, seconds
    #[arg(long = "delay")]
    pub delay: Option<f64>,

    /// Rows per report page
    #[arg(long = "results")]
    pub results: Option<usize>,

    /// Upper bound of the random pause before each request, seconds
    #[arg(long = "jitter")]
    pub jitter: Option<f64>,

    /// Proxy URL for every request (http, https or socks5)
    #[arg(long = "proxy")]
    pub proxy: Option<String>,

    /// Record the redirect chain of each target
    #[arg(long = "trace-redirects", action = ArgAction::SetTrue)]
    pub trace_redirects: bool,

    #[arg(long = "max-redirects")]
    pub max_redirects: Option<usize>,

    #[arg(long = "user-agent")]
    pub user_agent: Option<String>,

    /// Cookies for every request and screenshot, as name=value,name2=value2
    #[arg(long = "cookies")]
    pub cookies: Option<String>,

    /// results.json of an earlier run; targets it already covers are not fetched again
    #[arg(long = "resume", value_name = "RESULTS_JSON")]
    pub resume: Option<Utf8PathBuf>,

    /// Use https:// for inputs without a scheme
    #[arg(long = "prepend-https", action = ArgAction::SetTrue)]
    pub prepend_https: bool,

    /// Category rule file
    #[arg(long = "categories")]
    pub categories: Option<Utf8PathBuf>,

    /// Default-credential signature file
    #[arg(long = "signatures")]
    pub signatures: Option<Utf8PathBuf>,

    /// Group the report by similar page titles instead of by category
    #[arg(long = "group-similar", action = ArgAction::SetTrue)]
    pub group_similar: bool,

    /// Title similarity threshold for --group-similar, in (0, 1]
    #[arg(long = "similarity")]
    pub similarity: Option<f64>,

    /// Zip the report directory when done
    #[arg(long = "zip", action = ArgAction::SetTrue)]
    pub zip: bool,

    /// Serve the finished report on 127.0.0.1:PORT
    #[arg(long = "serve", value_name = "PORT")]
    pub serve: Option<u16>,

    /// Log level when RUST_LOG is unset
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Layer the flags that were given over `cfg`.
    pub fn apply(&self, cfg: &mut ScanConfig) {
        if let Some(dir) = &self.directory {
            cfg.output_dir = dir.clone().into_std_path_buf();
        }
        if let Some(v) = self.timeout {
            cfg.timeout = v;
        }
        if let Some(v) = self.threads {
            cfg.fetch_concurrency = v;
        }
        if let Some(v) = self.capture_threads {
            cfg.capture_concurrency = v;
        }
        if let Some(v) = self.capture_timeout {
            cfg.capture_timeout = v;
        }
        if let Some(v) = self.delay {
            cfg.capture_delay = v;
        }
        if let Some(v) = self.results {
            cfg.results_per_page = v;
        }
        if let Some(v) = self.jitter {
            cfg.jitter = v;
        }
        if let Some(proxy) = &self.proxy {
            cfg.proxy = Some(proxy.clone());
        }
        if let Some(v) = self.max_redirects {
            cfg.max_redirects = v;
        }
        if let Some(ua) = &self.user_agent {
            cfg.user_agent = Some(ua.clone());
        }
        if let Some(cookies) = &self.cookies {
            cfg.cookies = Some(cookies.clone());
        }
        if let Some(path) = &self.categories {
            cfg.category_file = Some(path.clone().into_std_path_buf());
        }
        if let Some(path) = &self.signatures {
            cfg.signature_file = Some(path.clone().into_std_path_buf());
        }
        if let Some(v) = self.similarity {
            cfg.similarity_threshold = v;
        }
        cfg.trace_redirects |= self.trace_redirects;
        cfg.prepend_https |= self.prepend_https;
        cfg.compress |= self.zip;
        if self.group_similar {
            cfg.report_mode = ReportMode::Similarity;
        }
    }
}
