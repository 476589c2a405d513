pub mod browser_manager;
pub mod capture;
pub mod fetch;
pub mod net;
pub mod orchestrator;
pub mod screenshot;

pub use capture::{CaptureError, Renderer};
pub use fetch::{FetchError, FetchResponse, Fetcher};
pub use net::HttpFetcher;
pub use orchestrator::{tally_categories, Orchestrator, PipelineSettings, ScanResult};
pub use screenshot::ChromeRenderer;
