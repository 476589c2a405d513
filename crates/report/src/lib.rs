pub mod archive;
pub mod assembler;
pub mod export;
pub mod fragment;
pub mod server;
pub mod templates;

pub use archive::compress_dir;
pub use assembler::{assemble, page_file_name, write_report, RenderedPage, ReportOptions};
pub use export::{
    read_results_json, write_requests_csv, write_results_json, REQUESTS_CSV, RESULTS_JSON,
};
pub use fragment::{escape_html, placard_text, render_row};
pub use server::{resolve_request_path, serve};
