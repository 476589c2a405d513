pub mod layout;
pub mod shutdown;
pub mod tally;
pub mod target;
pub mod utils;

pub use layout::{OutputLayout, PathsLike};
pub use shutdown::Shutdown;
pub use tally::CategoryTally;
pub use target::{CaptureOutcome, FetchOutcome, Header, PageMeta, PendingTarget, Target, UNCATEGORIZED};
