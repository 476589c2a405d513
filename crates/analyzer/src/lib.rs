pub mod catalogue;
pub mod rules;
pub mod similarity;

pub use catalogue::{canonical_key, display_label, section_rank};
pub use rules::{classify, find_signatures, Classification, Classifier, Rule, RuleError, RuleSet};
pub use similarity::{cluster, title_similarity, Cluster};
