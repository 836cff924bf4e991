//! Series classification
//!
//! Assigns tags to acquired series by matching their headers against the
//! active [`TagDefinition`](crate::config::TagDefinition)s of a context, and
//! reconciles the number of matches per tag with each tag's declared `Count`.

pub mod classifier;
pub mod counts;
pub mod series;

pub use classifier::{classify, ClassificationResult, ScanClassifier, SessionClassification, TagMatch};
pub use counts::{count_matches, reconcile_counts, CountMismatch};
pub use series::SeriesRecord;
