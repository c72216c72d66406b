//! # Media Items
//!
//! The working set of selected files, their processing status and the
//! features applied to each, plus the validation gate they pass first.

pub mod item;
pub mod validation;
pub mod working_set;

pub use item::{AppliedFeature, ItemError, MediaDimensions, MediaItem, MediaKind, MediaStatus};
pub use validation::{mime_from_path, FileValidator};
pub use working_set::WorkingSet;
