//! Utility functions for slugs and string formatting.

pub mod format;
pub mod slug;

pub use format::truncate_string;
pub use slug::{find_by_slug, slugify, Slugged};
