//! Utility functions for name handling and display formatting.

pub mod format;

pub use format::{canonical_name, collapse_whitespace, display_name, truncate_string};
