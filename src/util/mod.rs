//! Utility functions shared by the engine and the fetchers.
//!
//! - **Source classification**: decide whether a feed lives on HTTP or on local disk
//! - **Text processing**: Unicode-aware width, truncation and single-line sanitizing
//!
//! # Examples
//!
//! ```
//! use feedwatch::util::{sanitize_line, truncate_to_width, validate_source};
//!
//! let source = validate_source("https://example.com/feed.xml").unwrap();
//! let title = sanitize_line("Breaking\nnews");
//! let short = truncate_to_width(&title, 10);
//! ```

mod text;
mod url_validator;

pub use text::{display_width, sanitize_line, truncate_to_width, ELLIPSIS};
pub use url_validator::{resolve_redirect, validate_source, Source, SourceError};
