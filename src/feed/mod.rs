//! Getting items out of remote sources.
//!
//! - [`item`] - the normalized [`Item`] / [`ExtractionResult`] model and identifier derivation
//! - [`parser`] - RSS/Atom/JSON Feed parsing using the `feed-rs` crate
//! - [`scrape`] - declarative CSS-selector rules for pages without a feed
//! - [`fetcher`] - the [`FetchClient`] seam and its reqwest implementation
//!
//! # Example
//!
//! ```ignore
//! use feedwatch::feed::{ExtractionMode, FetchClient, FetchRequest, HttpFetchClient};
//!
//! let client = HttpFetchClient::new()?;
//! let outcome = client
//!     .fetch(FetchRequest {
//!         url: "https://example.com/feed.xml",
//!         mode: &ExtractionMode::Structured,
//!         etag: None,
//!         last_modified: None,
//!     })
//!     .await?;
//! ```

mod fetcher;
mod item;
mod parser;
pub mod scrape;

pub use fetcher::{
    ExtractionMode, FetchClient, FetchError, FetchOutcome, FetchRequest, HttpFetchClient,
    FETCH_TIMEOUT,
};
pub use item::{ExtractionResult, Item};
pub use parser::{parse_feed, ParseError};
pub use scrape::{ScrapeError, ScrapeRules, ScrapeSpec};
