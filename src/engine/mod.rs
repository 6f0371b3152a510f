//! The feed update engine.
//!
//! - [`store`] - durable per-feed state (`last_seen` + known identifiers)
//! - [`message`] - rendering items into announcement lines
//! - [`feed`] - one feed's poll/dedup/backoff cycle
//! - [`scheduler`] - fair rotation of all feeds on a shared tick

pub mod feed;
pub mod message;
pub mod scheduler;
pub mod store;

pub use feed::{Feed, Outcome, UpdateReport};
pub use message::{render, summary, MessageFormat, RewriteRule, DEFAULT_LINE_BUDGET};
pub use scheduler::{run, Scheduler, TickReport};
pub use store::{DedupStore, StoreError, StoreState};
