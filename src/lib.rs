//! Feed polling and announcement engine.
//!
//! Feeds are polled on their own intervals, new items are detected against a
//! persisted set of identifiers, and announcements are handed to a
//! [`notify::Notifier`]. A [`engine::Scheduler`] spreads the work over a fixed
//! global tick.

pub mod config;
pub mod engine;
pub mod feed;
pub mod notify;
pub mod shutdown;
pub mod util;
