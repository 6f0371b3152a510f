//! Delivery of announcements.
//!
//! The engine hands finished lines to a [`Notifier`] and never talks to a chat
//! network itself. Which destinations a feed reaches is decided per feed by a
//! [`DestinationFilter`].

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery to {destination} failed: {reason}")]
    Delivery { destination: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sink for announcement lines.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Destinations the sink currently knows about, used by feeds without an allow-list.
    fn destinations(&self) -> Vec<String>;

    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError>;
}

/// Per-feed allow/deny lists.
///
/// A non-empty allow-list replaces the notifier's known destinations; the
/// deny-list always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationFilter {
    pub allow: BTreeSet<String>,
    pub deny: BTreeSet<String>,
}

impl DestinationFilter {
    pub fn targets(&self, known: &[String]) -> Vec<String> {
        let candidates: Vec<String> = if self.allow.is_empty() {
            known.to_vec()
        } else {
            self.allow.iter().cloned().collect()
        };
        candidates
            .into_iter()
            .filter(|d| !self.deny.contains(d))
            .collect()
    }
}

/// Writes `[destination] text` lines to stdout.
pub struct ConsoleNotifier {
    destinations: Vec<String>,
    out: Mutex<std::io::Stdout>,
}

impl ConsoleNotifier {
    pub fn new(destinations: Vec<String>) -> Self {
        Self {
            destinations,
            out: Mutex::new(std::io::stdout()),
        }
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn destinations(&self) -> Vec<String> {
        self.destinations.clone()
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError> {
        let mut out = self.out.lock().map_err(|_| NotifyError::Delivery {
            destination: destination.to_owned(),
            reason: "stdout lock poisoned".to_owned(),
        })?;
        writeln!(out, "[{}] {}", destination, text)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn known() -> Vec<String> {
        vec!["#a".into(), "#b".into(), "#c".into()]
    }

    #[test]
    fn test_empty_allow_uses_known() {
        let filter = DestinationFilter::default();
        assert_eq!(filter.targets(&known()), known());
    }

    #[test]
    fn test_allow_list_replaces_known() {
        let filter = DestinationFilter {
            allow: set(&["#b", "#z"]),
            deny: BTreeSet::new(),
        };
        assert_eq!(filter.targets(&known()), vec!["#b".to_string(), "#z".to_string()]);
    }

    #[test]
    fn test_deny_always_excluded() {
        let filter = DestinationFilter {
            allow: BTreeSet::new(),
            deny: set(&["#b"]),
        };
        assert_eq!(filter.targets(&known()), vec!["#a".to_string(), "#c".to_string()]);

        let filter = DestinationFilter {
            allow: set(&["#b"]),
            deny: set(&["#b"]),
        };
        assert!(filter.targets(&known()).is_empty());
    }

    #[tokio::test]
    async fn test_console_notifier_reports_destinations() {
        let notifier = ConsoleNotifier::new(vec!["#news".into()]);
        assert_eq!(notifier.destinations(), vec!["#news".to_string()]);
        notifier.send("#news", "hello").await.unwrap();
    }
}
