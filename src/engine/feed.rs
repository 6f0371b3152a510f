use crate::config::FeedConfig;
use crate::engine::message::{render, summary};
use crate::engine::store::{DedupStore, StoreError, StoreState};
use crate::feed::{ExtractionResult, FetchClient, FetchOutcome, FetchRequest, Item};
use crate::notify::Notifier;
use std::collections::HashSet;
use std::time::Duration;

/// What one [`Feed::update`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not due yet; no network traffic.
    Skipped,
    /// Fetched, but the source reported nothing new (304, same validators, moved).
    Unchanged,
    /// A snapshot was processed.
    Updated(UpdateReport),
    /// Fetch failed; the feed's backoff grew.
    Disabled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Items sent individually.
    pub announced: usize,
    /// New items beyond `max_items`, covered by one summary line.
    pub suppressed: usize,
    /// First snapshot for a feed without prior state: everything was recorded, nothing sent.
    pub seeded: bool,
}

/// One polled source and everything it remembers.
pub struct Feed {
    config: FeedConfig,
    /// Current location; replaced when the source moves permanently.
    url: String,
    age: f64,
    backoff: f64,
    etag: Option<String>,
    last_modified: Option<String>,
    /// `None` until state is loaded from disk or seeded from a first snapshot.
    known: Option<HashSet<String>>,
    last_seen: f64,
    store: DedupStore,
    /// In-memory state that the last save attempt failed to persist.
    dirty: bool,
}

impl Feed {
    /// Builds a feed and loads its state file.
    ///
    /// An unreadable state file is treated like a missing one: the next
    /// successful fetch seeds silently instead of replaying history.
    pub fn new(config: FeedConfig) -> Self {
        let store = DedupStore::new(config.state_path());
        let (known, last_seen) = match store.load() {
            Ok(Some(state)) => (Some(state.known), state.last_seen),
            Ok(None) => (None, 0.0),
            Err(e) => {
                tracing::warn!(
                    feed = %config.name,
                    error = %e,
                    "Unreadable state file, starting without prior state"
                );
                (None, 0.0)
            }
        };

        let age = if config.poll_on_start {
            config.interval.as_secs_f64()
        } else {
            0.0
        };

        Self {
            url: config.url.clone(),
            config,
            age,
            backoff: 0.0,
            etag: None,
            last_modified: None,
            known,
            last_seen,
            store,
            dirty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn backoff(&self) -> f64 {
        self.backoff
    }

    pub fn known_items(&self) -> Option<&HashSet<String>> {
        self.known.as_ref()
    }

    pub fn last_seen(&self) -> f64 {
        self.last_seen
    }

    pub fn validators(&self) -> (Option<&str>, Option<&str>) {
        (self.etag.as_deref(), self.last_modified.as_deref())
    }

    /// Advances the feed's clock by `elapsed` and polls it if it is due.
    pub async fn update(
        &mut self,
        elapsed: Duration,
        client: &dyn FetchClient,
        notifier: &dyn Notifier,
    ) -> Outcome {
        let interval = self.config.interval.as_secs_f64();
        self.age += elapsed.as_secs_f64();
        if self.age < interval + self.backoff {
            return Outcome::Skipped;
        }
        self.age = if interval > 0.0 {
            self.age % interval
        } else {
            0.0
        };

        let fetched = client
            .fetch(FetchRequest {
                url: &self.url,
                mode: &self.config.mode,
                etag: self.etag.as_deref(),
                last_modified: self.last_modified.as_deref(),
            })
            .await;

        let mut result = match fetched {
            Err(e) => {
                self.disable();
                tracing::warn!(
                    feed = %self.config.name,
                    url = %self.url,
                    error = %e,
                    backoff = self.backoff,
                    "Can't fetch feed, backing off"
                );
                return Outcome::Disabled;
            }
            Ok(FetchOutcome::NotModified) => {
                self.backoff = 0.0;
                tracing::debug!(feed = %self.config.name, "Not modified");
                return Outcome::Unchanged;
            }
            Ok(FetchOutcome::Redirected { url }) => {
                self.backoff = 0.0;
                self.relocate(url);
                return Outcome::Unchanged;
            }
            Ok(FetchOutcome::Fetched(result)) => result,
        };

        self.backoff = 0.0;
        if let Some(url) = result.redirect.take() {
            self.relocate(url);
        }

        if self.same_validators(&result) {
            tracing::debug!(
                feed = %self.config.name,
                etag = ?result.etag,
                last_modified = ?result.last_modified,
                "Same validators, nothing changed"
            );
            return Outcome::Unchanged;
        }

        tracing::debug!(
            feed = %self.config.name,
            status = result.status,
            items = result.items.len(),
            etag = ?result.etag,
            last_modified = ?result.last_modified,
            "Fetched snapshot"
        );

        let report = self.process(&result.items, notifier).await;

        self.etag = result.etag;
        self.last_modified = result.last_modified;

        Outcome::Updated(report)
    }

    /// Persists the known set, if there is one. Used at shutdown.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.save()
    }

    /// True when the last save attempt failed and memory is ahead of disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Each consecutive failure adds one interval plus a tenth of the accumulated penalty.
    fn disable(&mut self) {
        self.backoff += self.config.interval.as_secs_f64() + self.backoff / 10.0;
    }

    fn relocate(&mut self, url: String) {
        if url != self.url {
            tracing::warn!(
                feed = %self.config.name,
                from = %self.url,
                to = %url,
                "Feed moved permanently, updating URL"
            );
            self.url = url;
        }
    }

    /// True when the response carries validators and every one matches what we hold.
    fn same_validators(&self, result: &ExtractionResult) -> bool {
        let etag_same = result.etag.as_ref().map(|e| Some(e) == self.etag.as_ref());
        let modified_same = result
            .last_modified
            .as_ref()
            .map(|m| Some(m) == self.last_modified.as_ref());
        match (etag_same, modified_same) {
            (None, None) => false,
            (e, m) => e.unwrap_or(true) && m.unwrap_or(true),
        }
    }

    /// Announces genuinely new items (oldest first) and refreshes the known set.
    async fn process(&mut self, items: &[Item], notifier: &dyn Notifier) -> UpdateReport {
        let mut report = UpdateReport::default();

        let changed = match &self.known {
            None => {
                report.seeded = true;
                tracing::info!(
                    feed = %self.config.name,
                    items = items.len(),
                    "No prior state, recording current items without announcing"
                );
                true
            }
            Some(known) => {
                let mut fresh = Vec::new();
                let mut changed = false;
                for item in items.iter().rev() {
                    let id = item.identifier();
                    // nothing to identify it by, so it could never be deduplicated
                    if id.is_empty() || known.contains(&id) {
                        continue;
                    }
                    changed = true;
                    if let Some(published) = item.published_at {
                        if published <= self.last_seen {
                            tracing::warn!(
                                feed = %self.config.name,
                                guid = %id,
                                published,
                                last_seen = self.last_seen,
                                "Unseen item older than last seen time, skipping"
                            );
                            continue;
                        }
                    }
                    if fresh.len() < self.config.max_items {
                        fresh.push((id, item));
                    } else {
                        report.suppressed += 1;
                    }
                }

                let targets = self.config.destinations.targets(&notifier.destinations());
                for (id, item) in fresh {
                    tracing::info!(feed = %self.config.name, guid = %id, "New item");
                    if let Some(text) = render(item, &self.config.format) {
                        self.send(notifier, &targets, &text).await;
                    }
                    report.announced += 1;
                }
                if let Some(text) = summary(report.suppressed) {
                    tracing::info!(
                        feed = %self.config.name,
                        suppressed = report.suppressed,
                        "More new items than max_items"
                    );
                    self.send(notifier, &targets, &text).await;
                }
                changed
            }
        };

        if changed {
            self.known = Some(
                items
                    .iter()
                    .map(Item::identifier)
                    .filter(|id| !id.is_empty())
                    .collect(),
            );
            let newest = items
                .iter()
                .filter_map(|i| i.published_at)
                .fold(self.last_seen, f64::max);
            self.last_seen = newest;
            if let Err(e) = self.save() {
                tracing::warn!(
                    feed = %self.config.name,
                    error = %e,
                    "Failed to save feed state, keeping it in memory"
                );
            }
        }

        report
    }

    async fn send(&self, notifier: &dyn Notifier, targets: &[String], text: &str) {
        for destination in targets {
            if let Err(e) = notifier.send(destination, text).await {
                tracing::warn!(
                    feed = %self.config.name,
                    destination = %destination,
                    error = %e,
                    "Failed to deliver announcement"
                );
            }
        }
    }

    fn save(&mut self) -> Result<(), StoreError> {
        let Some(known) = &self.known else {
            return Ok(());
        };
        let state = StoreState {
            last_seen: self.last_seen,
            known: known.clone(),
        };
        match self.store.save(&state) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                self.dirty = true;
                Err(e)
            }
        }
    }
}
