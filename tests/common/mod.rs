//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use feedwatch::config::FeedConfig;
use feedwatch::feed::{ExtractionResult, FetchClient, FetchError, FetchOutcome, FetchRequest, Item};
use feedwatch::notify::{Notifier, NotifyError};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// What a feed asked the client for.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Answers each URL from its own queue; an empty queue answers `NotModified`.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<HashMap<String, VecDeque<Result<FetchOutcome, FetchError>>>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedClient {
    pub fn push(&self, url: &str, response: Result<FetchOutcome, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_owned())
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl FetchClient for ScriptedClient {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchOutcome, FetchError> {
        self.requests.lock().unwrap().push(Request {
            url: request.url.to_owned(),
            etag: request.etag.map(str::to_owned),
            last_modified: request.last_modified.map(str::to_owned),
        });
        self.responses
            .lock()
            .unwrap()
            .get_mut(request.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(FetchOutcome::NotModified))
    }
}

/// Records every line it is asked to deliver.
pub struct RecordingNotifier {
    destinations: Vec<String>,
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new(destinations: &[&str]) -> Self {
        Self {
            destinations: destinations.iter().map(|d| d.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A notifier whose every delivery fails (after recording the attempt).
    pub fn failing(destinations: &[&str]) -> Self {
        Self {
            fail: true,
            ..Self::new(destinations)
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn destinations(&self) -> Vec<String> {
        self.destinations.clone()
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_owned(), text.to_owned()));
        if self.fail {
            return Err(NotifyError::Delivery {
                destination: destination.to_owned(),
                reason: "connection reset".to_owned(),
            });
        }
        Ok(())
    }
}

pub fn item(guid: &str, published_at: Option<f64>) -> Item {
    Item {
        guid: Some(guid.to_owned()),
        title: Some(format!("Post {}", guid)),
        link: Some(format!("https://example.com/{}", guid)),
        published: None,
        published_at,
    }
}

pub fn snapshot(items: Vec<Item>, etag: Option<&str>) -> Result<FetchOutcome, FetchError> {
    Ok(FetchOutcome::Fetched(ExtractionResult {
        items,
        etag: etag.map(str::to_owned),
        status: 200,
        ..ExtractionResult::default()
    }))
}

pub fn feed_config(state_dir: &Path, name: &str, interval_secs: u64) -> FeedConfig {
    let mut config = FeedConfig::new(name, format!("https://example.com/{}.xml", name));
    config.interval = Duration::from_secs(interval_secs);
    config.state_dir = state_dir.to_path_buf();
    config
}

/// Writes a state file in the on-disk format.
pub fn write_state(state_dir: &Path, name: &str, last_seen: f64, ids: &[&str]) {
    let mut content = format!("{}\n", last_seen);
    for id in ids {
        content.push_str(id);
        content.push('\n');
    }
    std::fs::write(state_dir.join(name), content).unwrap();
}
