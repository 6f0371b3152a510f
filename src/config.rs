//! Configuration file parser for `feedwatch.toml`.
//!
//! The file holds global settings, a `[defaults]` table and any number of
//! `[[feeds]]` tables. Each feed table is merged over the defaults field by
//! field and then validated into an immutable [`FeedConfig`]. Unknown keys are
//! accepted by serde, though we log a warning so typos don't go unnoticed.
use crate::engine::message::{MessageFormat, RewriteRule, DEFAULT_LINE_BUDGET};
use crate::feed::{ExtractionMode, ScrapeError, ScrapeRules, ScrapeSpec};
use crate::notify::DestinationFilter;
use crate::util::{validate_source, SourceError};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("tick_seconds must be greater than zero")]
    InvalidTick,

    #[error("Feed #{index} has no name")]
    MissingName { index: usize },

    #[error("Invalid feed name {0:?}: names are used as state file names")]
    InvalidName(String),

    #[error("Duplicate feed name {0:?}")]
    DuplicateName(String),

    #[error("Missing url for feed {feed}")]
    MissingUrl { feed: String },

    #[error("Invalid url for feed {feed}: {source}")]
    Source {
        feed: String,
        #[source]
        source: SourceError,
    },

    #[error("Invalid update interval {value} for feed {feed}")]
    NegativeInterval { feed: String, value: i64 },

    #[error("Invalid {field} pattern for feed {feed}: {source}")]
    Rewrite {
        feed: String,
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid scrape rules for feed {feed}: {source}")]
    Scrape {
        feed: String,
        #[source]
        source: ScrapeError,
    },
}

// ============================================================================
// File Layout
// ============================================================================

const TOP_LEVEL_KEYS: &[&str] = &["tick_seconds", "destinations", "defaults", "feeds"];

const FEED_KEYS: &[&str] = &[
    "name",
    "url",
    "interval",
    "max_items",
    "state_dir",
    "allow",
    "deny",
    "title_rewrite",
    "link_rewrite",
    "poll_on_start",
    "line_budget",
    "scrape",
];

/// Top-level configuration as written in the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between scheduler ticks.
    pub tick_seconds: u64,

    /// Destinations the console notifier announces to.
    pub destinations: Vec<String>,

    /// Values every feed inherits unless it sets its own.
    pub defaults: FeedSection,

    pub feeds: Vec<FeedSection>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_seconds: 30,
            destinations: Vec::new(),
            defaults: FeedSection::default(),
            feeds: Vec::new(),
        }
    }
}

/// `pattern` / `template` pair for a regex rewrite.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RewriteSpec {
    pub pattern: String,
    pub template: String,
}

/// One `[[feeds]]` table (or `[defaults]`). Every key is optional here;
/// requirements are checked in [`FeedConfig::from_section`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedSection {
    pub name: Option<String>,
    pub url: Option<String>,
    /// Seconds between polls. 0 polls on every tick.
    pub interval: Option<i64>,
    pub max_items: Option<usize>,
    pub state_dir: Option<PathBuf>,
    pub allow: Option<Vec<String>>,
    pub deny: Option<Vec<String>>,
    pub title_rewrite: Option<RewriteSpec>,
    pub link_rewrite: Option<RewriteSpec>,
    pub poll_on_start: Option<bool>,
    pub line_budget: Option<usize>,
    pub scrape: Option<ScrapeSpec>,
}

impl FeedSection {
    /// Field-wise overlay: values set here win, the rest come from `defaults`.
    /// The name is never inherited.
    pub fn merged_over(&self, defaults: &FeedSection) -> FeedSection {
        FeedSection {
            name: self.name.clone(),
            url: self.url.clone().or_else(|| defaults.url.clone()),
            interval: self.interval.or(defaults.interval),
            max_items: self.max_items.or(defaults.max_items),
            state_dir: self.state_dir.clone().or_else(|| defaults.state_dir.clone()),
            allow: self.allow.clone().or_else(|| defaults.allow.clone()),
            deny: self.deny.clone().or_else(|| defaults.deny.clone()),
            title_rewrite: self
                .title_rewrite
                .clone()
                .or_else(|| defaults.title_rewrite.clone()),
            link_rewrite: self
                .link_rewrite
                .clone()
                .or_else(|| defaults.link_rewrite.clone()),
            poll_on_start: self.poll_on_start.or(defaults.poll_on_start),
            line_budget: self.line_budget.or(defaults.line_budget),
            scrape: self.scrape.clone().or_else(|| defaults.scrape.clone()),
        }
    }
}

// ============================================================================
// Validated Feed Configuration
// ============================================================================

pub const DEFAULT_MAX_ITEMS: usize = 5;

/// Everything one feed needs, validated and compiled.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    pub interval: Duration,
    /// Cap on individual announcements per update; the rest get one summary line.
    pub max_items: usize,
    /// Directory holding the feed's state file (named after the feed).
    pub state_dir: PathBuf,
    pub destinations: DestinationFilter,
    pub format: MessageFormat,
    pub mode: ExtractionMode,
    /// Poll on the first tick instead of waiting a full interval.
    pub poll_on_start: bool,
}

impl FeedConfig {
    /// A structured feed with default settings.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval: Duration::ZERO,
            max_items: DEFAULT_MAX_ITEMS,
            state_dir: PathBuf::from("."),
            destinations: DestinationFilter::default(),
            format: MessageFormat::default(),
            mode: ExtractionMode::Structured,
            poll_on_start: false,
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(&self.name)
    }

    /// Validates a merged section.
    pub fn from_section(name: &str, section: &FeedSection) -> Result<Self, ConfigError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\'])
            || name.chars().any(char::is_control)
        {
            return Err(ConfigError::InvalidName(name.to_owned()));
        }
        let feed = || name.to_owned();

        let url = section
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ConfigError::MissingUrl { feed: feed() })?;
        validate_source(url).map_err(|source| ConfigError::Source {
            feed: feed(),
            source,
        })?;

        let interval = section.interval.unwrap_or(0);
        if interval < 0 {
            return Err(ConfigError::NegativeInterval {
                feed: feed(),
                value: interval,
            });
        }

        let rewrite = |spec: &Option<RewriteSpec>, field: &'static str| {
            spec.as_ref()
                .map(|s| RewriteRule::new(&s.pattern, &s.template))
                .transpose()
                .map_err(|source| ConfigError::Rewrite {
                    feed: feed(),
                    field,
                    source,
                })
        };
        let format = MessageFormat {
            title_rewrite: rewrite(&section.title_rewrite, "title_rewrite")?,
            link_rewrite: rewrite(&section.link_rewrite, "link_rewrite")?,
            line_budget: section.line_budget.unwrap_or(DEFAULT_LINE_BUDGET),
        };

        let mode = match &section.scrape {
            None => ExtractionMode::Structured,
            Some(spec) => ExtractionMode::Scraped(ScrapeRules::compile(spec).map_err(
                |source| ConfigError::Scrape {
                    feed: feed(),
                    source,
                },
            )?),
        };

        let list = |l: &Option<Vec<String>>| -> BTreeSet<String> { l.iter().flatten().cloned().collect() };

        Ok(Self {
            name: name.to_owned(),
            url: url.to_owned(),
            interval: Duration::from_secs(interval.unsigned_abs()),
            max_items: section.max_items.unwrap_or(DEFAULT_MAX_ITEMS),
            state_dir: section
                .state_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            destinations: DestinationFilter {
                allow: list(&section.allow),
                deny: list(&section.deny),
            },
            format,
            mode,
            poll_on_start: section.poll_on_start.unwrap_or(false),
        })
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Err(ConfigError::NotFound)`, there is nothing to poll
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file can't exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len().max(1),
            tick_seconds = config.tick_seconds,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses TOML text and checks global settings.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(content)?;
        if config.tick_seconds == 0 {
            return Err(ConfigError::InvalidTick);
        }
        Ok(config)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    /// Merges every feed over `[defaults]` and validates the result.
    ///
    /// Without any `[[feeds]]`, `[defaults]` itself is a feed named `default`.
    pub fn feed_configs(&self) -> Result<Vec<FeedConfig>, ConfigError> {
        if self.feeds.is_empty() {
            return Ok(vec![FeedConfig::from_section("default", &self.defaults)?]);
        }

        let mut seen = HashSet::new();
        self.feeds
            .iter()
            .enumerate()
            .map(|(index, section)| {
                let name = section
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or(ConfigError::MissingName { index })?;
                if !seen.insert(name.to_owned()) {
                    return Err(ConfigError::DuplicateName(name.to_owned()));
                }
                FeedConfig::from_section(name, &section.merged_over(&self.defaults))
            })
            .collect()
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for key in raw.keys() {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
        }
    }

    let sections = raw
        .get("defaults")
        .and_then(toml::Value::as_table)
        .into_iter()
        .chain(
            raw.get("feeds")
                .and_then(toml::Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(toml::Value::as_table),
        );
    for section in sections {
        for key in section.keys() {
            if !FEED_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "Unknown feed key in config file, ignoring");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
