//! Declarative extraction rules for pages that have no real feed.
//!
//! Rules are CSS selectors compiled once at configuration time and evaluated
//! by [`extract`] against the fetched markup. There is no expression language:
//! a rule can only pick elements and read their text or one attribute.

use crate::feed::item::Item;
use chrono::{DateTime, NaiveDate};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
    #[error("scrape rules need a title and/or link field")]
    NoFields,
}

/// Scrape rules as written in the configuration file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScrapeSpec {
    /// Selector matching one element per entry.
    pub entries: String,
    pub title: Option<FieldSpec>,
    pub link: Option<FieldSpec>,
    pub published: Option<FieldSpec>,
}

/// A field locator: either a bare selector (text of the first match) or a
/// table with an optional selector and attribute.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldSpec {
    Select(String),
    Detailed {
        select: Option<String>,
        attr: Option<String>,
    },
}

/// Which elements a selector picks within its scope.
#[derive(Debug, Clone)]
pub enum Locator {
    First(Selector),
    All(Selector),
}

impl Locator {
    fn matches<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match self {
            Locator::First(selector) => scope.select(selector).take(1).collect(),
            Locator::All(selector) => scope.select(selector).collect(),
        }
    }
}

/// What to read from a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    Text,
    Attr(String),
}

#[derive(Debug, Clone)]
pub struct Field {
    /// `None` reads from the entry element itself.
    locator: Option<Locator>,
    extract: Extract,
}

impl Field {
    fn compile(spec: &FieldSpec) -> Result<Self, ScrapeError> {
        let (select, attr) = match spec {
            FieldSpec::Select(select) => (Some(select.as_str()), None),
            FieldSpec::Detailed { select, attr } => (select.as_deref(), attr.as_deref()),
        };
        Ok(Self {
            locator: select.map(compile_selector).transpose()?.map(Locator::First),
            extract: attr.map_or(Extract::Text, |a| Extract::Attr(a.to_owned())),
        })
    }

    fn read(&self, entry: ElementRef<'_>) -> Option<String> {
        let element = match &self.locator {
            Some(locator) => locator.matches(entry).into_iter().next()?,
            None => entry,
        };
        let value = match &self.extract {
            Extract::Text => element.text().collect::<String>(),
            Extract::Attr(name) => element.value().attr(name)?.to_owned(),
        };
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        (!value.is_empty()).then_some(value)
    }
}

/// Compiled scrape rules.
#[derive(Debug, Clone)]
pub struct ScrapeRules {
    entries: Locator,
    title: Option<Field>,
    link: Option<Field>,
    published: Option<Field>,
}

impl ScrapeRules {
    pub fn compile(spec: &ScrapeSpec) -> Result<Self, ScrapeError> {
        if spec.title.is_none() && spec.link.is_none() {
            return Err(ScrapeError::NoFields);
        }
        let field = |f: &Option<FieldSpec>| f.as_ref().map(Field::compile).transpose();
        Ok(Self {
            entries: Locator::All(compile_selector(&spec.entries)?),
            title: field(&spec.title)?,
            link: field(&spec.link)?,
            published: field(&spec.published)?,
        })
    }
}

fn compile_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::Selector {
        selector: selector.to_owned(),
        reason: e.to_string(),
    })
}

/// Evaluates `rules` against an HTML page.
///
/// Links are resolved against `base` when given. Entries that yield neither a
/// title nor a link are dropped. Items come back in document order.
pub fn extract(html: &str, base: Option<&Url>, rules: &ScrapeRules) -> Vec<Item> {
    let document = Html::parse_document(html);

    rules
        .entries
        .matches(document.root_element())
        .into_iter()
        .filter_map(|entry| {
            let title = rules.title.as_ref().and_then(|f| f.read(entry));
            let link = rules
                .link
                .as_ref()
                .and_then(|f| f.read(entry))
                .map(|href| resolve(base, &href));
            if title.is_none() && link.is_none() {
                return None;
            }
            let published = rules.published.as_ref().and_then(|f| f.read(entry));
            let published_at = published.as_deref().and_then(parse_timestamp);
            Some(Item {
                guid: None,
                title,
                link,
                published,
                published_at,
            })
        })
        .collect()
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map_or_else(|| href.to_owned(), |u| u.to_string())
}

/// Parses the date formats pages commonly carry in `<time>` elements.
pub fn parse_timestamp(text: &str) -> Option<f64> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .map(|dt| dt.timestamp() as f64)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp() as f64)
        })
}
