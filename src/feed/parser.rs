use crate::feed::item::Item;
use chrono::SecondsFormat;
use feed_rs::parser;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid feed document: {0}")]
pub struct ParseError(#[from] parser::ParseFeedError);

/// Parses RSS, Atom or JSON Feed bytes into items, newest first as the source lists them.
///
/// Published time falls back to the entry's `updated` stamp. It is rendered
/// as RFC 3339 for identity so the derived identifier is the same on every run.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Item>, ParseError> {
    // Entries without an id keep a blank one; the fallback identity is derived
    // from link or title plus published time by `Item::identifier`.
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let stamp = entry.published.or(entry.updated);
            let link = entry.links.first().map(|l| l.href.clone());
            let title = entry.title.map(|t| t.content);

            let guid = Some(entry.id).filter(|id| !id.trim().is_empty());

            Item {
                guid,
                title,
                link,
                published: stamp.map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
                published_at: stamp.map(|dt| dt.timestamp() as f64),
            }
        })
        .collect();

    Ok(items)
}
