/// One entry extracted from a feed or a scraped page.
///
/// Every field is optional; sources routinely omit guids, links or dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    /// Explicit identifier supplied by the source.
    pub guid: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    /// Published time exactly as used for identity.
    pub published: Option<String>,
    /// Published time as seconds since the Unix epoch, when it could be parsed.
    pub published_at: Option<f64>,
}

impl Item {
    /// Stable identifier used for deduplication.
    ///
    /// Preference order: explicit guid, then link, then title; a published
    /// text is appended as `#published` to the derived forms. Newlines are
    /// folded to spaces and the result is trimmed, so it fits on one line of
    /// the state file.
    pub fn identifier(&self) -> String {
        if let Some(guid) = non_blank(self.guid.as_deref()) {
            return one_line(guid);
        }

        let mut id = non_blank(self.link.as_deref())
            .or_else(|| non_blank(self.title.as_deref()))
            .unwrap_or_default()
            .to_owned();
        if let Some(published) = non_blank(self.published.as_deref()) {
            id.push('#');
            id.push_str(published);
        }
        one_line(&id)
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

fn one_line(s: &str) -> String {
    s.trim().replace(['\r', '\n'], " ")
}

/// Normalized result of one successful fetch.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// Items in source order (newest first).
    pub items: Vec<Item>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Permanent redirect target reported while fetching, if any.
    pub redirect: Option<String>,
    pub status: u16,
}
