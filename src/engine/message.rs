use crate::feed::Item;
use crate::util::{display_width, sanitize_line, truncate_to_width};
use regex::Regex;

/// Maximum rendered width of one announcement line.
pub const DEFAULT_LINE_BUDGET: usize = 390;

/// A regex rewrite applied to titles or links before they are announced.
///
/// Only the first match is replaced; the template uses `$1` / `${name}` syntax.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    template: String,
}

impl RewriteRule {
    pub fn new(pattern: &str, template: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            template: template.to_owned(),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace(text, self.template.as_str()).into_owned()
    }
}

/// How a feed renders its items.
#[derive(Debug, Clone)]
pub struct MessageFormat {
    pub title_rewrite: Option<RewriteRule>,
    pub link_rewrite: Option<RewriteRule>,
    pub line_budget: usize,
}

impl Default for MessageFormat {
    fn default() -> Self {
        Self {
            title_rewrite: None,
            link_rewrite: None,
            line_budget: DEFAULT_LINE_BUDGET,
        }
    }
}

/// Renders `title - link`, truncating the title so the whole line fits the budget.
///
/// Returns `None` when the item has neither a title nor a link.
pub fn render(item: &Item, format: &MessageFormat) -> Option<String> {
    let mut title = sanitize_line(item.title.as_deref().unwrap_or_default())
        .trim()
        .to_owned();
    if let Some(rule) = &format.title_rewrite {
        title = rule.apply(&title);
    }

    let mut budget = format.line_budget;
    let mut link_part = String::new();
    if let Some(link) = item.link.as_deref() {
        let mut link = sanitize_line(link).trim().to_owned();
        if let Some(rule) = &format.link_rewrite {
            link = rule.apply(&link);
        }
        if !link.is_empty() {
            link_part = if title.is_empty() {
                link
            } else {
                format!(" - {}", link)
            };
            budget = budget.saturating_sub(display_width(&link_part));
        }
    }

    let message = format!("{}{}", truncate_to_width(&title, budget), link_part);
    (!message.is_empty()).then_some(message)
}

/// Line announcing how many new items were held back by the per-tick cap.
pub fn summary(suppressed: usize) -> Option<String> {
    match suppressed {
        0 => None,
        1 => Some("(and one more item)".to_owned()),
        n => Some(format!("(and {} more items)", n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: Option<&str>, link: Option<&str>) -> Item {
        Item {
            title: title.map(str::to_owned),
            link: link.map(str::to_owned),
            ..Item::default()
        }
    }

    #[test]
    fn test_title_and_link_joined() {
        let msg = render(&item(Some("Hello"), Some("https://x/1")), &MessageFormat::default());
        assert_eq!(msg.as_deref(), Some("Hello - https://x/1"));
    }

    #[test]
    fn test_link_only_has_no_separator() {
        let msg = render(&item(None, Some("https://x/1")), &MessageFormat::default());
        assert_eq!(msg.as_deref(), Some("https://x/1"));
    }

    #[test]
    fn test_empty_item_renders_nothing() {
        assert_eq!(render(&item(None, None), &MessageFormat::default()), None);
        assert_eq!(render(&item(Some("  "), Some("")), &MessageFormat::default()), None);
    }

    #[test]
    fn test_title_truncated_to_leave_room_for_link() {
        let format = MessageFormat {
            line_budget: 20,
            ..MessageFormat::default()
        };
        // link part " - http://l" is 11 wide, leaving 9 for the title
        let msg = render(&item(Some("A very long headline"), Some("http://l")), &format).unwrap();
        assert_eq!(msg, "A very  … - http://l");
        assert_eq!(display_width(&msg), 20);
    }

    #[test]
    fn test_rewrite_rules_applied() {
        let format = MessageFormat {
            title_rewrite: Some(RewriteRule::new(r"^\[(\w+)\] (.*)$", "$2 ($1)").unwrap()),
            link_rewrite: Some(RewriteRule::new(r"^http://", "https://").unwrap()),
            ..MessageFormat::default()
        };
        let msg = render(&item(Some("[rust] Release"), Some("http://x/1")), &format);
        assert_eq!(msg.as_deref(), Some("Release (rust) - https://x/1"));
    }

    #[test]
    fn test_remote_control_chars_removed() {
        let msg = render(&item(Some("Evil\x1b[31m\ntitle"), None), &MessageFormat::default());
        assert_eq!(msg.as_deref(), Some("Evil title"));
    }

    #[test]
    fn test_summary_lines() {
        assert_eq!(summary(0), None);
        assert_eq!(summary(1).as_deref(), Some("(and one more item)"));
        assert_eq!(summary(3).as_deref(), Some("(and 3 more items)"));
    }
}
