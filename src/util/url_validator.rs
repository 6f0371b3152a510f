use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Errors that can occur while classifying a feed source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source string was empty or whitespace.
    #[error("Empty feed source")]
    Empty,
    /// The source looked like a URL but could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http, https or file.
    #[error("Unsupported scheme: {0} (only http/https/file allowed)")]
    UnsupportedScheme(String),
    /// A `file://` URL that does not map to a local path.
    #[error("Not a local file path: {0}")]
    NotAPath(String),
}

/// Where a feed is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Remote document fetched over HTTP(S).
    Http(Url),
    /// Local document; its modification time stands in for `Last-Modified`.
    File(PathBuf),
}

/// Classifies a configured feed source.
///
/// Strings without a `:` are plain filesystem paths. Everything else must be
/// an `http`, `https` or `file` URL.
///
/// # Examples
///
/// ```
/// use feedwatch::util::{validate_source, Source};
///
/// assert!(matches!(validate_source("https://example.com/feed.xml"), Ok(Source::Http(_))));
/// assert!(matches!(validate_source("feeds/local.xml"), Ok(Source::File(_))));
/// assert!(validate_source("ftp://example.com/feed").is_err());
/// ```
pub fn validate_source(source: &str) -> Result<Source, SourceError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(SourceError::Empty);
    }

    if !source.contains(':') {
        return Ok(Source::File(PathBuf::from(source)));
    }

    let url = Url::parse(source)?;
    match url.scheme() {
        "http" | "https" => Ok(Source::Http(url)),
        "file" => url
            .to_file_path()
            .map(Source::File)
            .map_err(|()| SourceError::NotAPath(source.to_owned())),
        scheme => Err(SourceError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Validates a redirect target against the page it came from.
///
/// Relative `Location` values are resolved against `base`. Only http(s)
/// targets are accepted; a server cannot bounce a feed onto the local disk.
pub fn resolve_redirect(base: &Url, location: &str) -> Result<Url, SourceError> {
    let url = base.join(location)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SourceError::UnsupportedScheme(scheme.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_sources() {
        assert!(matches!(
            validate_source("https://example.com/feed.xml"),
            Ok(Source::Http(_))
        ));
        assert!(matches!(
            validate_source("http://127.0.0.1:8080/rss"),
            Ok(Source::Http(_))
        ));
    }

    #[test]
    fn test_plain_path_is_file() {
        assert_eq!(
            validate_source("state/feed.xml").unwrap(),
            Source::File(PathBuf::from("state/feed.xml"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_url_is_file() {
        assert_eq!(
            validate_source("file:///var/feeds/a.xml").unwrap(),
            Source::File(PathBuf::from("/var/feeds/a.xml"))
        );
    }

    #[test]
    fn test_unsupported_schemes_rejected() {
        assert!(matches!(
            validate_source("ftp://example.com"),
            Err(SourceError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            validate_source("javascript:alert(1)"),
            Err(SourceError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_empty_source_rejected() {
        assert!(matches!(validate_source("   "), Err(SourceError::Empty)));
    }

    #[test]
    fn test_relative_redirect_resolved() {
        let base = Url::parse("https://example.com/old/feed").unwrap();
        let url = resolve_redirect(&base, "/new/feed").unwrap();
        assert_eq!(url.as_str(), "https://example.com/new/feed");
    }

    #[test]
    fn test_redirect_to_file_rejected() {
        let base = Url::parse("https://example.com/feed").unwrap();
        assert!(resolve_redirect(&base, "file:///etc/passwd").is_err());
    }
}
