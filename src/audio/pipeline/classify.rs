//! Decides whether a locator needs the resolver in front of the transcoder.
//!
//! Pure function of the string: page URLs of known streaming services and
//! anything that is not a well-formed absolute URL (a search query) need
//! resolution; everything else is handed to the transcoder directly.

use regex::RegexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    /// resolver → transcoder
    Resolve,
    /// transcoder only
    Direct,
}

pub struct LocatorClassifier {
    patterns: RegexSet,
}

impl LocatorClassifier {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            patterns: RegexSet::new(patterns)?,
        })
    }

    pub fn classify(&self, locator: &str) -> LocatorKind {
        let locator = locator.trim();
        if self.patterns.is_match(locator) {
            return LocatorKind::Resolve;
        }
        if is_well_formed_url(locator) {
            LocatorKind::Direct
        } else {
            LocatorKind::Resolve
        }
    }
}

/// Absolute URL with a host, or a `file:` URL.
fn is_well_formed_url(locator: &str) -> bool {
    match url::Url::parse(locator) {
        Ok(url) => url.has_host() || url.scheme() == "file",
        Err(_) => false,
    }
}

/// Whether the locator is fetched over HTTP, where reconnect options apply.
pub fn is_http(locator: &str) -> bool {
    url::Url::parse(locator.trim())
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}
