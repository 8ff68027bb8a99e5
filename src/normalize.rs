//! URL normalization.
//!
//! Every graph insert and every graph lookup goes through [`normalize`], so two
//! spellings of the same address always meet on the same key.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::MAX_URL_LENGTH;

/// Comparison key for a URL.
///
/// Only [`normalize`] and [`normalize_with`] construct this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether the query string takes part in case folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryCase {
    /// Keep the query exactly as parsed
    #[default]
    Preserve,
    /// Lowercase the query as well
    Fold,
}

/// Normalizes a URL into its comparison key, preserving query casing.
///
/// See [`normalize_with`].
pub fn normalize(url: &str) -> NormalizedUrl {
    normalize_with(url, QueryCase::Preserve)
}

/// Normalizes a URL into its comparison key.
///
/// For absolute http(s)-style URLs with a host:
/// - scheme and host are lowercased, default ports dropped (done by `url`)
/// - user info and fragment are dropped
/// - trailing slashes are removed; the root path becomes empty
/// - an empty query (`?`) is dropped, the rest is kept (or folded, see [`QueryCase`])
///
/// Anything that does not parse, or parses without a host, falls back to a best-effort
/// string form: trimmed, fragment dropped, trailing slashes removed, lowercased. This
/// function never fails.
pub fn normalize_with(url: &str, query: QueryCase) -> NormalizedUrl {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(parsed) if parsed.host_str().is_some() => {
            NormalizedUrl(normalize_parsed(&parsed, query))
        }
        _ => NormalizedUrl(fallback(trimmed)),
    }
}

fn normalize_parsed(parsed: &Url, query: QueryCase) -> String {
    let mut out = String::with_capacity(parsed.as_str().len());
    out.push_str(parsed.scheme());
    out.push_str("://");
    // host_str() is Some: checked by the caller. Opaque hosts of non-special
    // schemes are not lowercased by `url`, so fold them here.
    out.push_str(&parsed.host_str().unwrap_or_default().to_lowercase());
    if let Some(port) = parsed.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(parsed.path().trim_end_matches('/'));
    if let Some(q) = parsed.query().filter(|q| !q.is_empty()) {
        out.push('?');
        match query {
            QueryCase::Preserve => out.push_str(q),
            QueryCase::Fold => out.push_str(&q.to_lowercase()),
        }
    }
    out
}

fn fallback(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or_default();
    without_fragment
        .trim_end_matches(|c: char| c == '/' || c.is_whitespace())
        .trim_start()
        .to_lowercase()
}

/// Resolves an attribute value (href, canonical, hreflang target) against the page URL.
///
/// Returns `None` for empty values, values longer than [`MAX_URL_LENGTH`], values that
/// do not resolve, and non-http(s) targets (`mailto:`, `javascript:`, `tel:` ...).
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.len() > MAX_URL_LENGTH {
        return None;
    }
    let resolved = match Url::parse(href) {
        Ok(absolute) => absolute,
        Err(_) => Url::parse(base).ok()?.join(href).ok()?,
    };
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Returns the host of a URL, lowercased and without a leading `www.`.
pub fn site_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Whether two URLs belong to the same site (host equality ignoring `www.`).
pub fn same_site(a: &str, b: &str) -> bool {
    match (site_host(a), site_host(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_scheme_and_host() {
        assert_eq!(
            normalize("HTTPS://Example.COM/Path").as_str(),
            "https://example.com/Path"
        );
    }

    #[test]
    fn test_normalize_removes_trailing_slash() {
        assert_eq!(normalize("https://example.com/a/").as_str(), "https://example.com/a");
        assert_eq!(normalize("https://example.com/").as_str(), "https://example.com");
        assert_eq!(normalize("https://example.com").as_str(), "https://example.com");
    }

    #[test]
    fn test_normalize_drops_fragment_default_port_and_userinfo() {
        assert_eq!(
            normalize("https://user:pw@example.com:443/a#top").as_str(),
            "https://example.com/a"
        );
        assert_eq!(
            normalize("http://example.com:8080/a").as_str(),
            "http://example.com:8080/a"
        );
    }

    #[test]
    fn test_normalize_query_case() {
        let url = "https://example.com/search?Q=Rust";
        assert_eq!(normalize(url).as_str(), "https://example.com/search?Q=Rust");
        assert_eq!(
            normalize_with(url, QueryCase::Fold).as_str(),
            "https://example.com/search?q=rust"
        );
        assert_eq!(
            normalize("https://example.com/search?").as_str(),
            "https://example.com/search"
        );
    }

    #[test]
    fn test_normalize_keeps_path_case() {
        assert_ne!(normalize("https://example.com/A"), normalize("https://example.com/a"));
    }

    #[test]
    fn test_normalize_malformed_falls_back() {
        assert_eq!(normalize("  /Relative/Path/ ").as_str(), "/relative/path");
        assert_eq!(normalize("not a url#frag").as_str(), "not a url");
        assert_eq!(normalize("").as_str(), "");
        assert_eq!(normalize("mailto:Someone@Example.com").as_str(), "mailto:someone@example.com");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = "https://example.com/dir/page";
        assert_eq!(
            resolve(base, "other").as_deref(),
            Some("https://example.com/dir/other")
        );
        assert_eq!(
            resolve(base, "/root").as_deref(),
            Some("https://example.com/root")
        );
        assert_eq!(
            resolve(base, "https://other.org/x").as_deref(),
            Some("https://other.org/x")
        );
    }

    #[test]
    fn test_resolve_rejects_non_http_and_empty() {
        let base = "https://example.com/";
        assert_eq!(resolve(base, "mailto:a@b.c"), None);
        assert_eq!(resolve(base, "javascript:void(0)"), None);
        assert_eq!(resolve(base, "   "), None);
        assert_eq!(resolve(base, &"a".repeat(MAX_URL_LENGTH + 1)), None);
        assert_eq!(resolve("not a base", "relative"), None);
    }

    #[test]
    fn test_same_site_ignores_www() {
        assert!(same_site("https://www.example.com/a", "http://example.com/b"));
        assert!(!same_site("https://example.com", "https://example.org"));
        assert!(!same_site("not a url", "https://example.com"));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_normalize_idempotent_for_urls(
            scheme in "(http|https|HTTP|Https)",
            host in "[a-zA-Z]{1,12}\\.[a-z]{2,5}",
            segments in prop::collection::vec("[a-zA-Z0-9_.~-]{0,8}", 0..5),
            trailing in any::<bool>(),
            query in prop::option::of("[a-zA-Z0-9=&]{0,12}"),
        ) {
            let mut url = format!("{}://{}/{}", scheme, host, segments.join("/"));
            if trailing {
                url.push('/');
            }
            if let Some(q) = query {
                url.push('?');
                url.push_str(&q);
            }
            let once = normalize(&url);
            let twice = normalize(once.as_str());
            prop_assert_eq!(&once, &twice, "Normalizing twice should produce same result");
            let folded = normalize_with(&url, QueryCase::Fold);
            prop_assert_eq!(&folded, &normalize_with(folded.as_str(), QueryCase::Fold));
        }

        #[test]
        fn test_normalize_idempotent_for_arbitrary_strings(input in "\\PC{0,40}") {
            let once = normalize(&input);
            prop_assert_eq!(&once, &normalize(once.as_str()));
        }
    }
}
