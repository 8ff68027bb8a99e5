//! Page context: the immutable snapshot one orchestration run works on.
//!
//! The crawler (an external collaborator) builds a [`PageContext`] per fetched URL.
//! Metadata the crawler does not supply is extracted from the body and headers.

pub mod headers;
pub mod html;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalize::{normalize, resolve, NormalizedUrl};

pub use headers::{parse_link_header, Headers, LinkHeaderEntry};

/// Identifier of an audited project (one site crawl configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Robots directives from `<meta name="robots">` and the `X-Robots-Tag` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsDirectives {
    pub noindex: bool,
    pub nofollow: bool,
}

impl RobotsDirectives {
    /// Parses a comma separated directive list (`"noindex, nofollow"`, `"none"`).
    pub fn parse(content: &str) -> Self {
        let mut directives = Self::default();
        directives.merge(content);
        directives
    }

    /// Adds the directives of another list to this one.
    pub fn merge(&mut self, content: &str) {
        for token in content.split(',').map(|t| t.trim().to_ascii_lowercase()) {
            // X-Robots-Tag may be prefixed with a user agent: "googlebot: noindex"
            let token = token.rsplit(':').next().unwrap_or_default().trim();
            match token {
                "noindex" => self.noindex = true,
                "nofollow" => self.nofollow = true,
                "none" => {
                    self.noindex = true;
                    self.nofollow = true;
                }
                _ => {}
            }
        }
    }
}

/// A `<meta http-equiv="refresh">` instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRefresh {
    pub delay_secs: u32,
    /// Raw target (may be relative); `None` for a plain reload
    pub target: Option<String>,
}

impl MetaRefresh {
    /// Parses a refresh `content` attribute such as `0; url='/next'`.
    ///
    /// Returns `None` when the delay is not a number.
    pub fn parse(content: &str) -> Option<Self> {
        let mut parts = content.splitn(2, [';', ',']);
        let delay = parts.next()?.trim();
        // Fractional delays ("0.5") are truncated
        let delay_secs = delay
            .split('.')
            .next()
            .and_then(|d| d.trim().parse::<u32>().ok())?;
        let target = parts.next().and_then(|rest| {
            let rest = rest.trim();
            let value = match rest.split_once('=') {
                Some((key, value)) if key.trim().eq_ignore_ascii_case("url") => value,
                Some(_) => return None,
                None => rest,
            };
            let value = value.trim().trim_matches(|c| c == '\'' || c == '"').trim();
            (!value.is_empty()).then(|| value.to_string())
        });
        Some(Self { delay_secs, target })
    }
}

/// Metadata record of a crawled page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub project: ProjectId,
    /// Raw `<link rel="canonical">` href
    pub canonical_html: Option<String>,
    /// Raw `Link: <...>; rel="canonical"` target
    pub canonical_header: Option<String>,
    pub robots: RobotsDirectives,
    pub meta_refresh: Option<MetaRefresh>,
    /// Set by the fetcher when it gave up on a redirect loop
    pub redirect_loop: bool,
}

impl PageMetadata {
    /// Empty metadata for a project.
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            canonical_html: None,
            canonical_header: None,
            robots: RobotsDirectives::default(),
            meta_refresh: None,
            redirect_loop: false,
        }
    }

    /// Extracts metadata from the response headers and (optional) HTML body.
    pub fn extract(project: ProjectId, headers: &Headers, body: Option<&str>) -> Self {
        let mut metadata = Self::new(project);

        if let Some(link) = headers.get("link") {
            metadata.canonical_header = parse_link_header(link)
                .into_iter()
                .find(|entry| entry.rel.iter().any(|r| r == "canonical"))
                .map(|entry| entry.target);
        }
        if let Some(tag) = headers.get("x-robots-tag") {
            metadata.robots.merge(tag);
        }

        if let Some(body) = body {
            metadata.canonical_html = html::extract_canonical(body);
            let meta_robots = html::extract_meta_robots(body);
            metadata.robots.noindex |= meta_robots.noindex;
            metadata.robots.nofollow |= meta_robots.nofollow;
            metadata.meta_refresh = html::extract_meta_refresh(body);
        }
        metadata
    }
}

/// Immutable snapshot of one crawled URL.
///
/// Owned by a single orchestration run and never mutated after [`PageContextBuilder::build`].
#[derive(Debug, Clone)]
pub struct PageContext {
    url: String,
    normalized: NormalizedUrl,
    status: u16,
    content_type: Option<String>,
    depth: u32,
    headers: Headers,
    html: Option<String>,
    metadata: PageMetadata,
    internal: bool,
    url_id: Option<i64>,
}

impl PageContext {
    /// Starts building a page context.
    pub fn builder(project: ProjectId, url: impl Into<String>, status: u16) -> PageContextBuilder {
        PageContextBuilder {
            project,
            url: url.into(),
            status,
            content_type: None,
            depth: 0,
            headers: Headers::new(),
            html: None,
            metadata: None,
            redirect_loop: false,
            internal: true,
            url_id: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn normalized(&self) -> &NormalizedUrl {
        &self.normalized
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    pub fn metadata(&self) -> &PageMetadata {
        &self.metadata
    }

    pub fn project(&self) -> ProjectId {
        self.metadata.project
    }

    /// Whether the URL belongs to the audited site.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Host-assigned id of the URL, passed through to the report store.
    pub fn url_id(&self) -> Option<i64> {
        self.url_id
    }

    /// `text/html` or `application/xhtml+xml` with a body.
    pub fn is_html(&self) -> bool {
        let html_type = self
            .content_type
            .as_deref()
            .map(|ct| {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            })
            .unwrap_or(false);
        html_type && self.html.is_some()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the status is one that redirects. 300 and 304 do not.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// The `Location` header resolved against the page URL.
    pub fn location(&self) -> Option<String> {
        self.headers
            .get("location")
            .and_then(|loc| resolve(&self.url, loc))
    }

    /// Resolves an attribute value found on this page.
    pub fn resolve(&self, href: &str) -> Option<String> {
        resolve(&self.url, href)
    }
}

/// Builder for [`PageContext`].
#[derive(Debug, Clone)]
pub struct PageContextBuilder {
    project: ProjectId,
    url: String,
    status: u16,
    content_type: Option<String>,
    depth: u32,
    headers: Headers,
    html: Option<String>,
    metadata: Option<PageMetadata>,
    redirect_loop: bool,
    internal: bool,
    url_id: Option<i64>,
}

impl PageContextBuilder {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Supplies metadata directly instead of extracting it from the body.
    pub fn metadata(mut self, metadata: PageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn redirect_loop(mut self, flag: bool) -> Self {
        self.redirect_loop = flag;
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn url_id(mut self, id: i64) -> Self {
        self.url_id = Some(id);
        self
    }

    pub fn build(self) -> PageContext {
        let mut metadata = self.metadata.unwrap_or_else(|| {
            PageMetadata::extract(self.project, &self.headers, self.html.as_deref())
        });
        metadata.project = self.project;
        metadata.redirect_loop |= self.redirect_loop;

        PageContext {
            normalized: normalize(&self.url),
            url: self.url,
            status: self.status,
            content_type: self.content_type,
            depth: self.depth,
            headers: self.headers,
            html: self.html,
            metadata,
            internal: self.internal,
            url_id: self.url_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_robots_directives_parse() {
        let robots = RobotsDirectives::parse("NoIndex, follow");
        assert!(robots.noindex);
        assert!(!robots.nofollow);

        let none = RobotsDirectives::parse("none");
        assert!(none.noindex && none.nofollow);

        let agent = RobotsDirectives::parse("googlebot: nofollow");
        assert!(agent.nofollow);
        assert!(!agent.noindex);
    }

    #[test]
    fn test_meta_refresh_parse() {
        assert_eq!(
            MetaRefresh::parse("5; url=https://example.com/next"),
            Some(MetaRefresh {
                delay_secs: 5,
                target: Some("https://example.com/next".into())
            })
        );
        assert_eq!(
            MetaRefresh::parse("0;URL=\"/x\""),
            Some(MetaRefresh {
                delay_secs: 0,
                target: Some("/x".into())
            })
        );
        assert_eq!(
            MetaRefresh::parse("30"),
            Some(MetaRefresh {
                delay_secs: 30,
                target: None
            })
        );
        assert_eq!(MetaRefresh::parse("soon; url=/x"), None);
    }

    #[test]
    fn test_builder_extracts_metadata() {
        let page = PageContext::builder(ProjectId(1), "https://example.com/a/", 200)
            .content_type("text/html; charset=utf-8")
            .header("X-Robots-Tag", "nofollow")
            .header("Link", "<https://example.com/a>; rel=\"canonical\"")
            .html(r#"<html><head><link rel="canonical" href="/a"><meta name="robots" content="noindex"></head></html>"#)
            .build();

        assert_eq!(page.normalized().as_str(), "https://example.com/a");
        assert!(page.is_html());
        assert!(page.is_success());
        assert_eq!(page.metadata().canonical_html.as_deref(), Some("/a"));
        assert_eq!(
            page.metadata().canonical_header.as_deref(),
            Some("https://example.com/a")
        );
        assert!(page.metadata().robots.noindex);
        assert!(page.metadata().robots.nofollow);
        assert_eq!(page.project(), ProjectId(1));
    }

    #[test]
    fn test_builder_supplied_metadata_wins() {
        let mut metadata = PageMetadata::new(ProjectId(99));
        metadata.canonical_html = Some("https://example.com/other".into());
        let page = PageContext::builder(ProjectId(2), "https://example.com/a", 200)
            .content_type("text/html")
            .html(r#"<link rel="canonical" href="/ignored">"#)
            .metadata(metadata)
            .redirect_loop(true)
            .build();

        assert_eq!(
            page.metadata().canonical_html.as_deref(),
            Some("https://example.com/other")
        );
        // project always comes from the builder
        assert_eq!(page.project(), ProjectId(2));
        assert!(page.metadata().redirect_loop);
    }

    #[test]
    fn test_location_resolved_against_page() {
        let page = PageContext::builder(ProjectId(1), "https://example.com/dir/a", 301)
            .header("Location", "../b")
            .build();
        assert!(page.is_redirect());
        assert_eq!(page.location().as_deref(), Some("https://example.com/b"));
        assert!(!page.is_html());
    }

    #[test]
    fn test_only_redirect_statuses_redirect() {
        for status in [301, 302, 303, 307, 308] {
            assert!(PageContext::builder(ProjectId(1), "https://example.com/", status)
                .build()
                .is_redirect());
        }
        for status in [200, 300, 304, 305, 404] {
            assert!(!PageContext::builder(ProjectId(1), "https://example.com/", status)
                .build()
                .is_redirect());
        }
    }
}
