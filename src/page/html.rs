//! HTML extraction.
//!
//! Every function parses the body, pulls out owned values and drops the document
//! before returning. `scraper::Html` is not `Send`, so it must never live across an
//! `.await` inside a task.

use scraper::{Html, Selector};

use super::{MetaRefresh, RobotsDirectives};

/// An `<a href>` found in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Raw attribute value
    pub href: String,
    /// Whether `rel` contains `nofollow`
    pub nofollow: bool,
}

/// A `<link rel="alternate" hreflang>` declaration as written in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HreflangTag {
    /// Language tag as written
    pub language: String,
    /// Raw href (may be relative)
    pub href: String,
}

/// One `<script type="application/ld+json">` block.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonLdBlock {
    /// Parsed JSON value
    Parsed(serde_json::Value),
    /// The block did not parse; carries the parser message
    Malformed(String),
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            log::error!("Invalid built-in selector '{}': {:?}", css, e);
            None
        }
    }
}

/// Returns the raw href of the first `<link rel="canonical">`.
pub fn extract_canonical(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = selector("link[rel][href]")?;
    let canonical = document
        .select(&sel)
        .find(|el| {
            el.value()
                .attr("rel")
                .map(|rel| {
                    rel.split_whitespace()
                        .any(|r| r.eq_ignore_ascii_case("canonical"))
                })
                .unwrap_or(false)
        })
        .and_then(|el| el.value().attr("href"))
        .map(|href| href.trim().to_string());
    canonical
}

/// Collects robots directives from `<meta name="robots">` and `<meta name="googlebot">`.
pub fn extract_meta_robots(html: &str) -> RobotsDirectives {
    let document = Html::parse_document(html);
    let mut directives = RobotsDirectives::default();
    let Some(sel) = selector("meta[name][content]") else {
        return directives;
    };
    for el in document.select(&sel) {
        let name = el.value().attr("name").unwrap_or_default();
        if name.eq_ignore_ascii_case("robots") || name.eq_ignore_ascii_case("googlebot") {
            directives.merge(el.value().attr("content").unwrap_or_default());
        }
    }
    directives
}

/// Parses `<meta http-equiv="refresh" content="5; url=/next">`.
pub fn extract_meta_refresh(html: &str) -> Option<MetaRefresh> {
    let document = Html::parse_document(html);
    let sel = selector("meta[http-equiv][content]")?;
    let refresh = document
        .select(&sel)
        .find(|el| {
            el.value()
                .attr("http-equiv")
                .map(|v| v.eq_ignore_ascii_case("refresh"))
                .unwrap_or(false)
        })
        .and_then(|el| el.value().attr("content"))
        .and_then(MetaRefresh::parse);
    refresh
}

/// Collects every `<link rel="alternate" hreflang="..." href="...">`.
pub fn extract_hreflang(html: &str) -> Vec<HreflangTag> {
    let document = Html::parse_document(html);
    let Some(sel) = selector("link[hreflang][href]") else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter(|el| {
            el.value()
                .attr("rel")
                .map(|rel| {
                    rel.split_whitespace()
                        .any(|r| r.eq_ignore_ascii_case("alternate"))
                })
                .unwrap_or(false)
        })
        .filter_map(|el| {
            Some(HreflangTag {
                language: el.value().attr("hreflang")?.trim().to_string(),
                href: el.value().attr("href")?.trim().to_string(),
            })
        })
        .collect()
}

/// Collects every `<a href>` in document order.
pub fn extract_anchors(html: &str) -> Vec<Anchor> {
    let document = Html::parse_document(html);
    let Some(sel) = selector("a[href]") else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            if href.is_empty() || href.starts_with('#') {
                return None;
            }
            let nofollow = el
                .value()
                .attr("rel")
                .map(|rel| {
                    rel.split_whitespace()
                        .any(|r| r.eq_ignore_ascii_case("nofollow"))
                })
                .unwrap_or(false);
            Some(Anchor {
                href: href.to_string(),
                nofollow,
            })
        })
        .collect()
}

/// Collects JSON-LD blocks. A block holding a top-level array is returned as one
/// parsed array value.
pub fn extract_json_ld(html: &str) -> Vec<JsonLdBlock> {
    let document = Html::parse_document(html);
    let Some(sel) = selector("script[type]") else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter(|el| {
            el.value()
                .attr("type")
                .map(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
                .unwrap_or(false)
        })
        .map(|el| {
            let text: String = el.text().collect();
            match serde_json::from_str::<serde_json::Value>(text.trim()) {
                Ok(value) => JsonLdBlock::Parsed(value),
                Err(e) => JsonLdBlock::Malformed(e.to_string()),
            }
        })
        .collect()
}
