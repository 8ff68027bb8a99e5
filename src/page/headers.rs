//! Response header handling.
//!
//! Header names are case-insensitive; `Link` and `X-Robots-Tag` values are parsed
//! into the same shapes the HTML extractors produce.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One `<url>; param=value; ...` entry of a `Link` header.
static LINK_ENTRY: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"<([^>]*)>((?:\s*;\s*[^;,]+)*)"#).ok());

/// `name="value"` / `name=value` parameter inside a `Link` entry.
static LINK_PARAM: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?i)([a-z*-]+)\s*=\s*(?:"([^"]*)"|([^\s;,]+))"#).ok());

/// Response headers keyed by lowercased name.
///
/// Repeated headers are joined with `", "` as HTTP allows for list-valued fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header, joining with an existing value of the same name.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.0
            .entry(name.trim().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value.trim());
            })
            .or_insert_with(|| value.trim().to_string());
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        let mut headers = Headers::new();
        for (name, value) in &map {
            headers.insert(name, value);
        }
        headers
    }
}

impl From<Headers> for BTreeMap<String, String> {
    fn from(headers: Headers) -> Self {
        headers.0
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// A parsed entry of an HTTP `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHeaderEntry {
    /// Target as written (may be relative)
    pub target: String,
    /// Lowercased `rel` tokens
    pub rel: Vec<String>,
    /// `hreflang` parameter, if any
    pub hreflang: Option<String>,
}

/// Parses a `Link` header value into its entries.
///
/// Malformed entries are skipped.
pub fn parse_link_header(value: &str) -> Vec<LinkHeaderEntry> {
    let (Some(entry_re), Some(param_re)) = (LINK_ENTRY.as_ref(), LINK_PARAM.as_ref()) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for cap in entry_re.captures_iter(value) {
        let Some(target) = cap.get(1).map(|m| m.as_str().trim().to_string()) else {
            continue;
        };
        let params = cap.get(2).map(|m| m.as_str()).unwrap_or_default();

        let mut rel = Vec::new();
        let mut hreflang = None;
        for param in param_re.captures_iter(params) {
            let name = param
                .get(1)
                .map(|m| m.as_str().to_ascii_lowercase())
                .unwrap_or_default();
            let value = param
                .get(2)
                .or_else(|| param.get(3))
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            match name.as_str() {
                "rel" => rel.extend(value.split_whitespace().map(|r| r.to_ascii_lowercase())),
                "hreflang" => hreflang = Some(value.to_string()),
                _ => {}
            }
        }
        entries.push(LinkHeaderEntry {
            target,
            rel,
            hreflang,
        });
    }
    entries
}
