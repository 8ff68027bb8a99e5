//! Edge types of the relationship graphs.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

/// The three graphs kept per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Redirect,
    Canonical,
    Hreflang,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Redirect => "redirect",
            RelationshipKind::Canonical => "canonical",
            RelationshipKind::Hreflang => "hreflang",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a redirect was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectVia {
    /// 3xx status with a `Location` header
    Http,
    /// `<meta http-equiv="refresh">`
    MetaRefresh,
}

/// Where a canonical declaration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanonicalSource {
    Html,
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectEdge {
    /// Absolute target as resolved from the page
    pub target: String,
    pub status: u16,
    pub via: RedirectVia,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEdge {
    pub target: String,
    pub source: CanonicalSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HreflangEdge {
    /// Lowercased language tag (`en`, `fr-ca`, `x-default`)
    pub language: String,
    pub target: String,
}

/// An outgoing edge of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edge {
    Redirect(RedirectEdge),
    Canonical(CanonicalEdge),
    Hreflang(HreflangEdge),
}

impl Edge {
    pub fn kind(&self) -> RelationshipKind {
        match self {
            Edge::Redirect(_) => RelationshipKind::Redirect,
            Edge::Canonical(_) => RelationshipKind::Canonical,
            Edge::Hreflang(_) => RelationshipKind::Hreflang,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Edge::Redirect(e) => &e.target,
            Edge::Canonical(e) => &e.target,
            Edge::Hreflang(e) => &e.target,
        }
    }
}

/// Name, address and phone of a business entity found in structured data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NapRecord {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl NapRecord {
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.address.is_some() && self.phone.is_some()
    }

    /// Names of the missing fields.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.address.is_none() {
            missing.push("address");
        }
        if self.phone.is_none() {
            missing.push("telephone");
        }
        missing
    }
}
