//! Relationship graphs of one project.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use dashmap::DashMap;

use super::edges::{
    CanonicalEdge, Edge, HreflangEdge, NapRecord, RedirectEdge, RelationshipKind,
};
use crate::normalize::{normalize, NormalizedUrl};
use crate::page::ProjectId;

type ReverseIndex = DashMap<NormalizedUrl, BTreeSet<NormalizedUrl>>;

/// Directed redirect, canonical and hreflang maps of one project.
///
/// Keys are normalized sources. Every write is a single per-key upsert; entries are
/// only overwritten, never removed. Reverse indexes map a normalized target to the
/// sources pointing at it.
#[derive(Debug)]
pub struct ProjectRelationshipState {
    project: ProjectId,
    redirects: DashMap<NormalizedUrl, RedirectEdge>,
    canonicals: DashMap<NormalizedUrl, CanonicalEdge>,
    hreflang: DashMap<NormalizedUrl, Vec<HreflangEdge>>,
    redirect_sources: ReverseIndex,
    canonical_sources: ReverseIndex,
    hreflang_sources: ReverseIndex,
    nap_reference: OnceLock<NapRecord>,
}

impl ProjectRelationshipState {
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            redirects: DashMap::new(),
            canonicals: DashMap::new(),
            hreflang: DashMap::new(),
            redirect_sources: DashMap::new(),
            canonical_sources: DashMap::new(),
            hreflang_sources: DashMap::new(),
            nap_reference: OnceLock::new(),
        }
    }

    pub fn project(&self) -> ProjectId {
        self.project
    }

    /// Records an edge of any kind.
    pub fn track(&self, from: &str, edge: Edge) {
        match edge {
            Edge::Redirect(e) => self.track_redirect(from, e),
            Edge::Canonical(e) => self.track_canonical(from, e),
            Edge::Hreflang(e) => self.track_hreflang(from, e),
        }
    }

    /// Outgoing edges of `from` for one graph. Empty when nothing is known.
    pub fn lookup(&self, kind: RelationshipKind, from: &str) -> Vec<Edge> {
        let key = normalize(from);
        match kind {
            RelationshipKind::Redirect => self
                .redirect_of(&key)
                .map(Edge::Redirect)
                .into_iter()
                .collect(),
            RelationshipKind::Canonical => self
                .canonical_of(&key)
                .map(Edge::Canonical)
                .into_iter()
                .collect(),
            RelationshipKind::Hreflang => self
                .hreflang_of(&key)
                .into_iter()
                .map(Edge::Hreflang)
                .collect(),
        }
    }

    /// Records (or overwrites) the redirect of `from`.
    pub fn track_redirect(&self, from: &str, edge: RedirectEdge) {
        let source = normalize(from);
        let target = normalize(&edge.target);
        let previous = self.redirects.insert(source.clone(), edge);
        relink(
            &self.redirect_sources,
            &source,
            previous.map(|p| normalize(&p.target)),
            target,
        );
    }

    /// Records (or overwrites) the canonical of `from`.
    pub fn track_canonical(&self, from: &str, edge: CanonicalEdge) {
        let source = normalize(from);
        let target = normalize(&edge.target);
        let previous = self.canonicals.insert(source.clone(), edge);
        relink(
            &self.canonical_sources,
            &source,
            previous.map(|p| normalize(&p.target)),
            target,
        );
    }

    /// Adds an hreflang alternate of `from`, replacing an earlier one for the same language.
    pub fn track_hreflang(&self, from: &str, edge: HreflangEdge) {
        let source = normalize(from);
        let target = normalize(&edge.target);
        let previous = {
            let mut alternates = self.hreflang.entry(source.clone()).or_default();
            match alternates.iter_mut().find(|a| a.language == edge.language) {
                Some(existing) => Some(std::mem::replace(existing, edge)),
                None => {
                    alternates.push(edge);
                    None
                }
            }
        };
        let previous = previous.map(|p| normalize(&p.target));
        // The old target may still be declared under another language
        let still_declared = previous
            .as_ref()
            .map(|p| {
                self.hreflang_of(&source)
                    .iter()
                    .any(|a| &normalize(&a.target) == p)
            })
            .unwrap_or(false);
        relink(
            &self.hreflang_sources,
            &source,
            previous.filter(|_| !still_declared),
            target,
        );
    }

    /// Publishes the complete alternate set of `from` in one upsert.
    ///
    /// The entry doubles as the "analyzed" marker, so readers never observe the page
    /// as analyzed with only part of its alternates. An empty set still marks it.
    /// Later duplicates of a language replace earlier ones.
    pub fn replace_hreflang(&self, from: &str, edges: Vec<HreflangEdge>) {
        let source = normalize(from);
        let mut alternates: Vec<HreflangEdge> = Vec::with_capacity(edges.len());
        for edge in edges {
            match alternates.iter_mut().find(|a| a.language == edge.language) {
                Some(existing) => *existing = edge,
                None => alternates.push(edge),
            }
        }
        let targets: BTreeSet<NormalizedUrl> =
            alternates.iter().map(|a| normalize(&a.target)).collect();
        let previous = self.hreflang.insert(source.clone(), alternates);

        // The forward map is authoritative; the reverse index catches up after it
        for stale in previous
            .iter()
            .flatten()
            .map(|p| normalize(&p.target))
            .filter(|p| !targets.contains(p))
        {
            if let Some(mut sources) = self.hreflang_sources.get_mut(&stale) {
                sources.remove(&source);
            }
        }
        for target in targets {
            self.hreflang_sources
                .entry(target)
                .or_default()
                .insert(source.clone());
        }
    }

    pub fn redirect_of(&self, from: &NormalizedUrl) -> Option<RedirectEdge> {
        self.redirects.get(from).map(|e| e.value().clone())
    }

    pub fn canonical_of(&self, from: &NormalizedUrl) -> Option<CanonicalEdge> {
        self.canonicals.get(from).map(|e| e.value().clone())
    }

    pub fn hreflang_of(&self, from: &NormalizedUrl) -> Vec<HreflangEdge> {
        self.hreflang
            .get(from)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Target `from` declares for `language`, if any.
    pub fn hreflang_target(&self, from: &NormalizedUrl, language: &str) -> Option<HreflangEdge> {
        self.hreflang
            .get(from)
            .and_then(|e| e.value().iter().find(|a| a.language == language).cloned())
    }

    /// Whether the hreflang declarations of `page` are known.
    pub fn hreflang_analyzed(&self, page: &NormalizedUrl) -> bool {
        self.hreflang.contains_key(page)
    }

    /// Sources redirecting to `target`.
    pub fn redirect_sources(&self, target: &NormalizedUrl) -> Vec<NormalizedUrl> {
        sources(&self.redirect_sources, target)
    }

    /// Sources declaring `target` as canonical.
    pub fn canonical_sources(&self, target: &NormalizedUrl) -> Vec<NormalizedUrl> {
        sources(&self.canonical_sources, target)
    }

    /// Sources declaring `target` as an hreflang alternate.
    pub fn hreflang_sources(&self, target: &NormalizedUrl) -> Vec<NormalizedUrl> {
        sources(&self.hreflang_sources, target)
    }

    /// Number of sources with a tracked edge in one graph.
    pub fn edge_count(&self, kind: RelationshipKind) -> usize {
        match kind {
            RelationshipKind::Redirect => self.redirects.len(),
            RelationshipKind::Canonical => self.canonicals.len(),
            RelationshipKind::Hreflang => self
                .hreflang
                .iter()
                .filter(|e| !e.value().is_empty())
                .count(),
        }
    }

    /// The site-wide NAP reference: the first record offered wins.
    pub fn nap_reference_or_init(&self, candidate: NapRecord) -> &NapRecord {
        self.nap_reference.get_or_init(|| candidate)
    }

    pub fn nap_reference(&self) -> Option<&NapRecord> {
        self.nap_reference.get()
    }
}

fn relink(
    index: &ReverseIndex,
    source: &NormalizedUrl,
    previous: Option<NormalizedUrl>,
    target: NormalizedUrl,
) {
    if let Some(previous) = previous.filter(|p| *p != target) {
        if let Some(mut sources) = index.get_mut(&previous) {
            sources.remove(source);
        }
    }
    index.entry(target).or_default().insert(source.clone());
}

fn sources(index: &ReverseIndex, target: &NormalizedUrl) -> Vec<NormalizedUrl> {
    index
        .get(target)
        .map(|s| s.value().iter().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::edges::{CanonicalSource, RedirectVia};

    fn redirect(target: &str, status: u16) -> RedirectEdge {
        RedirectEdge {
            target: target.to_string(),
            status,
            via: RedirectVia::Http,
        }
    }

    fn hreflang(language: &str, target: &str) -> HreflangEdge {
        HreflangEdge {
            language: language.to_string(),
            target: target.to_string(),
        }
    }

    #[test]
    fn test_redirect_last_write_wins() {
        let state = ProjectRelationshipState::new(ProjectId(1));
        state.track_redirect("https://example.com/a/", redirect("https://example.com/b", 301));
        state.track_redirect("https://EXAMPLE.com/a", redirect("https://example.com/c", 302));

        let edge = state
            .redirect_of(&normalize("https://example.com/a"))
            .expect("tracked");
        assert_eq!(edge.target, "https://example.com/c");
        assert_eq!(edge.status, 302);
        assert_eq!(state.edge_count(RelationshipKind::Redirect), 1);

        // reverse index follows the overwrite
        assert!(state
            .redirect_sources(&normalize("https://example.com/b"))
            .is_empty());
        assert_eq!(
            state.redirect_sources(&normalize("https://example.com/c")),
            vec![normalize("https://example.com/a")]
        );
    }

    #[test]
    fn test_canonical_lookup_generic() {
        let state = ProjectRelationshipState::new(ProjectId(1));
        state.track(
            "https://example.com/x?utm=1",
            Edge::Canonical(CanonicalEdge {
                target: "https://example.com/x".into(),
                source: CanonicalSource::Html,
            }),
        );
        let edges = state.lookup(RelationshipKind::Canonical, "https://example.com/x?utm=1");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target(), "https://example.com/x");
        assert_eq!(edges[0].kind(), RelationshipKind::Canonical);
        assert!(state
            .lookup(RelationshipKind::Redirect, "https://example.com/x?utm=1")
            .is_empty());
    }

    #[test]
    fn test_hreflang_overwrites_per_language() {
        let state = ProjectRelationshipState::new(ProjectId(1));
        let page = "https://example.com/p1";
        state.track_hreflang(page, hreflang("en", "https://example.com/p1"));
        state.track_hreflang(page, hreflang("fr", "https://example.com/p2"));
        state.track_hreflang(page, hreflang("fr", "https://example.com/p3"));

        let alternates = state.hreflang_of(&normalize(page));
        assert_eq!(alternates.len(), 2);
        assert_eq!(
            state
                .hreflang_target(&normalize(page), "fr")
                .map(|e| e.target),
            Some("https://example.com/p3".to_string())
        );
        assert!(state
            .hreflang_sources(&normalize("https://example.com/p2"))
            .is_empty());
    }

    #[test]
    fn test_hreflang_analyzed_without_alternates() {
        let state = ProjectRelationshipState::new(ProjectId(1));
        let page = normalize("https://example.com/plain");
        assert!(!state.hreflang_analyzed(&page));
        state.replace_hreflang("https://example.com/plain", Vec::new());
        assert!(state.hreflang_analyzed(&page));
        assert_eq!(state.edge_count(RelationshipKind::Hreflang), 0);
    }

    #[test]
    fn test_hreflang_replace_publishes_whole_set() {
        let state = ProjectRelationshipState::new(ProjectId(1));
        let page = "https://example.com/p1";
        state.replace_hreflang(
            page,
            vec![
                hreflang("en", "https://example.com/p1"),
                hreflang("de", "https://example.com/p2"),
                hreflang("de", "https://example.com/p3"),
            ],
        );
        let key = normalize(page);
        assert!(state.hreflang_analyzed(&key));
        let alternates = state.hreflang_of(&key);
        assert_eq!(alternates.len(), 2);
        assert_eq!(
            state.hreflang_target(&key, "de").map(|e| e.target),
            Some("https://example.com/p3".to_string())
        );
        assert!(state
            .hreflang_sources(&normalize("https://example.com/p2"))
            .is_empty());

        // A later publish drops targets no longer declared
        state.replace_hreflang(page, vec![hreflang("en", "https://example.com/p1")]);
        assert_eq!(state.hreflang_of(&key).len(), 1);
        assert!(state
            .hreflang_sources(&normalize("https://example.com/p3"))
            .is_empty());
        assert_eq!(
            state.hreflang_sources(&normalize("https://example.com/p1")),
            vec![key]
        );
    }

    #[test]
    fn test_hreflang_readers_never_see_partial_set() {
        let state = std::sync::Arc::new(ProjectRelationshipState::new(ProjectId(1)));
        let page = normalize("https://example.com/p2");
        let writer = {
            let state = std::sync::Arc::clone(&state);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    state.replace_hreflang(
                        "https://example.com/p2",
                        vec![
                            hreflang("en", "https://example.com/p1"),
                            hreflang("de", "https://example.com/p2"),
                        ],
                    );
                }
            })
        };
        for _ in 0..2000 {
            if state.hreflang_analyzed(&page) {
                assert_eq!(state.hreflang_of(&page).len(), 2);
            }
        }
        writer.join().expect("writer thread");
    }

    #[test]
    fn test_nap_reference_first_wins() {
        let state = ProjectRelationshipState::new(ProjectId(1));
        let first = NapRecord {
            name: Some("Acme".into()),
            ..Default::default()
        };
        let second = NapRecord {
            name: Some("Other".into()),
            ..Default::default()
        };
        assert_eq!(state.nap_reference_or_init(first.clone()), &first);
        assert_eq!(state.nap_reference_or_init(second), &first);
    }
}
