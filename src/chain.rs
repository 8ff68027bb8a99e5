//! Chain and loop detection over a relationship graph.
//!
//! [`walk`] follows outgoing edges from a page through a lookup closure, so the same
//! algorithm serves redirects, canonicals and per-language hreflang targets. Walks
//! over a partially crawled graph stop at the first unknown node; that is a normal
//! result, not an error.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::findings::Severity;
use crate::normalize::{normalize, NormalizedUrl};

/// Shape of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChainClass {
    /// One hop to a target with no further known edge
    Terminated,
    /// The first edge points back at the start
    SelfReferencing,
    /// More than one hop before the walk stopped
    Chained,
    /// An edge led back to a node already on the path
    Looping,
}

impl fmt::Display for ChainClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainClass::Terminated => "terminated",
            ChainClass::SelfReferencing => "self-referencing",
            ChainClass::Chained => "chained",
            ChainClass::Looping => "looping",
        };
        f.write_str(name)
    }
}

/// Why a walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WalkEnd {
    /// The last target has no known outgoing edge (yet)
    Unresolved,
    /// The last target points at itself
    SelfReference,
    /// An edge led back to a visited node
    Revisit,
    /// `max_hops` lookups were made without stopping
    HopLimit,
}

/// One edge on the walked path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hop<A> {
    pub from: String,
    pub to: String,
    pub attribute: A,
}

/// Result of one [`walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainWalk<A> {
    pub hops: Vec<Hop<A>>,
    pub class: ChainClass,
    pub end: WalkEnd,
}

impl<A> ChainWalk<A> {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Target of the last hop.
    pub fn final_target(&self) -> Option<&str> {
        self.hops.last().map(|h| h.to.as_str())
    }

    /// The hops forming the loop, starting at the revisited node.
    ///
    /// Empty unless the walk is [`ChainClass::Looping`].
    pub fn cycle(&self) -> &[Hop<A>] {
        if self.class != ChainClass::Looping {
            return &[];
        }
        let Some(last) = self.hops.last() else {
            return &[];
        };
        let revisited = normalize(&last.to);
        let start = self
            .hops
            .iter()
            .position(|h| normalize(&h.from) == revisited)
            .unwrap_or(0);
        &self.hops[start..]
    }

    /// The loop rotated to start at its smallest normalized node.
    ///
    /// The same loop reached from different pages yields the same sequence.
    pub fn rotated_cycle(&self) -> Vec<&Hop<A>> {
        let cycle = self.cycle();
        let Some(first) = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, h)| normalize(&h.from))
            .map(|(i, _)| i)
        else {
            return Vec::new();
        };
        cycle[first..].iter().chain(cycle[..first].iter()).collect()
    }

    /// `a -> b -> c` rendering of the path.
    pub fn path(&self) -> String {
        render_path(self.hops.iter())
    }
}

/// `a -> b -> c` rendering of a hop sequence.
pub fn render_path<'a, A: 'a>(hops: impl IntoIterator<Item = &'a Hop<A>>) -> String {
    let mut out = String::new();
    for (i, hop) in hops.into_iter().enumerate() {
        if i == 0 {
            out.push_str(&hop.from);
        }
        out.push_str(" -> ");
        out.push_str(&hop.to);
    }
    out
}

/// Follows edges from `start`.
///
/// `lookup` returns the outgoing edge of a normalized node as `(raw target, attribute)`.
/// A first edge back at `start` is classified as self-referencing before any loop
/// check, so a page pointing at itself is never reported as a loop.
pub fn walk<A, F>(
    start: &str,
    first_target: &str,
    first_attribute: A,
    max_hops: usize,
    mut lookup: F,
) -> ChainWalk<A>
where
    F: FnMut(&NormalizedUrl) -> Option<(String, A)>,
{
    let start_key = normalize(start);
    let mut hops = vec![Hop {
        from: start.to_string(),
        to: first_target.to_string(),
        attribute: first_attribute,
    }];

    if normalize(first_target) == start_key {
        return ChainWalk {
            hops,
            class: ChainClass::SelfReferencing,
            end: WalkEnd::SelfReference,
        };
    }

    let mut visited = HashSet::from([start_key]);
    let mut current = first_target.to_string();
    let mut end = WalkEnd::HopLimit;

    for _ in 0..max_hops {
        let current_key = normalize(&current);
        visited.insert(current_key.clone());

        let Some((next, attribute)) = lookup(&current_key) else {
            end = WalkEnd::Unresolved;
            break;
        };
        let next_key = normalize(&next);
        if next_key == current_key {
            end = WalkEnd::SelfReference;
            break;
        }

        let revisit = visited.contains(&next_key);
        hops.push(Hop {
            from: std::mem::replace(&mut current, next.clone()),
            to: next,
            attribute,
        });
        if revisit {
            return ChainWalk {
                hops,
                class: ChainClass::Looping,
                end: WalkEnd::Revisit,
            };
        }
    }

    let class = if hops.len() > 1 {
        ChainClass::Chained
    } else {
        ChainClass::Terminated
    };
    ChainWalk { hops, class, end }
}

/// Nodes that reach `target` through at most `max_depth` edges, nearest first.
///
/// Used to re-walk earlier pages whose chains grew when `target` was analyzed.
/// `target` itself is never returned.
pub fn upstream<F>(target: &NormalizedUrl, max_depth: usize, mut sources: F) -> Vec<NormalizedUrl>
where
    F: FnMut(&NormalizedUrl) -> Vec<NormalizedUrl>,
{
    let mut seen = HashSet::from([target.clone()]);
    let mut found = Vec::new();
    let mut frontier = vec![target.clone()];
    for _ in 0..max_depth {
        let mut next = Vec::new();
        for node in &frontier {
            for source in sources(node) {
                if seen.insert(source.clone()) {
                    found.push(source.clone());
                    next.push(source);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    found
}

/// Severity of a chain of `hops` hops. `None` below two hops.
pub fn chain_severity(hops: usize, severe_chain_hops: usize) -> Option<Severity> {
    if hops < 2 {
        None
    } else if hops >= severe_chain_hops {
        Some(Severity::Error)
    } else {
        Some(Severity::Warning)
    }
}
