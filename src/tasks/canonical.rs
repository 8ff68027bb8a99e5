//! Canonical URL analysis.

use std::collections::HashSet;

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{hops_payload, AnalysisTask, TaskContext, TaskFilter};
use crate::chain::{self, render_path, ChainClass, ChainWalk};
use crate::config::PRIORITY_CANONICAL;
use crate::findings::Severity;
use crate::normalize::{normalize, same_site};
use crate::relationships::{CanonicalEdge, CanonicalSource, ProjectRelationshipState};

const KEY: &str = "canonical";

/// Validates canonical declarations and follows canonical chains.
#[derive(Debug, Default)]
pub struct CanonicalTask;

fn source_attribute(source: &CanonicalSource) -> (&'static str, Value) {
    let name = match source {
        CanonicalSource::Html => "html",
        CanonicalSource::Header => "header",
    };
    ("source", json!(name))
}

fn walk_from(
    state: &ProjectRelationshipState,
    start: &str,
    first: &CanonicalEdge,
    max_hops: usize,
) -> ChainWalk<CanonicalSource> {
    chain::walk(start, &first.target, first.source, max_hops, |node| {
        state.canonical_of(node).map(|e| (e.target, e.source))
    })
}

fn report_walk(
    ctx: &mut TaskContext<'_>,
    walk: &ChainWalk<CanonicalSource>,
    reported_loops: &mut HashSet<String>,
) {
    let start = walk.hops.first().map(|h| h.from.clone()).unwrap_or_default();
    match walk.class {
        ChainClass::Looping => {
            let cycle = walk.rotated_cycle();
            let path = render_path(cycle.iter().copied());
            if !reported_loops.insert(path.clone()) {
                return;
            }
            ctx.report(
                &format!("loop|{}", path),
                Severity::Error,
                "canonical_loop",
                format!("Canonical loop: {}", path),
                json!({
                    "start": start,
                    "hops": hops_payload(cycle.iter().copied(), source_attribute),
                }),
            );
        }
        ChainClass::Chained => {
            let Some(severity) =
                chain::chain_severity(walk.hop_count(), ctx.config.severe_chain_hops)
            else {
                return;
            };
            ctx.report(
                &format!("chain|{}", normalize(&start)),
                severity,
                "canonical_chain",
                format!(
                    "Canonical chain of {} hops: {}",
                    walk.hop_count(),
                    walk.path()
                ),
                json!({
                    "start": start,
                    "finalTarget": walk.final_target(),
                    "hopCount": walk.hop_count(),
                    "hops": hops_payload(&walk.hops, source_attribute),
                }),
            );
        }
        ChainClass::SelfReferencing => {
            debug!("Self-referencing canonical on {}", start);
        }
        ChainClass::Terminated => {}
    }
}

/// Resolves the raw canonical values, reporting the unusable ones.
fn declared_canonical(ctx: &mut TaskContext<'_>) -> Option<CanonicalEdge> {
    let page = ctx.page;
    let metadata = page.metadata();

    let mut resolve = |raw: Option<&String>, source: CanonicalSource| {
        let raw = raw?;
        match page.resolve(raw) {
            Some(target) => Some(CanonicalEdge { target, source }),
            None => {
                ctx.report(
                    &format!("invalid|{}", raw),
                    Severity::Warning,
                    "invalid_canonical",
                    format!("Canonical URL '{}' cannot be resolved", raw),
                    json!({ "value": raw, "source": source_attribute(&source).1 }),
                );
                None
            }
        }
    };
    let html = resolve(metadata.canonical_html.as_ref(), CanonicalSource::Html);
    let header = resolve(metadata.canonical_header.as_ref(), CanonicalSource::Header);

    if let (Some(h), Some(l)) = (&html, &header) {
        if normalize(&h.target) != normalize(&l.target) {
            ctx.report(
                "conflict",
                Severity::Warning,
                "canonical_conflict",
                format!(
                    "HTML canonical {} differs from Link header canonical {}",
                    h.target, l.target
                ),
                json!({ "html": h.target, "header": l.target }),
            );
        }
    }

    if metadata.canonical_html.is_none() && metadata.canonical_header.is_none() {
        ctx.report(
            "missing",
            Severity::Info,
            "missing_canonical",
            format!("{} declares no canonical URL", page.url()),
            Value::Null,
        );
    }
    html.or(header)
}

#[async_trait]
impl AnalysisTask for CanonicalTask {
    fn key(&self) -> &str {
        KEY
    }

    fn display_name(&self) -> &str {
        "Canonical URLs"
    }

    fn priority(&self) -> i32 {
        PRIORITY_CANONICAL
    }

    fn filter(&self) -> TaskFilter {
        TaskFilter::HTML_SUCCESS
    }

    async fn run(&self, ctx: &mut TaskContext<'_>, cancel: &CancellationToken) -> anyhow::Result<()> {
        let page = ctx.page;
        let state = ctx.relationships;
        let mut reported_loops = HashSet::new();

        if let Some(edge) = declared_canonical(ctx) {
            let target_key = normalize(&edge.target);
            let is_self = &target_key == page.normalized();

            if page.metadata().robots.noindex {
                ctx.report(
                    "noindex",
                    Severity::Warning,
                    "canonical_on_noindex",
                    format!(
                        "{} is noindex but declares canonical {}",
                        page.url(),
                        edge.target
                    ),
                    json!({ "target": edge.target }),
                );
            }
            if !same_site(page.url(), &edge.target) {
                ctx.report(
                    "external",
                    Severity::Info,
                    "external_canonical",
                    format!("Canonical points to another site: {}", edge.target),
                    json!({ "target": edge.target }),
                );
            }

            state.track_canonical(page.url(), edge.clone());
            let walk = walk_from(state, page.url(), &edge, ctx.config.max_canonical_hops);
            report_walk(ctx, &walk, &mut reported_loops);

            if !is_self {
                match ctx.target_status(&edge.target, cancel).await? {
                    Some(status) if status >= 400 => ctx.report(
                        &format!("target_error|{}|{}", target_key, status),
                        Severity::Error,
                        "canonical_target_error",
                        format!("Canonical target {} returns {}", edge.target, status),
                        json!({ "target": edge.target, "status": status }),
                    ),
                    Some(status) if (300..400).contains(&status) => ctx.report(
                        &format!("target_redirect|{}", target_key),
                        Severity::Warning,
                        "canonical_target_redirect",
                        format!("Canonical target {} redirects ({})", edge.target, status),
                        json!({ "target": edge.target, "status": status }),
                    ),
                    _ => {
                        if let Some(redirect) = state.redirect_of(&target_key) {
                            ctx.report(
                                &format!("target_redirect|{}", target_key),
                                Severity::Warning,
                                "canonical_target_redirect",
                                format!(
                                    "Canonical target {} redirects to {}",
                                    edge.target, redirect.target
                                ),
                                json!({
                                    "target": edge.target,
                                    "status": redirect.status,
                                    "redirectTarget": redirect.target,
                                }),
                            );
                        }
                    }
                }
            }
        }

        let predecessors = chain::upstream(page.normalized(), ctx.config.max_canonical_hops, |n| {
            state.canonical_sources(n)
        });
        for source in predecessors {
            let Some(first) = state.canonical_of(&source) else {
                continue;
            };
            let walk = walk_from(state, source.as_str(), &first, ctx.config.max_canonical_hops);
            report_walk(ctx, &walk, &mut reported_loops);
        }
        Ok(())
    }
}
