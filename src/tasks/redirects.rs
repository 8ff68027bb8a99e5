//! Redirect analysis: HTTP and meta-refresh redirects, chains and loops.

use std::collections::HashSet;

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{hops_payload, AnalysisTask, TaskContext};
use crate::chain::{self, render_path, ChainClass, ChainWalk, WalkEnd};
use crate::config::PRIORITY_REDIRECTS;
use crate::findings::{ColumnKind, ReportSchema, Severity};
use crate::normalize::normalize;
use crate::relationships::{ProjectRelationshipState, RedirectEdge, RedirectVia};

const KEY: &str = "redirects";
const CHAIN_REPORT: &str = "redirect_chains";

/// Tracks redirects and reports chains, loops and questionable redirect types.
#[derive(Debug, Default)]
pub struct RedirectsTask;

fn chain_schema() -> ReportSchema {
    ReportSchema::new(CHAIN_REPORT, "Redirect chains")
        .column("start", ColumnKind::Url)
        .column("final_target", ColumnKind::Url)
        .column("hops", ColumnKind::Integer)
        .column("path", ColumnKind::Text)
        .column("severity", ColumnKind::Severity)
}

fn status_attribute(status: &u16) -> (&'static str, Value) {
    ("status", json!(status))
}

/// Outgoing redirect of the page, or the reason there is none.
fn page_redirect(ctx: &mut TaskContext<'_>) -> Option<RedirectEdge> {
    let page = ctx.page;
    if page.is_redirect() {
        return match page.location() {
            Some(target) => Some(RedirectEdge {
                target,
                status: page.status(),
                via: RedirectVia::Http,
            }),
            None => {
                ctx.report(
                    "missing_location",
                    Severity::Error,
                    "redirect_missing_location",
                    format!(
                        "{} answers {} without a usable Location header",
                        page.url(),
                        page.status()
                    ),
                    json!({ "status": page.status() }),
                );
                None
            }
        };
    }

    let refresh = page.metadata().meta_refresh.as_ref()?;
    let raw = refresh.target.as_deref()?;
    let Some(target) = page.resolve(raw) else {
        debug!("Ignoring unresolvable meta refresh target '{}' on {}", raw, page.url());
        return None;
    };
    ctx.report(
        "meta_refresh",
        Severity::Warning,
        "meta_refresh_redirect",
        format!("Meta refresh redirect to {} after {}s", target, refresh.delay_secs),
        json!({ "target": target, "delaySeconds": refresh.delay_secs }),
    );
    Some(RedirectEdge {
        target,
        status: page.status(),
        via: RedirectVia::MetaRefresh,
    })
}

fn walk_from(
    state: &ProjectRelationshipState,
    start: &str,
    first: &RedirectEdge,
    max_hops: usize,
) -> ChainWalk<u16> {
    chain::walk(start, &first.target, first.status, max_hops, |node| {
        state.redirect_of(node).map(|e| (e.target, e.status))
    })
}

/// Reports a loop or chain found by a walk.
fn report_walk(
    ctx: &mut TaskContext<'_>,
    walk: &ChainWalk<u16>,
    reported_loops: &mut HashSet<String>,
) -> anyhow::Result<()> {
    let start = walk.hops.first().map(|h| h.from.clone()).unwrap_or_default();
    match walk.class {
        ChainClass::Looping => {
            let cycle = walk.rotated_cycle();
            let path = render_path(cycle.iter().copied());
            if !reported_loops.insert(path.clone()) {
                return Ok(());
            }
            ctx.report(
                &format!("loop|{}", path),
                Severity::Error,
                "redirect_loop",
                format!("Redirect loop: {}", path),
                json!({
                    "start": start,
                    "hops": hops_payload(cycle.iter().copied(), status_attribute),
                }),
            );
        }
        ChainClass::Chained => {
            let Some(severity) =
                chain::chain_severity(walk.hop_count(), ctx.config.severe_chain_hops)
            else {
                return Ok(());
            };
            let final_target = walk.final_target().unwrap_or_default().to_string();
            let path = walk.path();
            ctx.report(
                &format!("chain|{}", normalize(&start)),
                severity,
                "redirect_chain",
                format!("Redirect chain of {} hops: {}", walk.hop_count(), path),
                json!({
                    "start": start,
                    "finalTarget": final_target,
                    "hopCount": walk.hop_count(),
                    "hopLimitReached": walk.end == WalkEnd::HopLimit,
                    "hops": hops_payload(&walk.hops, status_attribute),
                }),
            );
            let row = chain_schema().row(vec![
                json!(start),
                json!(final_target),
                json!(walk.hop_count()),
                json!(path),
                json!(severity.as_str()),
            ])?;
            ctx.add_row(&normalize(&start).into_string(), row);
        }
        ChainClass::Terminated | ChainClass::SelfReferencing => {}
    }
    Ok(())
}

#[async_trait]
impl AnalysisTask for RedirectsTask {
    fn key(&self) -> &str {
        KEY
    }

    fn display_name(&self) -> &str {
        "Redirects"
    }

    fn priority(&self) -> i32 {
        PRIORITY_REDIRECTS
    }

    fn report_schemas(&self) -> Vec<ReportSchema> {
        vec![chain_schema()]
    }

    async fn run(&self, ctx: &mut TaskContext<'_>, cancel: &CancellationToken) -> anyhow::Result<()> {
        let page = ctx.page;
        let state = ctx.relationships;

        if page.metadata().redirect_loop {
            ctx.report(
                "fetcher_loop",
                Severity::Error,
                "redirect_loop",
                format!("The fetcher gave up on a redirect loop at {}", page.url()),
                json!({ "detectedBy": "fetcher" }),
            );
        }

        let edge = page_redirect(ctx);
        let mut reported_loops = HashSet::new();

        if let Some(edge) = &edge {
            let target_key = normalize(&edge.target);
            if edge.via == RedirectVia::Http && matches!(edge.status, 302 | 303 | 307) {
                ctx.report(
                    "temporary",
                    Severity::Warning,
                    "temporary_redirect",
                    format!(
                        "Temporary redirect ({}) to {}; use 301 or 308 for permanent moves",
                        edge.status, edge.target
                    ),
                    json!({ "target": edge.target, "status": edge.status }),
                );
            }
            if &target_key == page.normalized() {
                ctx.report(
                    "self",
                    Severity::Info,
                    "redirect_self_reference",
                    format!("{} redirects to an equivalent URL {}", page.url(), edge.target),
                    json!({ "target": edge.target, "status": edge.status }),
                );
            }

            state.track_redirect(page.url(), edge.clone());

            let walk = walk_from(state, page.url(), edge, ctx.config.max_redirect_hops);
            report_walk(ctx, &walk, &mut reported_loops)?;

            if walk.class != ChainClass::Looping && walk.class != ChainClass::SelfReferencing {
                if let Some(final_target) = walk.final_target() {
                    if let Some(status) = ctx.target_status(final_target, cancel).await? {
                        if status >= 400 {
                            ctx.report(
                                &format!("target_error|{}", normalize(final_target)),
                                Severity::Error,
                                "redirect_target_error",
                                format!(
                                    "Redirect from {} ends at {} which returns {}",
                                    page.url(),
                                    final_target,
                                    status
                                ),
                                json!({ "target": final_target, "status": status }),
                            );
                        }
                    }
                }
            }
        }

        // Earlier pages whose chains pass through this one
        let predecessors = chain::upstream(page.normalized(), ctx.config.max_redirect_hops, |n| {
            state.redirect_sources(n)
        });
        for source in predecessors {
            let Some(first) = state.redirect_of(&source) else {
                continue;
            };
            let walk = walk_from(state, source.as_str(), &first, ctx.config.max_redirect_hops);
            report_walk(ctx, &walk, &mut reported_loops)?;
        }
        Ok(())
    }
}
