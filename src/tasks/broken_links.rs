//! Broken link detection against the status cache.

use async_trait::async_trait;
use log::debug;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{AnalysisTask, TaskContext, TaskFilter};
use crate::config::PRIORITY_BROKEN_LINKS;
use crate::findings::Severity;
use crate::normalize::{normalize, same_site};
use crate::page::html;

const KEY: &str = "broken_links";

/// Reports anchors whose targets are known to fail or redirect.
#[derive(Debug, Default)]
pub struct BrokenLinksTask;

#[async_trait]
impl AnalysisTask for BrokenLinksTask {
    fn key(&self) -> &str {
        KEY
    }

    fn display_name(&self) -> &str {
        "Broken links"
    }

    fn priority(&self) -> i32 {
        PRIORITY_BROKEN_LINKS
    }

    fn filter(&self) -> TaskFilter {
        TaskFilter::HTML_SUCCESS
    }

    async fn run(&self, ctx: &mut TaskContext<'_>, cancel: &CancellationToken) -> anyhow::Result<()> {
        let page = ctx.page;
        let anchors = page.html().map(html::extract_anchors).unwrap_or_default();
        if anchors.is_empty() {
            return Ok(());
        }

        let mut checked = 0usize;
        for anchor in anchors {
            let Some(target) = page.resolve(&anchor.href) else {
                continue;
            };
            if !ctx.config.check_external_links && !same_site(page.url(), &target) {
                continue;
            }
            checked += 1;

            let target_key = normalize(&target);
            let Some(status) = ctx.target_status(&target, cancel).await? else {
                continue;
            };

            if status >= 400 {
                ctx.report(
                    &format!("{}|{}", target_key, status),
                    Severity::Error,
                    "broken_link",
                    format!("Link to {} returns {}", target, status),
                    json!({ "target": target, "status": status, "nofollow": anchor.nofollow }),
                );
            } else if (300..400).contains(&status) {
                let redirect = ctx.relationships.redirect_of(&target_key);
                ctx.report(
                    &format!("{}|{}", target_key, status),
                    Severity::Info,
                    "link_to_redirect",
                    format!("Link to {} redirects ({})", target, status),
                    json!({
                        "target": target,
                        "status": status,
                        "redirectTarget": redirect.map(|r| r.target),
                    }),
                );
            } else if let Some(redirect) = ctx.relationships.redirect_of(&target_key) {
                // Crawled before it started redirecting, or via meta refresh
                ctx.report(
                    &format!("{}|redirect", target_key),
                    Severity::Info,
                    "link_to_redirect",
                    format!("Link to {} redirects to {}", target, redirect.target),
                    json!({
                        "target": target,
                        "status": redirect.status,
                        "redirectTarget": redirect.target,
                    }),
                );
            }
        }
        debug!("Checked {} link(s) on {}", checked, page.url());
        Ok(())
    }
}
