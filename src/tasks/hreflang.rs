//! Hreflang analysis: language tags, return links and per-language consistency.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{hops_payload, AnalysisTask, TaskContext, TaskFilter};
use crate::chain::{self, render_path, ChainClass};
use crate::config::PRIORITY_HREFLANG;
use crate::findings::Severity;
use crate::normalize::{normalize, NormalizedUrl};
use crate::page::{html, parse_link_header, PageContext};
use crate::relationships::{HreflangEdge, ProjectRelationshipState};

const KEY: &str = "hreflang";

/// `x-default` or language[-script][-region], e.g. `en`, `zh-Hant-TW`, `es-419`.
static LANGUAGE_TAG: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)^(x-default|[a-z]{2,3}(-[a-z]{4})?(-([a-z]{2}|[0-9]{3}))?)$").ok()
});

/// Checks hreflang annotations and their reciprocity across pages.
#[derive(Debug, Default)]
pub struct HreflangTask;

fn valid_language(tag: &str) -> bool {
    LANGUAGE_TAG
        .as_ref()
        .map(|re| re.is_match(tag))
        .unwrap_or(false)
}

/// Raw `(language, href)` declarations from markup and `Link` headers.
fn declarations(page: &PageContext) -> Vec<(String, String)> {
    let mut found: Vec<(String, String)> = page
        .html()
        .map(html::extract_hreflang)
        .unwrap_or_default()
        .into_iter()
        .map(|tag| (tag.language, tag.href))
        .collect();
    if let Some(link) = page.headers().get("link") {
        found.extend(
            parse_link_header(link)
                .into_iter()
                .filter(|entry| entry.rel.iter().any(|r| r == "alternate"))
                .filter_map(|entry| Some((entry.hreflang?, entry.target))),
        );
    }
    found
}

/// Validates declarations and returns the usable alternates, first one per language.
fn alternates(ctx: &mut TaskContext<'_>) -> Vec<HreflangEdge> {
    let page = ctx.page;
    let mut accepted: Vec<HreflangEdge> = Vec::new();
    for (language, href) in declarations(page) {
        if !valid_language(&language) {
            ctx.report(
                &format!("invalid_language|{}", language),
                Severity::Warning,
                "invalid_hreflang_language",
                format!("Invalid hreflang language code '{}'", language),
                json!({ "language": language, "href": href }),
            );
            continue;
        }
        let Some(target) = page.resolve(&href) else {
            ctx.report(
                &format!("invalid_url|{}", href),
                Severity::Warning,
                "invalid_hreflang_url",
                format!("Hreflang '{}' URL '{}' cannot be resolved", language, href),
                json!({ "language": language, "href": href }),
            );
            continue;
        };
        let language = language.to_ascii_lowercase();
        if let Some(existing) = accepted.iter().find(|a| a.language == language) {
            if normalize(&existing.target) != normalize(&target) {
                ctx.report(
                    &format!("duplicate_language|{}", language),
                    Severity::Warning,
                    "duplicate_hreflang_language",
                    format!(
                        "Hreflang '{}' is declared for both {} and {}",
                        language, existing.target, target
                    ),
                    json!({ "language": language, "targets": [existing.target, target] }),
                );
            }
            continue;
        }
        accepted.push(HreflangEdge { language, target });
    }
    accepted
}

fn report_missing_return(
    ctx: &mut TaskContext<'_>,
    declarer: &NormalizedUrl,
    alternate: &NormalizedUrl,
    language: &str,
) {
    ctx.report(
        &format!("hreflang_missing_return|{}|{}", alternate, declarer),
        Severity::Warning,
        "hreflang_missing_return",
        format!(
            "{} does not link back to {} via hreflang",
            alternate, declarer
        ),
        json!({
            "unreciprocatedUrl": declarer.as_str(),
            "missingFrom": alternate.as_str(),
            "language": language,
        }),
    );
}

fn links_to(state: &ProjectRelationshipState, from: &NormalizedUrl, to: &NormalizedUrl) -> bool {
    state
        .hreflang_of(from)
        .iter()
        .any(|a| &normalize(&a.target) == to)
}

#[async_trait]
impl AnalysisTask for HreflangTask {
    fn key(&self) -> &str {
        KEY
    }

    fn display_name(&self) -> &str {
        "Hreflang"
    }

    fn priority(&self) -> i32 {
        PRIORITY_HREFLANG
    }

    fn filter(&self) -> TaskFilter {
        TaskFilter::HTML_SUCCESS
    }

    async fn run(&self, ctx: &mut TaskContext<'_>, cancel: &CancellationToken) -> anyhow::Result<()> {
        let page = ctx.page;
        let state = ctx.relationships;
        let self_key = page.normalized().clone();
        let alternates = alternates(ctx);

        if !alternates.is_empty() && !alternates.iter().any(|a| normalize(&a.target) == self_key) {
            ctx.report(
                "missing_self",
                Severity::Warning,
                "hreflang_missing_self_reference",
                format!("{} declares hreflang alternates but not itself", page.url()),
                json!({ "languages": alternates.iter().map(|a| a.language.as_str()).collect::<Vec<_>>() }),
            );
        }

        state.replace_hreflang(page.url(), alternates.clone());

        // Alternates already analyzed must point back here
        for alternate in &alternates {
            let target = normalize(&alternate.target);
            if target == self_key || !state.hreflang_analyzed(&target) {
                continue;
            }
            if !links_to(state, &target, &self_key) {
                report_missing_return(ctx, &self_key, &target, &alternate.language);
            }
        }

        // Earlier pages that declared this one as an alternate
        for source in state.hreflang_sources(&self_key) {
            if source == self_key {
                continue;
            }
            if !links_to(state, &self_key, &source) {
                let language = state
                    .hreflang_of(&source)
                    .into_iter()
                    .find(|a| normalize(&a.target) == self_key)
                    .map(|a| a.language)
                    .unwrap_or_default();
                report_missing_return(ctx, &source, &self_key, &language);
            }
        }

        // Every page in a set must agree on the URL of each language
        let mut reported_loops = HashSet::new();
        for alternate in &alternates {
            if normalize(&alternate.target) == self_key {
                continue;
            }
            let language = alternate.language.as_str();
            let walk = chain::walk(
                page.url(),
                &alternate.target,
                language.to_string(),
                ctx.config.max_hreflang_hops,
                |node| {
                    state
                        .hreflang_target(node, language)
                        .map(|e| (e.target, e.language))
                },
            );
            let language_attribute = |l: &String| ("language", Value::from(l.as_str()));
            match walk.class {
                ChainClass::Looping => {
                    let cycle = walk.rotated_cycle();
                    let path = render_path(cycle.iter().copied());
                    if reported_loops.insert(path.clone()) {
                        ctx.report(
                            &format!("loop|{}|{}", language, path),
                            Severity::Error,
                            "hreflang_loop",
                            format!("Hreflang '{}' targets form a loop: {}", language, path),
                            json!({
                                "language": language,
                                "hops": hops_payload(cycle.iter().copied(), language_attribute),
                            }),
                        );
                    }
                }
                ChainClass::Chained => {
                    ctx.report(
                        &format!("inconsistent|{}|{}", language, normalize(&alternate.target)),
                        Severity::Warning,
                        "hreflang_inconsistent_target",
                        format!(
                            "Hreflang '{}' points to {} which declares '{}' as {}",
                            language,
                            alternate.target,
                            language,
                            walk.final_target().unwrap_or_default()
                        ),
                        json!({
                            "language": language,
                            "declared": alternate.target,
                            "resolvedTo": walk.final_target(),
                            "hops": hops_payload(&walk.hops, language_attribute),
                        }),
                    );
                }
                ChainClass::Terminated | ChainClass::SelfReferencing => {}
            }
        }

        for alternate in &alternates {
            if normalize(&alternate.target) == self_key {
                continue;
            }
            let Some(status) = ctx.target_status(&alternate.target, cancel).await? else {
                continue;
            };
            let target_key = normalize(&alternate.target);
            if status >= 400 {
                ctx.report(
                    &format!("target_error|{}|{}", target_key, status),
                    Severity::Error,
                    "hreflang_target_error",
                    format!(
                        "Hreflang '{}' target {} returns {}",
                        alternate.language, alternate.target, status
                    ),
                    json!({ "language": alternate.language, "target": alternate.target, "status": status }),
                );
            } else if (300..400).contains(&status) {
                ctx.report(
                    &format!("target_redirect|{}", target_key),
                    Severity::Warning,
                    "hreflang_target_redirect",
                    format!(
                        "Hreflang '{}' target {} redirects ({})",
                        alternate.language, alternate.target, status
                    ),
                    json!({ "language": alternate.language, "target": alternate.target, "status": status }),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ProjectId;
    use crate::tasks::test_support::{html_page, Harness};

    fn with_alternates(url: &str, alternates: &[(&str, &str)]) -> PageContext {
        let links: String = alternates
            .iter()
            .map(|(lang, href)| {
                format!(r#"<link rel="alternate" hreflang="{}" href="{}">"#, lang, href)
            })
            .collect();
        html_page(url, &format!("<html><head>{}</head></html>", links))
    }

    fn missing_returns(findings: &[crate::findings::Finding]) -> Vec<&crate::findings::Finding> {
        findings
            .iter()
            .filter(|f| f.code == "hreflang_missing_return")
            .collect()
    }

    #[tokio::test]
    async fn test_missing_return_after_alternate_crawled() {
        let h = Harness::new();
        let p1 = with_alternates("https://e.com/p1", &[("en", "/p1"), ("fr", "/p2")]);
        let first = h.run(&HreflangTask, &p1).await;
        assert!(missing_returns(&first).is_empty());

        let p2 = with_alternates("https://e.com/p2", &[("fr", "/p2")]);
        let second = h.run(&HreflangTask, &p2).await;
        let missing = missing_returns(&second);
        assert_eq!(missing.len(), 1);
        assert_eq!(
            missing[0].field("unreciprocatedUrl"),
            Some(&json!("https://e.com/p1"))
        );
        assert_eq!(missing[0].field("missingFrom"), Some(&json!("https://e.com/p2")));
        assert_eq!(missing[0].field("language"), Some(&json!("fr")));
    }

    #[tokio::test]
    async fn test_missing_return_reverse_crawl_order() {
        let h = Harness::new();
        let p2 = with_alternates("https://e.com/p2", &[("fr", "/p2")]);
        assert!(missing_returns(&h.run(&HreflangTask, &p2).await).is_empty());

        let p1 = with_alternates("https://e.com/p1", &[("en", "/p1"), ("fr", "/p2")]);
        let findings = h.run(&HreflangTask, &p1).await;
        let missing = missing_returns(&findings);
        assert_eq!(missing.len(), 1);
        assert_eq!(
            missing[0].field("unreciprocatedUrl"),
            Some(&json!("https://e.com/p1"))
        );
    }

    #[tokio::test]
    async fn test_reciprocal_set_is_clean() {
        let h = Harness::new();
        let set = [("en", "https://e.com/en"), ("fr", "https://e.com/fr")];
        h.run(&HreflangTask, &with_alternates("https://e.com/en", &set)).await;
        let findings = h
            .run(&HreflangTask, &with_alternates("https://e.com/fr", &set))
            .await;
        assert!(findings.is_empty(), "unexpected findings: {:?}", findings);
    }

    #[tokio::test]
    async fn test_invalid_duplicate_and_missing_self() {
        let h = Harness::new();
        let page = with_alternates(
            "https://e.com/a",
            &[("english", "/en"), ("de", "/de"), ("de", "/de-other")],
        );
        let findings = h.run(&HreflangTask, &page).await;
        let codes: Vec<_> = findings.iter().map(|f| f.code.as_str()).collect();
        assert!(codes.contains(&"invalid_hreflang_language"));
        assert!(codes.contains(&"duplicate_hreflang_language"));
        assert!(codes.contains(&"hreflang_missing_self_reference"));
        assert_eq!(
            h.state
                .hreflang_target(&normalize("https://e.com/a"), "de")
                .map(|e| e.target),
            Some("https://e.com/de".to_string())
        );
    }

    #[tokio::test]
    async fn test_inconsistent_language_target() {
        let h = Harness::new();
        h.run(
            &HreflangTask,
            &with_alternates("https://e.com/fr", &[("fr", "/fr-new"), ("en", "/en")]),
        )
        .await;
        let findings = h
            .run(
                &HreflangTask,
                &with_alternates("https://e.com/en", &[("en", "/en"), ("fr", "/fr")]),
            )
            .await;
        let inconsistent = findings
            .iter()
            .find(|f| f.code == "hreflang_inconsistent_target")
            .expect("inconsistent target");
        assert_eq!(inconsistent.field("resolvedTo"), Some(&json!("https://e.com/fr-new")));
    }

    #[tokio::test]
    async fn test_link_header_alternates_and_target_status() {
        let h = Harness::new();
        h.repository.record(ProjectId(1), "https://e.com/de", 404);
        let page = PageContext::builder(ProjectId(1), "https://e.com/en", 200)
            .content_type("text/html")
            .html("<html></html>")
            .header(
                "Link",
                r#"<https://e.com/en>; rel="alternate"; hreflang="en", <https://e.com/de>; rel="alternate"; hreflang="de""#,
            )
            .build();
        let findings = h.run(&HreflangTask, &page).await;
        let error = findings
            .iter()
            .find(|f| f.code == "hreflang_target_error")
            .expect("404 alternate reported");
        assert_eq!(error.field("status"), Some(&json!(404)));
        assert_eq!(h.state.hreflang_of(&normalize("https://e.com/en")).len(), 2);
    }

    #[test]
    fn test_language_tags() {
        for ok in ["en", "EN-us", "x-default", "zh-Hant-TW", "es-419", "fil"] {
            assert!(valid_language(ok), "{} should be valid", ok);
        }
        for bad in ["english", "en_US", "", "e", "en-"] {
            assert!(!valid_language(bad), "{} should be invalid", bad);
        }
    }
}
