//! JSON-LD structured data checks and site-wide NAP consistency.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use super::{AnalysisTask, TaskContext, TaskFilter};
use crate::config::PRIORITY_STRUCTURED_DATA;
use crate::findings::Severity;
use crate::page::html::{self, JsonLdBlock};
use crate::relationships::NapRecord;

const KEY: &str = "structured_data";

/// schema.org types carrying a business identity.
const BUSINESS_TYPES: &[&str] = &[
    "Organization",
    "Corporation",
    "LocalBusiness",
    "Restaurant",
    "Store",
    "Hotel",
    "Dentist",
    "MedicalClinic",
    "ProfessionalService",
    "LegalService",
    "AutoDealer",
];

/// Validates JSON-LD blocks and compares business NAP data across the site.
#[derive(Debug, Default)]
pub struct StructuredDataTask;

/// A JSON-LD entity together with whether a `@context` applies to it.
struct Entity<'a> {
    object: &'a Map<String, Value>,
    has_context: bool,
}

/// Flattens top-level arrays and `@graph` containers into entities.
fn entities<'v>(value: &'v Value, inherited_context: bool, out: &mut Vec<Entity<'v>>) {
    match value {
        Value::Array(items) => {
            for item in items {
                entities(item, inherited_context, out);
            }
        }
        Value::Object(object) => {
            let has_context = inherited_context || object.contains_key("@context");
            match object.get("@graph") {
                Some(graph) => entities(graph, has_context, out),
                None => out.push(Entity {
                    object,
                    has_context,
                }),
            }
        }
        _ => {}
    }
}

fn types(object: &Map<String, Value>) -> Vec<&str> {
    match object.get("@type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn is_business(types: &[&str]) -> bool {
    types.iter().any(|t| {
        let t = t.rsplit('/').next().unwrap_or(*t);
        BUSINESS_TYPES.contains(&t) || t.ends_with("Business")
    })
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn address(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(postal) => {
            let parts: Vec<String> = [
                "streetAddress",
                "addressLocality",
                "addressRegion",
                "postalCode",
                "addressCountry",
            ]
            .iter()
            .filter_map(|field| match postal.get(*field) {
                Some(Value::Object(country)) => text(country.get("name")),
                other => text(other),
            })
            .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Array(items) => address(items.first()),
        _ => None,
    }
}

fn nap(object: &Map<String, Value>) -> NapRecord {
    NapRecord {
        name: text(object.get("name")),
        address: address(object.get("address")),
        phone: text(object.get("telephone")),
    }
}

/// Comparison form: lowercase, single spaces, no punctuation; phones keep digits only.
fn comparable(field: &str, value: &str) -> String {
    if field == "telephone" {
        return value.chars().filter(char::is_ascii_digit).collect();
    }
    value
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == ',' || c == '.')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn nap_differences(reference: &NapRecord, found: &NapRecord) -> Vec<(&'static str, String, String)> {
    let fields = [
        ("name", &reference.name, &found.name),
        ("address", &reference.address, &found.address),
        ("telephone", &reference.phone, &found.phone),
    ];
    fields
        .into_iter()
        .filter_map(|(field, expected, actual)| {
            let (expected, actual) = (expected.as_ref()?, actual.as_ref()?);
            (comparable(field, expected) != comparable(field, actual))
                .then(|| (field, expected.clone(), actual.clone()))
        })
        .collect()
}

#[async_trait]
impl AnalysisTask for StructuredDataTask {
    fn key(&self) -> &str {
        KEY
    }

    fn display_name(&self) -> &str {
        "Structured data"
    }

    fn priority(&self) -> i32 {
        PRIORITY_STRUCTURED_DATA
    }

    fn filter(&self) -> TaskFilter {
        TaskFilter::HTML_SUCCESS
    }

    async fn run(&self, ctx: &mut TaskContext<'_>, _cancel: &CancellationToken) -> anyhow::Result<()> {
        let page = ctx.page;
        let state = ctx.relationships;
        let blocks = page.html().map(html::extract_json_ld).unwrap_or_default();

        for (index, block) in blocks.iter().enumerate() {
            let value = match block {
                JsonLdBlock::Parsed(value) => value,
                JsonLdBlock::Malformed(error) => {
                    ctx.report(
                        &format!("parse_error|{}", error),
                        Severity::Error,
                        "json_ld_parse_error",
                        format!("JSON-LD block {} does not parse: {}", index + 1, error),
                        json!({ "block": index + 1, "error": error }),
                    );
                    continue;
                }
            };

            let mut found = Vec::new();
            entities(value, false, &mut found);
            for entity in found {
                let entity_types = types(entity.object);
                let label = entity_types.first().copied().unwrap_or("entity").to_string();
                if !entity.has_context {
                    ctx.report(
                        &format!("missing_context|{}", label),
                        Severity::Warning,
                        "json_ld_missing_context",
                        format!("JSON-LD {} has no @context", label),
                        json!({ "block": index + 1 }),
                    );
                }
                if entity_types.is_empty() {
                    ctx.report(
                        "missing_type",
                        Severity::Warning,
                        "json_ld_missing_type",
                        "JSON-LD entity has no @type",
                        json!({ "block": index + 1 }),
                    );
                    continue;
                }
                if !is_business(&entity_types) {
                    continue;
                }

                let record = nap(entity.object);
                if !record.is_complete() {
                    let missing = record.missing_fields();
                    ctx.report(
                        &format!("nap_incomplete|{}", label),
                        Severity::Warning,
                        "nap_incomplete",
                        format!("{} is missing {}", label, missing.join(", ")),
                        json!({ "type": label, "missing": missing }),
                    );
                    continue;
                }

                let reference = state.nap_reference_or_init(record.clone());
                for (field, expected, actual) in nap_differences(reference, &record) {
                    ctx.report(
                        &format!("nap_inconsistent|{}|{}", field, actual),
                        Severity::Warning,
                        "nap_inconsistent",
                        format!(
                            "{} '{}' differs from '{}' used elsewhere on the site",
                            field, actual, expected
                        ),
                        json!({ "field": field, "expected": expected, "found": actual }),
                    );
                }
            }
        }
        Ok(())
    }
}
