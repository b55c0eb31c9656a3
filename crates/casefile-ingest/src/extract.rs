//! Heuristic entity extraction.
//!
//! Runs the regex recognizers in [`entities`], resolves overlapping spans,
//! caps the number of distinct entities per document, and attaches a
//! context snippet to every occurrence.

pub mod entities;

use std::collections::HashSet;

use serde::Serialize;

use casefile_core::AnalysisConfig;
use casefile_store::{EntityType, NewMention};
use entities::{normalize_whitespace, Span};

/// Extraction limits.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Distinct (name, type) pairs kept per document.
    pub max_entities: usize,
    /// Characters of context on each side of a mention.
    pub context_radius: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_entities: 200,
            context_radius: 80,
        }
    }
}

impl From<&AnalysisConfig> for ExtractOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            max_entities: config.max_entities_per_extraction,
            context_radius: config.context_radius,
        }
    }
}

/// One occurrence of an entity in a text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedMention {
    pub name: String,
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
    pub context: String,
}

impl From<ExtractedMention> for NewMention {
    fn from(m: ExtractedMention) -> Self {
        NewMention {
            name: m.name,
            entity_type: m.entity_type,
            context: m.context,
        }
    }
}

/// Extract entity mentions in text order.
///
/// Overlapping spans are resolved by recognizer precedence: honorific
/// names, organizations, dates, amounts, locations, then bare capitalized
/// names.
pub fn extract_mentions(text: &str, options: ExtractOptions) -> Vec<ExtractedMention> {
    let persons = entities::find_persons(text);
    let (titled, bare): (Vec<Span>, Vec<Span>) = persons
        .into_iter()
        .partition(|s| is_titled(text, s.start));

    // "wrote to Alice Smith" is not a place when Alice Smith is named
    // elsewhere without a preposition.
    let locations = entities::find_locations(text);
    let person_names: HashSet<&str> = titled
        .iter()
        .chain(bare.iter().filter(|p| {
            !locations
                .iter()
                .any(|l| p.start < l.end && l.start < p.end)
        }))
        .map(|p| p.name.as_str())
        .collect();
    let locations: Vec<Span> = locations
        .into_iter()
        .filter(|l| !person_names.contains(l.name.as_str()))
        .collect();

    let ranked = [
        titled,
        entities::find_organizations(text),
        entities::find_dates(text),
        entities::find_amounts(text),
        locations,
        bare,
    ];

    let mut accepted: Vec<Span> = Vec::new();
    for span in ranked.into_iter().flatten() {
        if span.name.is_empty() {
            continue;
        }
        if accepted.iter().any(|a| span.start < a.end && a.start < span.end) {
            continue;
        }
        accepted.push(span);
    }
    accepted.sort_by_key(|s| s.start);

    let mut kept: HashSet<(String, EntityType)> = HashSet::new();
    let mut mentions = Vec::new();
    for span in accepted {
        let key = (span.name.clone(), span.entity_type.clone());
        if !kept.contains(&key) {
            if kept.len() >= options.max_entities {
                continue;
            }
            kept.insert(key);
        }
        mentions.push(ExtractedMention {
            context: context_snippet(text, span.start, span.end, options.context_radius),
            name: span.name,
            entity_type: span.entity_type,
            start: span.start,
            end: span.end,
        });
    }
    mentions
}

/// Whether the span is preceded by an honorific such as "Dr." or "Mr ".
fn is_titled(text: &str, start: usize) -> bool {
    let before = text[..start].trim_end();
    let word = before
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or("")
        .trim_end_matches('.');
    matches!(
        word,
        "Mr" | "Mrs" | "Ms" | "Miss" | "Dr" | "Prof" | "Sen" | "Rep" | "Gov" | "Judge" | "Sir" | "Lady"
    )
}

/// Text around `[start, end)` widened by `radius` bytes, snapped outward to
/// char boundaries, whitespace collapsed.
pub fn context_snippet(text: &str, start: usize, end: usize, radius: usize) -> String {
    let mut lo = start.saturating_sub(radius);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = end.saturating_add(radius).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    normalize_whitespace(&text[lo..hi])
}
