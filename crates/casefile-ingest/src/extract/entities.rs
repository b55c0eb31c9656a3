//! Regex entity recognizers: persons, organizations, locations, dates, amounts.
//!
//! These are surface heuristics. Each recognizer returns raw spans; the
//! caller resolves overlaps and caps the distinct entity count.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use casefile_store::EntityType;

/// A recognized span in the source text (byte offsets).
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub name: String,
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
}

static HONORIFIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Mr|Mrs|Ms|Miss|Dr|Prof|Sen|Rep|Gov|Judge|Sir|Lady)\.?\s+([A-Z][a-z]+(?:\s+[A-Z]\.)?(?:\s+[A-Z][a-z]+){0,2})")
        .expect("valid honorific regex")
});

static CAPITALIZED_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z]\.)?(?:\s+[A-Z][a-z]+){1,2}\b").expect("valid name regex")
});

static ORG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b((?:[A-Z][A-Za-z&'\-]*\s+){0,3}[A-Z][A-Za-z&'\-]*)\s+(Inc\.?|Corp\.?|Corporation|LLC|L\.L\.C\.|Ltd\.?|Foundation|Bank|Holdings|Group|Trust|Partners)(?:\W|$)")
        .expect("valid organization regex")
});

static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:in|at|from|to|near|via)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").expect("valid location regex")
});

static DATE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2}(?:st|nd|rd|th)?,?\s*\d{4}\b",
        r"\b(?:Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s*\d{4}\b",
        r"\b\d{1,2}\s+(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{4}\b",
        r"\b\d{4}-\d{2}-\d{2}\b",
        r"\b\d{1,2}/\d{1,2}/\d{2,4}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid date regex"))
    .collect()
});

static AMOUNT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\$\s?\d[\d,]*(?:\.\d{1,2})?(?:\s*(?:million|billion|thousand|[MBK])\b)?",
        r"\b\d[\d,]*(?:\.\d{1,2})?\s*(?:USD|EUR|GBP|dollars|euros|pounds)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid amount regex"))
    .collect()
});

/// Capitalized words that start or end a capitalized run without being part
/// of a name.
static NAME_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "The", "This", "That", "These", "Those", "A", "An", "And", "But", "Or", "If", "When",
        "Then", "There", "Here", "We", "They", "He", "She", "It", "I", "You", "Our", "His",
        "Her", "Their", "My", "Dear", "Re", "Fwd", "Subject", "From", "To", "Cc", "Sent",
        "Date", "Yesterday", "Today", "Tomorrow", "Monday", "Tuesday", "Wednesday", "Thursday",
        "Friday", "Saturday", "Sunday", "January", "February", "March", "April", "May", "June",
        "July", "August", "September", "October", "November", "December", "Page", "Exhibit",
        "Case", "Document", "Flight", "Account", "Please", "Thanks", "Regards", "Mr", "Mrs",
        "Ms", "Dr", "Prof", "United", "States", "New", "North", "South", "East", "West",
    ]
    .into_iter()
    .collect()
});

/// Words that cannot be a location after a preposition.
static LOCATION_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "The", "This", "That", "A", "An", "Mr", "Mrs", "Ms", "Dr", "Monday", "Tuesday",
        "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "January", "February", "March",
        "April", "May", "June", "July", "August", "September", "October", "November",
        "December", "Page", "Exhibit", "Account", "Re", "All", "Him", "Her", "Them",
    ]
    .into_iter()
    .collect()
});

pub fn find_persons(text: &str) -> Vec<Span> {
    let mut spans: Vec<Span> = HONORIFIC_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| span(m.as_str(), EntityType::Person, m.start(), m.end()))
        .collect();

    for m in CAPITALIZED_RUN_RE.find_iter(text) {
        if m.start() == 0 {
            continue;
        }
        let Some(name) = strip_stopwords(m.as_str()) else {
            continue;
        };
        spans.push(span(&name, EntityType::Person, m.start(), m.end()));
    }
    spans
}

pub fn find_organizations(text: &str) -> Vec<Span> {
    ORG_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let head = cap.get(1)?;
            let suffix = cap.get(2)?;
            let head_words: Vec<&str> = head
                .as_str()
                .split_whitespace()
                .skip_while(|w| NAME_STOPWORDS.contains(w))
                .collect();
            if head_words.is_empty() {
                return None;
            }
            let name = format!(
                "{} {}",
                head_words.join(" "),
                suffix.as_str().trim_end_matches('.')
            );
            Some(span(&name, EntityType::Organization, head.start(), suffix.end()))
        })
        .collect()
}

pub fn find_locations(text: &str) -> Vec<Span> {
    LOCATION_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .filter(|m| {
            m.as_str()
                .split_whitespace()
                .next()
                .is_some_and(|w| !LOCATION_STOPWORDS.contains(w))
        })
        .map(|m| span(m.as_str(), EntityType::Location, m.start(), m.end()))
        .collect()
}

pub fn find_dates(text: &str) -> Vec<Span> {
    find_all(text, &DATE_RES, EntityType::Date)
}

pub fn find_amounts(text: &str) -> Vec<Span> {
    find_all(text, &AMOUNT_RES, EntityType::Amount)
}

fn find_all(text: &str, patterns: &[Regex], entity_type: EntityType) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    for re in patterns {
        for m in re.find_iter(text) {
            if spans.iter().any(|s| m.start() < s.end && s.start < m.end()) {
                continue;
            }
            spans.push(span(m.as_str(), entity_type.clone(), m.start(), m.end()));
        }
    }
    spans
}

/// Trim stopwords from both ends of a capitalized run. A name needs at
/// least two words left.
fn strip_stopwords(run: &str) -> Option<String> {
    let words: Vec<&str> = run.split_whitespace().collect();
    let start = words.iter().position(|w| !NAME_STOPWORDS.contains(w))?;
    let end = words.iter().rposition(|w| !NAME_STOPWORDS.contains(w))?;
    let kept = &words[start..=end];
    if kept.len() < 2 || kept.iter().any(|w| NAME_STOPWORDS.contains(w)) {
        return None;
    }
    Some(kept.join(" "))
}

fn span(name: &str, entity_type: EntityType, start: usize, end: usize) -> Span {
    Span {
        name: normalize_whitespace(name),
        entity_type,
        start,
        end,
    }
}

pub(crate) fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
