//! Timeline building: flights, emails, and transactions normalized into
//! dated events.

use std::time::Instant;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use casefile_core::Result;
use casefile_store::{
    Email, EventType, Flight, NewCluster, NewTimelineEvent, SqliteStore, Transaction,
};

use crate::cluster::{ClusterReport, Clusterer};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b. %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
];

/// Parse a source date in any supported format. Times and offsets are
/// dropped; the calendar date as written is kept.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        })
}

/// Map an email score (0–10) onto the 0–5 suspicion scale.
pub fn email_level(score: f64) -> i64 {
    if !score.is_finite() {
        return 0;
    }
    ((score / 2.0).round() as i64).clamp(0, 5)
}

fn clamp_level(level: i64) -> i64 {
    level.clamp(0, 5)
}

/// Built vs. dropped (missing or unparseable date) counts for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    pub built: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TimelineReport {
    pub flights: SourceCount,
    pub emails: SourceCount,
    pub transactions: SourceCount,
    pub events: usize,
    pub suspicious_events: usize,
    pub clusters: ClusterReport,
    pub duration_ms: u64,
}

impl TimelineReport {
    pub fn dropped(&self) -> usize {
        self.flights.dropped + self.emails.dropped + self.transactions.dropped
    }
}

/// Turns source records into timeline events.
#[derive(Debug, Default)]
pub struct TimelineBuilder;

impl TimelineBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build events ordered by (date, type, source id).
    pub fn build(
        &self,
        flights: &[Flight],
        emails: &[Email],
        transactions: &[Transaction],
    ) -> (Vec<NewTimelineEvent>, TimelineReport) {
        let mut report = TimelineReport::default();
        let mut events = Vec::with_capacity(flights.len() + emails.len() + transactions.len());

        for f in flights {
            tally(&mut report.flights, flight_event(f), &mut events);
        }
        for e in emails {
            tally(&mut report.emails, email_event(e), &mut events);
        }
        for t in transactions {
            tally(&mut report.transactions, transaction_event(t), &mut events);
        }

        events.sort_by(|a, b| {
            (a.event_date, a.event_type, a.source_id).cmp(&(b.event_date, b.event_type, b.source_id))
        });
        report.events = events.len();
        report.suspicious_events = events.iter().filter(|e| e.is_suspicious).count();
        (events, report)
    }

    /// Rebuild the timeline and its clusters from the source tables. Both
    /// are replaced in one transaction.
    pub fn rebuild(&self, store: &SqliteStore, clusterer: &Clusterer) -> Result<TimelineReport> {
        let start = Instant::now();
        let flights = store.list_flights()?;
        let emails = store.list_emails()?;
        let transactions = store.list_transactions()?;

        let (events, mut report) = self.build(&flights, &emails, &transactions);
        let (clusters, cluster_report): (Vec<NewCluster>, ClusterReport) = clusterer.cluster(&events);
        store.replace_timeline(&events, &clusters)?;

        report.clusters = cluster_report;
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Timeline rebuilt: {} events ({} suspicious), {} dropped dates, {} clusters ({}ms)",
            report.events,
            report.suspicious_events,
            report.dropped(),
            report.clusters.clusters_emitted,
            report.duration_ms
        );
        Ok(report)
    }
}

fn tally(count: &mut SourceCount, event: Option<NewTimelineEvent>, events: &mut Vec<NewTimelineEvent>) {
    match event {
        Some(e) => {
            count.built += 1;
            events.push(e);
        }
        None => count.dropped += 1,
    }
}

fn non_empty(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim().to_string();
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

fn flight_event(f: &Flight) -> Option<NewTimelineEvent> {
    let r = &f.record;
    let Some(date) = r.flight_date.as_deref().and_then(parse_event_date) else {
        debug!("Flight {} dropped: unparseable date {:?}", f.id, r.flight_date);
        return None;
    };
    let level = clamp_level(r.suspicion_level);
    let mut description = format!("{} passenger(s)", r.passengers.len());
    if let Some(aircraft) = r.aircraft.as_deref().filter(|a| !a.is_empty()) {
        description.push_str(&format!(" aboard {}", aircraft));
    }
    Some(NewTimelineEvent {
        event_date: date,
        event_type: EventType::Flight,
        subtype: "flight".into(),
        title: format!("Flight {} to {}", or_unknown(&r.origin), or_unknown(&r.destination)),
        description,
        entities: non_empty(r.passengers.iter().cloned()),
        is_suspicious: level >= 1,
        suspicion_level: level,
        source_id: f.id,
    })
}

fn email_event(e: &Email) -> Option<NewTimelineEvent> {
    let r = &e.record;
    let Some(date) = r.sent_date.as_deref().and_then(parse_event_date) else {
        debug!("Email {} dropped: unparseable date {:?}", e.id, r.sent_date);
        return None;
    };
    let level = email_level(r.suspicion_score);
    let subject = r.subject.trim();
    Some(NewTimelineEvent {
        event_date: date,
        event_type: EventType::Email,
        subtype: "email".into(),
        title: if subject.is_empty() {
            "(no subject)".into()
        } else {
            subject.to_string()
        },
        description: format!("From {} to {}", or_unknown(&r.sender), r.recipients.join(", ")),
        entities: non_empty(std::iter::once(r.sender.clone()).chain(r.recipients.iter().cloned())),
        is_suspicious: level >= 1,
        suspicion_level: level,
        source_id: e.id,
    })
}

fn transaction_event(t: &Transaction) -> Option<NewTimelineEvent> {
    let r = &t.record;
    let Some(date) = r.transaction_date.as_deref().and_then(parse_event_date) else {
        debug!("Transaction {} dropped: unparseable date {:?}", t.id, r.transaction_date);
        return None;
    };
    let level = clamp_level(r.suspicion_level);
    Some(NewTimelineEvent {
        event_date: date,
        event_type: EventType::Transaction,
        subtype: "transfer".into(),
        title: format!(
            "{:.2} {} from {} to {}",
            r.amount,
            r.currency,
            or_unknown(&r.from_party),
            or_unknown(&r.to_party)
        ),
        description: r.description.clone(),
        entities: non_empty([r.from_party.clone(), r.to_party.clone()]),
        is_suspicious: level >= 1,
        suspicion_level: level,
        source_id: t.id,
    })
}

fn or_unknown(s: &str) -> &str {
    if s.trim().is_empty() {
        "unknown"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_store::{NewEmail, NewFlight, NewTransaction};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_formats() {
        let expected = d(2002, 3, 14);
        for raw in [
            "2002-03-14",
            "2002-03-14 09:30:00",
            "2002-03-14T09:30:00",
            "2002-03-14T09:30:00-05:00",
            "Thu, 14 Mar 2002 09:30:00 -0500",
            "03/14/2002",
            "March 14, 2002",
            "Mar 14, 2002",
            "14 March 2002",
            "  2002/03/14 ",
        ] {
            assert_eq!(parse_event_date(raw), Some(expected), "{}", raw);
        }
        assert_eq!(parse_event_date(""), None);
        assert_eq!(parse_event_date("sometime in spring"), None);
        assert_eq!(parse_event_date("2002-02-30"), None);
    }

    #[test]
    fn test_email_level() {
        assert_eq!(email_level(0.0), 0);
        assert_eq!(email_level(0.9), 0);
        assert_eq!(email_level(1.0), 1);
        assert_eq!(email_level(5.0), 3);
        assert_eq!(email_level(10.0), 5);
        assert_eq!(email_level(42.0), 5);
        assert_eq!(email_level(-3.0), 0);
        assert_eq!(email_level(f64::NAN), 0);
    }

    #[test]
    fn test_build_orders_and_counts_drops() {
        let flights = vec![
            Flight {
                id: 1,
                record: NewFlight {
                    flight_date: Some("01/05/2020".into()),
                    origin: "TEB".into(),
                    destination: "PBI".into(),
                    passengers: vec!["Alice".into(), "Bob".into(), "Alice".into()],
                    suspicion_level: 9,
                    ..Default::default()
                },
            },
            Flight {
                id: 2,
                record: NewFlight {
                    flight_date: Some("unknown".into()),
                    ..Default::default()
                },
            },
        ];
        let emails = vec![Email {
            id: 7,
            record: NewEmail {
                sent_date: Some("2020-01-05".into()),
                sender: "carol@example.com".into(),
                recipients: vec!["alice@example.com".into()],
                subject: "".into(),
                doc_id: None,
                suspicion_score: 0.4,
            },
        }];
        let transactions = vec![
            Transaction {
                id: 3,
                record: NewTransaction {
                    transaction_date: Some("January 2, 2020".into()),
                    amount: 1500.0,
                    currency: "USD".into(),
                    from_party: "Acme Holdings".into(),
                    to_party: "Bob".into(),
                    suspicion_level: 2,
                    ..Default::default()
                },
            },
            Transaction {
                id: 4,
                record: NewTransaction::default(),
            },
        ];

        let (events, report) = TimelineBuilder::new().build(&flights, &emails, &transactions);
        assert_eq!(report.flights, SourceCount { built: 1, dropped: 1 });
        assert_eq!(report.emails, SourceCount { built: 1, dropped: 0 });
        assert_eq!(report.transactions, SourceCount { built: 1, dropped: 1 });
        assert_eq!(report.dropped(), 2);
        assert_eq!(report.events, 3);

        let order: Vec<(EventType, i64)> = events.iter().map(|e| (e.event_type, e.source_id)).collect();
        assert_eq!(
            order,
            vec![(EventType::Transaction, 3), (EventType::Flight, 1), (EventType::Email, 7)]
        );

        let flight = &events[1];
        assert_eq!(flight.suspicion_level, 5);
        assert!(flight.is_suspicious);
        assert_eq!(flight.entities, vec!["Alice", "Bob"]);

        let email = &events[2];
        assert_eq!(email.title, "(no subject)");
        assert!(!email.is_suspicious);
        assert_eq!(email.entities, vec!["carol@example.com", "alice@example.com"]);
        assert_eq!(report.suspicious_events, 2);
    }
}
