//! Greedy day-window clustering of timeline events.
//!
//! Events are walked in date order. With no open cluster, the event opens
//! one. Otherwise the event joins the open cluster when it lies within
//! `max_days` of the reference date: the cluster's first event in anchored
//! mode, the previous event in rolling mode. An event outside the window
//! closes the open cluster (kept only with at least `min_events` members)
//! and opens a new one. The open cluster is flushed the same way at the end.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use casefile_core::{AnalysisConfig, ClusterWindow, Result};
use casefile_store::{EventType, NewCluster, NewTimelineEvent, Severity, SqliteStore, TimelineEvent};

/// Entities listed per cluster.
const TOP_ENTITIES: usize = 5;

/// What the clusterer needs from an event.
pub trait DatedEvent {
    fn date(&self) -> NaiveDate;
    fn suspicion_level(&self) -> i64;
    fn event_type(&self) -> EventType;
    fn entities(&self) -> &[String];
}

impl DatedEvent for NewTimelineEvent {
    fn date(&self) -> NaiveDate {
        self.event_date
    }
    fn suspicion_level(&self) -> i64 {
        self.suspicion_level
    }
    fn event_type(&self) -> EventType {
        self.event_type
    }
    fn entities(&self) -> &[String] {
        &self.entities
    }
}

impl DatedEvent for TimelineEvent {
    fn date(&self) -> NaiveDate {
        self.event.event_date
    }
    fn suspicion_level(&self) -> i64 {
        self.event.suspicion_level
    }
    fn event_type(&self) -> EventType {
        self.event.event_type
    }
    fn entities(&self) -> &[String] {
        &self.event.entities
    }
}

/// Average suspicion ≥ 4 is HIGH, ≥ 2 MEDIUM, otherwise LOW.
pub fn severity_for(avg_suspicion: f64) -> Severity {
    if avg_suspicion >= 4.0 {
        Severity::High
    } else if avg_suspicion >= 2.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterOptions {
    pub max_days: i64,
    pub min_events: usize,
    pub window: ClusterWindow,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            max_days: 7,
            min_events: 3,
            window: ClusterWindow::Anchored,
        }
    }
}

impl From<&AnalysisConfig> for ClusterOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            max_days: config.cluster_max_days,
            min_events: config.cluster_min_events,
            window: config.cluster_window,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterReport {
    pub events: usize,
    pub clusters_emitted: usize,
    /// Windows closed with fewer than `min_events` members.
    pub clusters_discarded: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub duration_ms: u64,
}

pub struct Clusterer {
    options: ClusterOptions,
}

impl Clusterer {
    pub fn new(options: ClusterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Cluster `events`. Member indices in the result refer to positions in
    /// `events`; the input need not be sorted.
    pub fn cluster<E: DatedEvent>(&self, events: &[E]) -> (Vec<NewCluster>, ClusterReport) {
        let mut report = ClusterReport {
            events: events.len(),
            ..Default::default()
        };

        let mut order: Vec<usize> = (0..events.len()).collect();
        order.sort_by_key(|&i| (events[i].date(), i));

        let mut clusters = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        for &i in &order {
            let reference = match self.options.window {
                ClusterWindow::Anchored => open.first(),
                ClusterWindow::Rolling => open.last(),
            }
            .map(|&j| events[j].date());
            if let Some(reference) = reference {
                if (events[i].date() - reference).num_days() > self.options.max_days {
                    self.close(events, std::mem::take(&mut open), &mut clusters, &mut report);
                }
            }
            open.push(i);
        }
        self.close(events, open, &mut clusters, &mut report);

        (clusters, report)
    }

    fn close<E: DatedEvent>(
        &self,
        events: &[E],
        members: Vec<usize>,
        clusters: &mut Vec<NewCluster>,
        report: &mut ClusterReport,
    ) {
        if members.is_empty() {
            return;
        }
        if members.len() < self.options.min_events {
            report.clusters_discarded += 1;
            return;
        }
        let cluster = summarize(events, members);
        match cluster.severity {
            Severity::High => report.high += 1,
            Severity::Medium => report.medium += 1,
            Severity::Low => report.low += 1,
        }
        report.clusters_emitted += 1;
        clusters.push(cluster);
    }

    /// Recluster the stored timeline without rebuilding it.
    pub fn rebuild(&self, store: &SqliteStore) -> Result<ClusterReport> {
        let start = Instant::now();
        let events = store.list_timeline_events(&Default::default())?;
        let (clusters, mut report) = self.cluster(&events);
        store.replace_clusters(&events, &clusters)?;
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Clusters rebuilt: {} from {} events ({} high, {} medium, {} low; {} discarded) ({}ms)",
            report.clusters_emitted,
            report.events,
            report.high,
            report.medium,
            report.low,
            report.clusters_discarded,
            report.duration_ms
        );
        Ok(report)
    }
}

fn summarize<E: DatedEvent>(events: &[E], members: Vec<usize>) -> NewCluster {
    let dates = members.iter().map(|&i| events[i].date());
    let start_date = dates.clone().min().unwrap_or_default();
    let end_date = dates.max().unwrap_or_default();

    let total: i64 = members.iter().map(|&i| events[i].suspicion_level()).sum();
    let avg_suspicion = total as f64 / members.len() as f64;

    let mut type_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut entity_counts: HashMap<&str, usize> = HashMap::new();
    for &i in &members {
        *type_counts
            .entry(events[i].event_type().as_str().to_string())
            .or_default() += 1;
        for name in events[i].entities() {
            *entity_counts.entry(name.as_str()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = entity_counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let top_entities = ranked
        .into_iter()
        .take(TOP_ENTITIES)
        .map(|(name, _)| name.to_string())
        .collect();

    NewCluster {
        start_date,
        end_date,
        avg_suspicion,
        severity: severity_for(avg_suspicion),
        member_indices: members,
        type_counts,
        top_entities,
    }
}
