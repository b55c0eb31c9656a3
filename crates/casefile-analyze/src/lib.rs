//! Casefile Analyze — derived analyses over the store: entity co-occurrence,
//! relationship network projection, timeline building, and event clustering.

pub mod cluster;
pub mod cooccurrence;
pub mod network;
pub mod timeline;

pub use cluster::{severity_for, ClusterOptions, ClusterReport, Clusterer, DatedEvent};
pub use cooccurrence::{CoOccurrenceAggregator, CoOccurrenceOptions, CoOccurrenceReport};
pub use network::{Network, NetworkProjector, NetworkQuery};
pub use timeline::{parse_event_date, TimelineBuilder, TimelineReport};
