//! Casefile Core — configuration, data paths, error type.

pub mod config;
pub mod error;

pub use config::{AnalysisConfig, CasefileConfig, ClusterWindow, DataPaths};
pub use error::{Error, Result};
