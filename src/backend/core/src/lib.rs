#![allow(clippy::result_large_err)]
//! # Atlas Core
//!
//! Ownership-scoped aggregation of CRISPR experiment data.
//!
//! ## Architecture
//!
//! - **Model**: experiments, sequences, guide candidates and off-target sites
//! - **Store**: relational read interface with PostgreSQL and in-memory backends
//! - **Aggregation**: resolver, per-level loaders, bounded sibling fan-out and
//!   arena-based tree assembly
//! - **API**: axum routes for the three aggregation shapes and experiment listing
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod aggregation;
pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod telemetry;

pub use error::{AtlasError, ErrorCode, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::aggregation::{
        AggregationConfig, ExperimentAggregator, ExperimentDetail, ExperimentView, ExperimentWithSequences,
        GuideDetail, ListExperiments, SequenceDetail, Shape,
    };
    pub use crate::error::{AtlasError, ErrorCode, Result};
    pub use crate::model::{
        Experiment, ExperimentId, ExperimentStatus, GuideCandidate, GuideId, OffTargetId, OffTargetSite,
        PrincipalId, Sequence, SequenceId, Strand,
    };
    pub use crate::store::{InMemoryStore, PostgresStore, ReadStore};
}
