//! Domain model: identifiers and the four entity kinds of an experiment tree.
//!
//! ```text
//! Experiment ─┬─ Sequence ─┬─ GuideCandidate ─┬─ OffTargetSite
//!             │            │                  └─ ...
//!             │            └─ ...
//!             └─ ...
//! ```
//!
//! Entities are read-only here; write paths live elsewhere.

mod entities;
mod ids;

pub use entities::{Experiment, ExperimentStatus, GuideCandidate, OffTargetSite, Sequence, Strand};
pub use ids::{ExperimentId, GuideId, OffTargetId, PrincipalId, SequenceId};
