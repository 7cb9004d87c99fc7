//! Row types for the four levels of an experiment tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{ExperimentId, GuideId, OffTargetId, PrincipalId, SequenceId};
use crate::error::AtlasError;

/// Lifecycle status of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Designing,
    Completed,
    Archived,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Designing => "designing",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentStatus {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "designing" => Ok(Self::Designing),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(AtlasError::validation(format!(
                "Unknown experiment status '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ExperimentStatus {
    type Error = AtlasError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// DNA strand a guide or site sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

impl Strand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "+",
            Self::Reverse => "-",
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strand {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Forward),
            "-" => Ok(Self::Reverse),
            other => Err(AtlasError::validation(format!("Unknown strand '{}'", other))),
        }
    }
}

impl TryFrom<String> for Strand {
    type Error = AtlasError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Root of the tree. Owned by exactly one principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Experiment {
    pub id: ExperimentId,
    pub principal_id: PrincipalId,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub status: ExperimentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Target sequence under an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sequence {
    pub id: SequenceId,
    pub experiment_id: ExperimentId,
    pub name: String,
    pub bases: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Candidate guide RNA designed against a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GuideCandidate {
    pub id: GuideId,
    pub sequence_id: SequenceId,
    pub spacer: String,
    pub pam: String,
    #[sqlx(try_from = "String")]
    pub strand: Strand,
    pub position: i64,
    /// Higher is better.
    pub efficiency_score: f64,
    pub created_at: DateTime<Utc>,
}

/// Predicted off-target binding site of a guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OffTargetSite {
    pub id: OffTargetId,
    pub guide_id: GuideId,
    pub chromosome: String,
    pub position: i64,
    #[sqlx(try_from = "String")]
    pub strand: Strand,
    pub mismatches: i32,
    /// Higher means stronger off-target risk.
    pub binding_score: f64,
}

impl Experiment {
    pub fn new(principal_id: impl Into<PrincipalId>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ExperimentId::new(),
            principal_id: principal_id.into(),
            name: name.into(),
            status: ExperimentStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    pub fn is_owned_by(&self, principal: &PrincipalId) -> bool {
        &self.principal_id == principal
    }
}

impl Sequence {
    pub fn new(experiment_id: ExperimentId, name: impl Into<String>, bases: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SequenceId::new(),
            experiment_id,
            name: name.into(),
            bases: bases.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }
}

impl GuideCandidate {
    pub fn new(sequence_id: SequenceId, spacer: impl Into<String>, efficiency_score: f64) -> Self {
        Self {
            id: GuideId::new(),
            sequence_id,
            spacer: spacer.into(),
            pam: "NGG".to_string(),
            strand: Strand::Forward,
            position: 0,
            efficiency_score,
            created_at: Utc::now(),
        }
    }

    pub fn at(mut self, position: i64, strand: Strand) -> Self {
        self.position = position;
        self.strand = strand;
        self
    }
}

impl OffTargetSite {
    pub fn new(guide_id: GuideId, chromosome: impl Into<String>, binding_score: f64) -> Self {
        Self {
            id: OffTargetId::new(),
            guide_id,
            chromosome: chromosome.into(),
            position: 0,
            strand: Strand::Forward,
            mismatches: 0,
            binding_score,
        }
    }

    pub fn with_mismatches(mut self, mismatches: i32) -> Self {
        self.mismatches = mismatches;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!("Completed".parse::<ExperimentStatus>().unwrap(), ExperimentStatus::Completed);
        assert!("running".parse::<ExperimentStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ExperimentStatus::Designing).unwrap();
        assert_eq!(json, "\"designing\"");
    }

    #[test]
    fn test_strand_roundtrip_text() {
        assert_eq!(Strand::try_from("-".to_string()).unwrap(), Strand::Reverse);
        assert_eq!(serde_json::to_string(&Strand::Forward).unwrap(), "\"+\"");
    }

    #[test]
    fn test_ownership() {
        let exp = Experiment::new("p1", "knockout");
        assert!(exp.is_owned_by(&PrincipalId::from("p1")));
        assert!(!exp.is_owned_by(&PrincipalId::from("p2")));
    }
}
