//! Tree assembly.
//!
//! Loads produce flat, individually ordered lists. [`TreeArena`] keeps them
//! keyed by parent identifier and only builds the nested view in
//! [`TreeArena::into_detail`], once every level has been loaded.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{AtlasError, Result};
use crate::model::{Experiment, GuideCandidate, GuideId, OffTargetSite, Sequence, SequenceId};

/// An experiment with its sequences, no guides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentWithSequences {
    #[serde(flatten)]
    pub experiment: Experiment,
    pub sequences: Vec<Sequence>,
}

/// Fully expanded experiment tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDetail {
    #[serde(flatten)]
    pub experiment: Experiment,
    pub sequences: Vec<SequenceDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDetail {
    #[serde(flatten)]
    pub sequence: Sequence,
    pub guides: Vec<GuideDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideDetail {
    #[serde(flatten)]
    pub guide: GuideCandidate,
    pub off_targets: Vec<OffTargetSite>,
}

impl ExperimentDetail {
    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    pub fn guide_count(&self) -> usize {
        self.sequences.iter().map(|s| s.guides.len()).sum()
    }

    /// Number of leaves in the tree.
    pub fn off_target_count(&self) -> usize {
        self.sequences
            .iter()
            .flat_map(|s| &s.guides)
            .map(|g| g.off_targets.len())
            .sum()
    }
}

/// Flat storage for a tree under construction.
///
/// Each child list is written exactly once, under its parent identifier.
/// Parent lookups go through id sets, so grafting is linear in the tree size.
#[derive(Debug)]
pub struct TreeArena {
    experiment: Experiment,
    sequences: Vec<Sequence>,
    sequence_index: HashSet<SequenceId>,
    guides: HashMap<SequenceId, Vec<GuideCandidate>>,
    guide_index: HashSet<GuideId>,
    off_targets: HashMap<GuideId, Vec<OffTargetSite>>,
}

impl TreeArena {
    pub fn new(experiment: Experiment, sequences: Vec<Sequence>) -> Self {
        let sequence_index = sequences.iter().map(|s| s.id).collect();
        Self {
            experiment,
            sequences,
            sequence_index,
            guides: HashMap::new(),
            guide_index: HashSet::new(),
            off_targets: HashMap::new(),
        }
    }

    /// Sequence ids in display order.
    pub fn sequence_ids(&self) -> Vec<SequenceId> {
        self.sequences.iter().map(|s| s.id).collect()
    }

    /// Guide ids of every grafted sequence, in display order.
    pub fn guide_ids(&self) -> Vec<GuideId> {
        self.sequences
            .iter()
            .filter_map(|s| self.guides.get(&s.id))
            .flatten()
            .map(|g| g.id)
            .collect()
    }

    pub fn graft_guides(&mut self, sequence_id: SequenceId, guides: Vec<GuideCandidate>) -> Result<()> {
        if !self.sequence_index.contains(&sequence_id) {
            return Err(AtlasError::internal(format!(
                "guides grafted under unknown sequence {}",
                sequence_id
            )));
        }
        if self.guides.contains_key(&sequence_id) {
            return Err(AtlasError::internal(format!(
                "guides for sequence {} grafted twice",
                sequence_id
            )));
        }
        self.guide_index.extend(guides.iter().map(|g| g.id));
        self.guides.insert(sequence_id, guides);
        Ok(())
    }

    pub fn graft_off_targets(&mut self, guide_id: GuideId, sites: Vec<OffTargetSite>) -> Result<()> {
        if !self.guide_index.contains(&guide_id) {
            return Err(AtlasError::internal(format!(
                "off-targets grafted under unknown guide {}",
                guide_id
            )));
        }
        if self.off_targets.insert(guide_id, sites).is_some() {
            return Err(AtlasError::internal(format!(
                "off-targets for guide {} grafted twice",
                guide_id
            )));
        }
        Ok(())
    }

    /// Materialize the nested view. Parents without grafted children get
    /// empty lists.
    pub fn into_detail(mut self) -> ExperimentDetail {
        let sequences = self
            .sequences
            .into_iter()
            .map(|sequence| {
                let guides = self
                    .guides
                    .remove(&sequence.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|guide| {
                        let off_targets = self.off_targets.remove(&guide.id).unwrap_or_default();
                        GuideDetail { guide, off_targets }
                    })
                    .collect();
                SequenceDetail { sequence, guides }
            })
            .collect();

        ExperimentDetail {
            experiment: self.experiment,
            sequences,
        }
    }
}
