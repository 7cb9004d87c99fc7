//! Hierarchical experiment aggregation.
//!
//! An experiment tree is rebuilt from independent reads:
//!
//! 1. [`resolver`] resolves the experiment scoped to the requesting principal.
//!    Absence stops everything.
//! 2. [`sequence_loader`] loads the experiment's sequences.
//! 3. [`guide_loader`] loads guides for every sequence, siblings in parallel.
//! 4. [`off_target_loader`] loads off-targets for every guide, siblings in parallel.
//!
//! Each level is joined before the next one starts. Any fault aborts the
//! whole request; there is no partial tree.

pub mod fanout;
pub mod guide_loader;
pub mod off_target_loader;
pub mod resolver;
pub mod sequence_loader;
pub mod tree;

pub use fanout::{FanOutPool, FanOutStats};
pub use tree::{ExperimentDetail, ExperimentWithSequences, GuideDetail, SequenceDetail, TreeArena};

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{AtlasError, Result};
use crate::model::{Experiment, ExperimentId, ExperimentStatus, PrincipalId};
use crate::store::{find_all, FindAll, OrderBy, Predicate, ReadStore};
use crate::telemetry::{AggregationMetrics, AggregationOutcome, OperationTimer};

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregation engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Maximum sibling loads in flight per aggregator
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,

    /// How long a sibling load may wait for a permit held by another request
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Deadline for a whole aggregation; unbounded when unset
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Sequence cap used when the caller passes no limit
    #[serde(default)]
    pub sequence_limit: Option<usize>,

    /// Guides kept per sequence
    #[serde(default)]
    pub guide_limit: Option<usize>,

    /// Off-target sites kept per guide
    #[serde(default)]
    pub off_target_limit: Option<usize>,

    /// Upper bound for any caller-supplied limit
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: usize,

    /// Page size of experiment listings when the caller passes no limit
    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: default_max_concurrent_loads(),
            acquire_timeout: default_acquire_timeout(),
            request_timeout: None,
            sequence_limit: None,
            guide_limit: None,
            off_target_limit: None,
            max_list_limit: default_max_list_limit(),
            default_list_limit: default_list_limit(),
        }
    }
}

fn default_max_concurrent_loads() -> usize { 16 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_max_list_limit() -> usize { 1000 }
fn default_list_limit() -> usize { 50 }

impl AggregationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_loads == 0 {
            return Err(AtlasError::configuration("aggregation.max_concurrent_loads must be at least 1"));
        }
        if self.max_list_limit == 0 {
            return Err(AtlasError::configuration("aggregation.max_list_limit must be at least 1"));
        }
        if self.default_list_limit == 0 || self.default_list_limit > self.max_list_limit {
            return Err(AtlasError::configuration(format!(
                "aggregation.default_list_limit must be between 1 and {}",
                self.max_list_limit
            )));
        }
        for (name, limit) in [
            ("sequence_limit", self.sequence_limit),
            ("guide_limit", self.guide_limit),
            ("off_target_limit", self.off_target_limit),
        ] {
            if limit == Some(0) {
                return Err(AtlasError::configuration(format!("aggregation.{} must be at least 1", name)));
            }
        }
        Ok(())
    }

    /// Resolve a caller limit: zero is rejected, large values are clamped,
    /// `None` falls back to `default`.
    fn effective_limit(&self, requested: Option<usize>, default: Option<usize>) -> Result<Option<usize>> {
        match requested {
            Some(0) => Err(AtlasError::validation("limit must be at least 1")),
            Some(n) => Ok(Some(n.min(self.max_list_limit))),
            None => Ok(default),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request and Result Shapes
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregation depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Experiment only
    #[default]
    Shallow,
    /// Experiment and its sequences
    #[serde(alias = "with_sequences")]
    Sequences,
    /// Experiment, sequences, guides and off-targets
    #[serde(alias = "full_detail")]
    Full,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shallow => "shallow",
            Self::Sequences => "sequences",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shape {
    type Err = AtlasError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "shallow" => Ok(Self::Shallow),
            "sequences" | "with_sequences" => Ok(Self::Sequences),
            "full" | "full_detail" => Ok(Self::Full),
            other => Err(AtlasError::validation(format!(
                "Unknown shape '{}', expected shallow, sequences or full",
                other
            ))),
        }
    }
}

/// Result of [`ExperimentAggregator::fetch`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExperimentView {
    Shallow(Experiment),
    Sequences(ExperimentWithSequences),
    Full(ExperimentDetail),
}

impl ExperimentView {
    pub fn shape(&self) -> Shape {
        match self {
            Self::Shallow(_) => Shape::Shallow,
            Self::Sequences(_) => Shape::Sequences,
            Self::Full(_) => Shape::Full,
        }
    }

    pub fn experiment(&self) -> &Experiment {
        match self {
            Self::Shallow(e) => e,
            Self::Sequences(v) => &v.experiment,
            Self::Full(v) => &v.experiment,
        }
    }
}

/// Filters for [`ExperimentAggregator::list_experiments`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListExperiments {
    pub status: Option<ExperimentStatus>,
    pub limit: Option<usize>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Aggregator
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds ownership-scoped experiment trees over a [`ReadStore`].
pub struct ExperimentAggregator {
    store: Arc<dyn ReadStore>,
    pool: FanOutPool,
    config: AggregationConfig,
}

impl ExperimentAggregator {
    pub fn new(store: Arc<dyn ReadStore>, config: AggregationConfig) -> Self {
        let pool = FanOutPool::new("aggregation", config.max_concurrent_loads.max(1), config.acquire_timeout);
        Self { store, pool, config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn fanout_stats(&self) -> FanOutStats {
        self.pool.stats()
    }

    /// The experiment row alone. Never touches child tables.
    #[instrument(skip(self), fields(experiment_id = %experiment_id, principal = %principal))]
    pub async fn shallow(&self, experiment_id: ExperimentId, principal: &PrincipalId) -> Result<Option<Experiment>> {
        let timer = OperationTimer::start();
        let result = self
            .guarded(resolver::resolve(self.store.as_ref(), experiment_id, principal))
            .await;
        observe(Shape::Shallow, &timer, result)
    }

    /// The experiment and its sequences.
    #[instrument(skip(self), fields(experiment_id = %experiment_id, principal = %principal))]
    pub async fn with_sequences(
        &self,
        experiment_id: ExperimentId,
        principal: &PrincipalId,
        limit: Option<usize>,
    ) -> Result<Option<ExperimentWithSequences>> {
        let timer = OperationTimer::start();
        let result = match self.config.effective_limit(limit, self.config.sequence_limit) {
            Ok(limit) => self.guarded(self.build_with_sequences(experiment_id, principal, limit)).await,
            Err(e) => Err(e),
        };
        observe(Shape::Sequences, &timer, result)
    }

    /// The fully expanded tree.
    #[instrument(skip(self), fields(experiment_id = %experiment_id, principal = %principal))]
    pub async fn full_detail(
        &self,
        experiment_id: ExperimentId,
        principal: &PrincipalId,
        limit: Option<usize>,
    ) -> Result<Option<ExperimentDetail>> {
        let timer = OperationTimer::start();
        let result = match self.config.effective_limit(limit, self.config.sequence_limit) {
            Ok(limit) => self.guarded(self.build_full_detail(experiment_id, principal, limit)).await,
            Err(e) => Err(e),
        };
        observe(Shape::Full, &timer, result)
    }

    /// Dispatch on a runtime [`Shape`].
    pub async fn fetch(
        &self,
        shape: Shape,
        experiment_id: ExperimentId,
        principal: &PrincipalId,
        limit: Option<usize>,
    ) -> Result<Option<ExperimentView>> {
        Ok(match shape {
            Shape::Shallow => self.shallow(experiment_id, principal).await?.map(ExperimentView::Shallow),
            Shape::Sequences => self
                .with_sequences(experiment_id, principal, limit)
                .await?
                .map(ExperimentView::Sequences),
            Shape::Full => self
                .full_detail(experiment_id, principal, limit)
                .await?
                .map(ExperimentView::Full),
        })
    }

    /// [`fetch`](Self::fetch), abandoned as soon as `token` is cancelled.
    pub async fn fetch_with_cancellation(
        &self,
        shape: Shape,
        experiment_id: ExperimentId,
        principal: &PrincipalId,
        limit: Option<usize>,
        token: CancellationToken,
    ) -> Result<Option<ExperimentView>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!(experiment_id = %experiment_id, shape = %shape, "Aggregation cancelled by caller");
                Err(AtlasError::cancelled())
            }
            result = self.fetch(shape, experiment_id, principal, limit) => result,
        }
    }

    /// Experiments owned by `principal`, newest first.
    #[instrument(skip(self), fields(principal = %principal))]
    pub async fn list_experiments(&self, principal: &PrincipalId, filter: ListExperiments) -> Result<Vec<Experiment>> {
        let limit = self
            .config
            .effective_limit(filter.limit, Some(self.config.default_list_limit))?;

        let mut predicate = Predicate::new().eq("principal_id", principal);
        if let Some(status) = filter.status {
            predicate = predicate.eq("status", status);
        }
        let query = FindAll::new(predicate)
            .order_by(OrderBy::desc("created_at"))
            .order_by(OrderBy::asc("id"))
            .limit(limit);

        let mut experiments = self.guarded(find_all::<Experiment>(self.store.as_ref(), &query)).await?;
        experiments.retain(|e| e.is_owned_by(principal));
        experiments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        debug!(count = experiments.len(), "Experiments listed");
        Ok(experiments)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Assembly
    // ─────────────────────────────────────────────────────────────────────────

    async fn build_with_sequences(
        &self,
        experiment_id: ExperimentId,
        principal: &PrincipalId,
        limit: Option<usize>,
    ) -> Result<Option<ExperimentWithSequences>> {
        let store = self.store.as_ref();
        let Some(experiment) = resolver::resolve(store, experiment_id, principal).await? else {
            return Ok(None);
        };
        let sequences = sequence_loader::load_sequences(store, experiment.id, limit).await?;
        Ok(Some(ExperimentWithSequences { experiment, sequences }))
    }

    async fn build_full_detail(
        &self,
        experiment_id: ExperimentId,
        principal: &PrincipalId,
        limit: Option<usize>,
    ) -> Result<Option<ExperimentDetail>> {
        let store = self.store.as_ref();
        let Some(experiment) = resolver::resolve(store, experiment_id, principal).await? else {
            return Ok(None);
        };
        let sequences = sequence_loader::load_sequences(store, experiment.id, limit).await?;
        let mut arena = TreeArena::new(experiment, sequences);

        let guide_limit = self.config.guide_limit;
        let guide_lists = self
            .pool
            .join_all(arena.sequence_ids().into_iter().map(|sequence_id| async move {
                let guides = guide_loader::load_guides(store, sequence_id, guide_limit).await?;
                Ok::<_, AtlasError>((sequence_id, guides))
            }))
            .await?;
        for (sequence_id, guides) in guide_lists {
            arena.graft_guides(sequence_id, guides)?;
        }

        let off_target_limit = self.config.off_target_limit;
        let site_lists = self
            .pool
            .join_all(arena.guide_ids().into_iter().map(|guide_id| async move {
                let sites = off_target_loader::load_off_targets(store, guide_id, off_target_limit).await?;
                Ok::<_, AtlasError>((guide_id, sites))
            }))
            .await?;
        for (guide_id, sites) in site_lists {
            arena.graft_off_targets(guide_id, sites)?;
        }

        Ok(Some(arena.into_detail()))
    }

    /// Apply the configured request deadline, if any.
    async fn guarded<T, Fut>(&self, work: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match self.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(elapsed) => Err(AtlasError::from(elapsed).with_context("limit_ms", limit.as_millis() as u64)),
            },
            None => work.await,
        }
    }
}

fn observe<T>(shape: Shape, timer: &OperationTimer, result: Result<Option<T>>) -> Result<Option<T>> {
    let outcome = match &result {
        Ok(Some(_)) => AggregationOutcome::Found,
        Ok(None) => AggregationOutcome::Absent,
        Err(e) => {
            e.log();
            AggregationOutcome::Failed
        }
    };
    AggregationMetrics::record(shape.as_str(), outcome, timer.elapsed());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_config_defaults_validate() {
        let config = AggregationConfig::default();
        assert_eq!(config.max_concurrent_loads, 16);
        assert!(config.request_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_limits() {
        let config = AggregationConfig {
            guide_limit: Some(0),
            ..AggregationConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AggregationConfig {
            max_concurrent_loads: 0,
            ..AggregationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_limit() {
        let config = AggregationConfig {
            max_list_limit: 100,
            ..AggregationConfig::default()
        };
        assert_eq!(config.effective_limit(Some(500), None).unwrap(), Some(100));
        assert_eq!(config.effective_limit(Some(7), None).unwrap(), Some(7));
        assert_eq!(config.effective_limit(None, Some(50)).unwrap(), Some(50));
        assert_eq!(config.effective_limit(None, None).unwrap(), None);

        let err = config.effective_limit(Some(0), None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_shape_parsing() {
        assert_eq!("full".parse::<Shape>().unwrap(), Shape::Full);
        assert_eq!("with_sequences".parse::<Shape>().unwrap(), Shape::Sequences);
        assert!("deep".parse::<Shape>().is_err());
        assert_eq!(serde_json::to_string(&Shape::Sequences).unwrap(), "\"sequences\"");
    }
}
