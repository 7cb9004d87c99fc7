//! Off-target site loading, strongest binding first.

use std::cmp::Ordering;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::{GuideId, OffTargetSite};
use crate::store::{find_all, FindAll, OrderBy, Predicate, ReadStore};
use crate::telemetry::{LevelLoadMetrics, LoadOutcome, OperationTimer};

/// Binding score descending, then id ascending.
pub fn off_target_order(a: &OffTargetSite, b: &OffTargetSite) -> Ordering {
    b.binding_score
        .total_cmp(&a.binding_score)
        .then_with(|| a.id.cmp(&b.id))
}

/// Load the predicted off-target sites of one guide.
#[instrument(level = "debug", skip(store), fields(guide_id = %guide_id))]
pub async fn load_off_targets(
    store: &dyn ReadStore,
    guide_id: GuideId,
    limit: Option<usize>,
) -> Result<Vec<OffTargetSite>> {
    let timer = OperationTimer::start();
    let query = FindAll::new(Predicate::new().eq("guide_id", guide_id))
        .order_by(OrderBy::desc("binding_score"))
        .order_by(OrderBy::asc("id"))
        .limit(limit);

    let mut sites = match find_all::<OffTargetSite>(store, &query).await {
        Ok(rows) => rows,
        Err(e) => {
            LevelLoadMetrics::record("off_targets", LoadOutcome::Failed, 0, timer.elapsed());
            return Err(e);
        }
    };
    sites.sort_by(off_target_order);

    LevelLoadMetrics::record("off_targets", LoadOutcome::Ok, sites.len(), timer.elapsed());
    debug!(count = sites.len(), "Off-target sites loaded");
    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stronger_binding_first() {
        let guide = GuideId::new();
        let mut list = vec![
            OffTargetSite::new(guide, "chr1", 10.0),
            OffTargetSite::new(guide, "chr2", 30.0),
        ];
        list.sort_by(off_target_order);
        assert_eq!(list[0].chromosome, "chr2");
    }
}
