//! In-memory read store for testing and development.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{FindAll, OrderBy, Predicate, ReadStore, Record, Row, Table};
use crate::error::Result;
use crate::model::{Experiment, GuideCandidate, OffTargetSite, Sequence};

#[derive(Default)]
struct Tables {
    experiments: Vec<Experiment>,
    sequences: Vec<Sequence>,
    guides: Vec<GuideCandidate>,
    off_targets: Vec<OffTargetSite>,
}

/// Process-local store. Evaluates predicates, ordering and limits the same
/// way the SQL backend does.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_experiment(&self, experiment: Experiment) {
        self.tables.write().await.experiments.push(experiment);
    }

    pub async fn insert_sequence(&self, sequence: Sequence) {
        self.tables.write().await.sequences.push(sequence);
    }

    pub async fn insert_guide(&self, guide: GuideCandidate) {
        self.tables.write().await.guides.push(guide);
    }

    pub async fn insert_off_target(&self, site: OffTargetSite) {
        self.tables.write().await.off_targets.push(site);
    }

    /// Number of rows held in a table.
    pub async fn len(&self, table: Table) -> usize {
        let tables = self.tables.read().await;
        match table {
            Table::Experiments => tables.experiments.len(),
            Table::Sequences => tables.sequences.len(),
            Table::GuideCandidates => tables.guides.len(),
            Table::OffTargetSites => tables.off_targets.len(),
        }
    }
}

fn matches<R: Record>(record: &R, predicate: &Predicate) -> bool {
    predicate
        .clauses()
        .iter()
        .all(|(column, value)| record.column(column).as_ref() == Some(value))
}

fn compare<R: Record>(a: &R, b: &R, order_by: &[OrderBy]) -> Ordering {
    for order in order_by {
        let ordering = match (a.column(&order.column), b.column(&order.column)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        };
        let ordering = order.direction.apply(ordering);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn select<R: Record + Clone>(rows: &[R], query: &FindAll) -> Vec<Row> {
    let mut selected: Vec<&R> = rows.iter().filter(|r| matches(*r, &query.predicate)).collect();
    if !query.order_by.is_empty() {
        selected.sort_by(|a, b| compare(*a, *b, &query.order_by));
    }
    if let Some(limit) = query.limit {
        selected.truncate(limit);
    }
    selected.into_iter().map(|r| r.clone().into_row()).collect()
}

fn select_one<R: Record + Clone>(rows: &[R], predicate: &Predicate) -> Option<Row> {
    rows.iter()
        .find(|r| matches(*r, predicate))
        .map(|r| r.clone().into_row())
}

#[async_trait]
impl ReadStore for InMemoryStore {
    async fn find_one_where(&self, table: Table, predicate: &Predicate) -> Result<Option<Row>> {
        predicate.validate(table)?;
        let tables = self.tables.read().await;
        Ok(match table {
            Table::Experiments => select_one(&tables.experiments, predicate),
            Table::Sequences => select_one(&tables.sequences, predicate),
            Table::GuideCandidates => select_one(&tables.guides, predicate),
            Table::OffTargetSites => select_one(&tables.off_targets, predicate),
        })
    }

    async fn find_all_where(&self, table: Table, query: &FindAll) -> Result<Vec<Row>> {
        query.validate(table)?;
        let tables = self.tables.read().await;
        Ok(match table {
            Table::Experiments => select(&tables.experiments, query),
            Table::Sequences => select(&tables.sequences, query),
            Table::GuideCandidates => select(&tables.guides, query),
            Table::OffTargetSites => select(&tables.off_targets, query),
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
