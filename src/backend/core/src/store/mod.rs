//! Relational read interface consumed by the aggregation engine.
//!
//! The aggregator never talks to a database directly. It issues
//! [`ReadStore::find_one_where`] and [`ReadStore::find_all_where`] calls
//! against a [`Table`], using a conjunctive equality [`Predicate`] and an
//! optional [`OrderBy`] list. Column names are checked against a per-table
//! whitelist before any I/O happens.
//!
//! Two backends are provided:
//! - [`PostgresStore`] for production, built on an `sqlx` connection pool.
//! - [`InMemoryStore`] for development, tests and benchmarks.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use crate::error::{AtlasError, Result};
use crate::model::{
    Experiment, ExperimentId, ExperimentStatus, GuideCandidate, GuideId, OffTargetSite, PrincipalId, Sequence,
    SequenceId,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Tables and Values
// ═══════════════════════════════════════════════════════════════════════════════

/// The four tables an experiment tree is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Experiments,
    Sequences,
    GuideCandidates,
    OffTargetSites,
}

impl Table {
    /// SQL table name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Experiments => "experiments",
            Self::Sequences => "sequences",
            Self::GuideCandidates => "guide_candidates",
            Self::OffTargetSites => "off_target_sites",
        }
    }

    /// Columns that may appear in a select list, predicate or ordering.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Experiments => &["id", "principal_id", "name", "status", "created_at", "updated_at"],
            Self::Sequences => &["id", "experiment_id", "name", "bases", "created_at", "updated_at"],
            Self::GuideCandidates => &[
                "id",
                "sequence_id",
                "spacer",
                "pam",
                "strand",
                "position",
                "efficiency_score",
                "created_at",
            ],
            Self::OffTargetSites => &[
                "id",
                "guide_id",
                "chromosome",
                "position",
                "strand",
                "mismatches",
                "binding_score",
            ],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    fn check_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(AtlasError::unknown_column(self.name(), column))
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A predicate operand or ordering key.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Uuid(Uuid),
    Text(String),
    Float(f64),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Self::Uuid(_) => 0,
            Self::Text(_) => 1,
            Self::Float(_) => 2,
            Self::Int(_) => 3,
            Self::Timestamp(_) => 4,
        }
    }

    /// Total order over values. Values of different kinds order by kind;
    /// floats use IEEE-754 `total_cmp`.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Uuid(a), Self::Uuid(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<ExperimentId> for Value {
    fn from(v: ExperimentId) -> Self {
        Self::Uuid(v.0)
    }
}

impl From<SequenceId> for Value {
    fn from(v: SequenceId) -> Self {
        Self::Uuid(v.0)
    }
}

impl From<GuideId> for Value {
    fn from(v: GuideId) -> Self {
        Self::Uuid(v.0)
    }
}

impl From<&PrincipalId> for Value {
    fn from(v: &PrincipalId) -> Self {
        Self::Text(v.0.clone())
    }
}

impl From<ExperimentStatus> for Value {
    fn from(v: ExperimentStatus) -> Self {
        Self::Text(v.as_str().to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query Shapes
// ═══════════════════════════════════════════════════════════════════════════════

/// Conjunction of `column = value` clauses. An empty predicate matches all rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<(String, Value)>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality clause.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((column.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn validate(&self, table: Table) -> Result<()> {
        for (column, _) in &self.clauses {
            table.check_column(column)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Arguments of a multi-row read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAll {
    pub predicate: Predicate,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl FindAll {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn validate(&self, table: Table) -> Result<()> {
        self.predicate.validate(table)?;
        for order in &self.order_by {
            table.check_column(&order.column)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════════

/// A row returned by a [`ReadStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Experiment(Experiment),
    Sequence(Sequence),
    Guide(GuideCandidate),
    OffTarget(OffTargetSite),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Self::Experiment(_) => Table::Experiments,
            Self::Sequence(_) => Table::Sequences,
            Self::Guide(_) => Table::GuideCandidates,
            Self::OffTarget(_) => Table::OffTargetSites,
        }
    }
}

/// An entity that lives in exactly one [`Table`].
pub trait Record: Sized + Send + 'static {
    const TABLE: Table;

    /// Value of a whitelisted column, `None` for unknown names.
    fn column(&self, name: &str) -> Option<Value>;

    fn into_row(self) -> Row;

    fn from_row(row: Row) -> Result<Self>;
}

fn mismatch(expected: Table, row: &Row) -> AtlasError {
    AtlasError::unexpected_row(expected.name(), row.table().name())
}

impl Record for Experiment {
    const TABLE: Table = Table::Experiments;

    fn column(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.into(),
            "principal_id" => (&self.principal_id).into(),
            "name" => self.name.as_str().into(),
            "status" => self.status.into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => return None,
        })
    }

    fn into_row(self) -> Row {
        Row::Experiment(self)
    }

    fn from_row(row: Row) -> Result<Self> {
        match row {
            Row::Experiment(e) => Ok(e),
            other => Err(mismatch(Self::TABLE, &other)),
        }
    }
}

impl Record for Sequence {
    const TABLE: Table = Table::Sequences;

    fn column(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.into(),
            "experiment_id" => self.experiment_id.into(),
            "name" => self.name.as_str().into(),
            "bases" => self.bases.as_str().into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => return None,
        })
    }

    fn into_row(self) -> Row {
        Row::Sequence(self)
    }

    fn from_row(row: Row) -> Result<Self> {
        match row {
            Row::Sequence(s) => Ok(s),
            other => Err(mismatch(Self::TABLE, &other)),
        }
    }
}

impl Record for GuideCandidate {
    const TABLE: Table = Table::GuideCandidates;

    fn column(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.into(),
            "sequence_id" => self.sequence_id.into(),
            "spacer" => self.spacer.as_str().into(),
            "pam" => self.pam.as_str().into(),
            "strand" => self.strand.as_str().into(),
            "position" => self.position.into(),
            "efficiency_score" => self.efficiency_score.into(),
            "created_at" => self.created_at.into(),
            _ => return None,
        })
    }

    fn into_row(self) -> Row {
        Row::Guide(self)
    }

    fn from_row(row: Row) -> Result<Self> {
        match row {
            Row::Guide(g) => Ok(g),
            other => Err(mismatch(Self::TABLE, &other)),
        }
    }
}

impl Record for OffTargetSite {
    const TABLE: Table = Table::OffTargetSites;

    fn column(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.0.into(),
            "guide_id" => self.guide_id.into(),
            "chromosome" => self.chromosome.as_str().into(),
            "position" => self.position.into(),
            "strand" => self.strand.as_str().into(),
            "mismatches" => i64::from(self.mismatches).into(),
            "binding_score" => self.binding_score.into(),
            _ => return None,
        })
    }

    fn into_row(self) -> Row {
        Row::OffTarget(self)
    }

    fn from_row(row: Row) -> Result<Self> {
        match row {
            Row::OffTarget(o) => Ok(o),
            other => Err(mismatch(Self::TABLE, &other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only relational access used by the aggregator.
#[async_trait]
pub trait ReadStore: Send + Sync {
    /// Fetch at most one row matching the predicate.
    async fn find_one_where(&self, table: Table, predicate: &Predicate) -> Result<Option<Row>>;

    /// Fetch all matching rows in the requested order. Never absent: an
    /// empty vector means no rows matched.
    async fn find_all_where(&self, table: Table, query: &FindAll) -> Result<Vec<Row>>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Typed single-row read.
pub async fn find_one<R: Record>(store: &dyn ReadStore, predicate: &Predicate) -> Result<Option<R>> {
    match store.find_one_where(R::TABLE, predicate).await? {
        Some(row) => Ok(Some(R::from_row(row)?)),
        None => Ok(None),
    }
}

/// Typed multi-row read.
pub async fn find_all<R: Record>(store: &dyn ReadStore, query: &FindAll) -> Result<Vec<R>> {
    store
        .find_all_where(R::TABLE, query)
        .await?
        .into_iter()
        .map(R::from_row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_column_rejected() {
        let err = Predicate::new()
            .eq("owner", "p1")
            .validate(Table::Experiments)
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::UnknownColumn);

        let query = FindAll::new(Predicate::new()).order_by(OrderBy::desc("score"));
        assert!(query.validate(Table::GuideCandidates).is_err());
    }

    #[test]
    fn test_whitelisted_columns_accepted() {
        let query = FindAll::new(Predicate::new().eq("sequence_id", Uuid::new_v4()))
            .order_by(OrderBy::desc("efficiency_score"))
            .order_by(OrderBy::asc("id"));
        assert!(query.validate(Table::GuideCandidates).is_ok());
    }

    #[test]
    fn test_value_total_order() {
        assert_eq!(Value::Float(0.9).total_cmp(&Value::Float(0.4)), Ordering::Greater);
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Direction::Desc.apply(Ordering::Less), Ordering::Greater);
    }

    #[test]
    fn test_row_conversion_mismatch() {
        let exp = Experiment::new("p1", "e");
        let err = Sequence::from_row(exp.into_row()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::UnexpectedRow);
    }

    #[test]
    fn test_record_columns_cover_whitelist() {
        let exp = Experiment::new("p1", "e");
        for column in Table::Experiments.columns() {
            assert!(exp.column(column).is_some(), "missing {}", column);
        }
        let site = OffTargetSite::new(GuideId::new(), "chr1", 1.0);
        for column in Table::OffTargetSites.columns() {
            assert!(site.column(column).is_some(), "missing {}", column);
        }
    }
}
