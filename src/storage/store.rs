//! Record store boundary.
//!
//! The persistent store is an external collaborator. This trait is the whole
//! surface the pipeline and the analytics engine rely on. Reads are
//! point-in-time with no isolation beyond what the backing store provides:
//! writes racing an aggregation may or may not be reflected in its result.

use thiserror::Error;

use super::filter::{Aggregate, Filter, GroupKey, GroupRow, Pagination, SortKey};
use super::models::{NewSubmission, Submission, SubmissionId, SubmissionPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("validation error: {0}")]
    Constraint(String),

    #[error("timed out acquiring a connection after {0}ms")]
    PoolTimeout(u64),

    #[error("record store error: {0}")]
    Backend(String),
}

/// Records matched by `find_many` plus the unpaginated total.
#[derive(Debug, Clone, Default)]
pub struct FoundPage {
    pub records: Vec<Submission>,
    pub total: u64,
}

pub trait SubmissionStore: Send + Sync {
    /// Persist one record atomically and return it with its assigned id.
    fn create(&self, record: NewSubmission) -> Result<Submission, StoreError>;

    fn find_by_id(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError>;

    fn find_many(
        &self,
        filter: &Filter,
        sort: &[SortKey],
        pagination: Option<Pagination>,
    ) -> Result<FoundPage, StoreError>;

    /// Apply `patch` to every matching record, returning the affected count.
    fn update(&self, filter: &Filter, patch: &SubmissionPatch) -> Result<u64, StoreError>;

    fn count(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Group matching records by `group_by` and compute `aggregates` per group.
    /// Row order is unspecified.
    fn aggregate(
        &self,
        filter: &Filter,
        group_by: &[GroupKey],
        aggregates: &[Aggregate],
    ) -> Result<Vec<GroupRow>, StoreError>;
}
