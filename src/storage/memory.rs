//! In-memory record store.
//!
//! Reference implementation of `SubmissionStore` used by tests, benches and
//! embedded deployments. Ordering is deterministic: every sort falls back to
//! id ascending so repeated queries over unchanged data page identically.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::validation::record::validate_new_submission;

use super::filter::{
    Aggregate, FieldValue, Filter, GroupKey, GroupRow, Pagination, SortDirection, SortKey,
};
use super::models::{NewSubmission, Submission, SubmissionId, SubmissionPatch};
use super::store::{FoundPage, StoreError, SubmissionStore};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Submission>,
    next_id: SubmissionId,
}

/// Injected failures, consumed in order.
#[derive(Debug, Default)]
struct Faults {
    failing_creates: usize,
    unavailable: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<Table>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `create` fail with `StoreError::Unavailable`.
    pub fn fail_next_creates(&self, n: usize) {
        self.faults.lock().failing_creates = n;
    }

    /// Make every operation fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored record in id order.
    pub fn snapshot(&self) -> Vec<Submission> {
        self.table.read().rows.clone()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.faults.lock().unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    fn sorted_matches(table: &Table, filter: &Filter, sort: &[SortKey]) -> Vec<Submission> {
        let mut matched: Vec<Submission> = table
            .rows
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            for key in sort {
                let ord = key.field.value_of(a).total_cmp(&key.field.value_of(b));
                let ord = match key.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.id.cmp(&b.id)
        });
        matched
    }
}

impl SubmissionStore for MemoryStore {
    fn create(&self, record: NewSubmission) -> Result<Submission, StoreError> {
        self.check_available()?;
        {
            let mut faults = self.faults.lock();
            if faults.failing_creates > 0 {
                faults.failing_creates -= 1;
                return Err(StoreError::Unavailable("injected create failure".to_string()));
            }
        }

        validate_new_submission(&record).map_err(StoreError::Constraint)?;

        let mut table = self.table.write();
        table.next_id += 1;
        let stored = Submission::from_new(table.next_id, record, Utc::now());
        table.rows.push(stored.clone());
        Ok(stored)
    }

    fn find_by_id(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        self.check_available()?;
        Ok(self.table.read().rows.iter().find(|r| r.id == id).cloned())
    }

    fn find_many(
        &self,
        filter: &Filter,
        sort: &[SortKey],
        pagination: Option<Pagination>,
    ) -> Result<FoundPage, StoreError> {
        self.check_available()?;
        let table = self.table.read();
        let matched = Self::sorted_matches(&table, filter, sort);
        let total = matched.len() as u64;

        let records = match pagination {
            Some(p) => matched
                .into_iter()
                .skip(p.offset as usize)
                .take(p.limit as usize)
                .collect(),
            None => matched,
        };

        Ok(FoundPage { records, total })
    }

    fn update(&self, filter: &Filter, patch: &SubmissionPatch) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut table = self.table.write();
        let now = Utc::now();
        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|r| filter.matches(r)) {
            patch.apply(&mut row.data);
            row.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.check_available()?;
        let table = self.table.read();
        Ok(table.rows.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    fn aggregate(
        &self,
        filter: &Filter,
        group_by: &[GroupKey],
        aggregates: &[Aggregate],
    ) -> Result<Vec<GroupRow>, StoreError> {
        self.check_available()?;
        let table = self.table.read();

        // key -> (count, quality sum), insertion order kept for stable output
        let mut order: Vec<Vec<FieldValue>> = Vec::new();
        let mut groups: HashMap<Vec<FieldValue>, (u64, i64)> = HashMap::new();

        for row in table.rows.iter().filter(|r| filter.matches(r)) {
            let key: Vec<FieldValue> = group_by.iter().map(|g| g.value_of(row)).collect();
            let entry = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                (0, 0)
            });
            entry.0 += 1;
            entry.1 += i64::from(row.data.quality_score);
        }

        let want_avg = aggregates.contains(&Aggregate::AvgQualityScore);
        Ok(order
            .into_iter()
            .filter_map(|key| {
                let (count, sum) = groups.remove(&key)?;
                Some(GroupRow {
                    keys: key,
                    count,
                    avg_quality_score: want_avg.then(|| sum as f64 / count as f64),
                })
            })
            .collect())
    }
}
