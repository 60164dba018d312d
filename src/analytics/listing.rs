//! Filtered, paginated submission listing.

use serde::Serialize;

use crate::storage::filter::{Pagination, SortKey};
use crate::storage::models::Submission;
use crate::validation::params::{ListingParams, ListingQuery, SubmissionQuery};

use super::{AnalyticsEngine, AnalyticsError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl PageInfo {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            total / limit + u64::from(total % limit != 0)
        };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingPage {
    pub submissions: Vec<Submission>,
    pub pagination: PageInfo,
    /// The applied filters, echoed back.
    pub filters: SubmissionQuery,
}

impl AnalyticsEngine {
    /// Parse raw listing parameters and run the listing.
    pub fn list_params(&self, params: &ListingParams) -> Result<ListingPage, AnalyticsError> {
        let query = ListingQuery::parse(params, self.config.max_page_size)?;
        self.list(&query)
    }

    /// Ties on the sort field are broken by id, so an unchanged collection
    /// always pages the same way.
    pub fn list(&self, query: &ListingQuery) -> Result<ListingPage, AnalyticsError> {
        let found = self.store().find_many(
            &query.query.to_filter(),
            std::slice::from_ref::<SortKey>(&query.sort),
            Some(Pagination::page(query.page, query.limit)),
        )?;

        log::debug!(
            "LISTING_COMPUTED page={} limit={} total={} returned={}",
            query.page,
            query.limit,
            found.total,
            found.records.len()
        );

        Ok(ListingPage {
            submissions: found.records,
            pagination: PageInfo::new(query.page, query.limit, found.total),
            filters: query.query.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count_rounds_up() {
        assert_eq!(PageInfo::new(1, 20, 0).pages, 0);
        assert_eq!(PageInfo::new(1, 20, 20).pages, 1);
        assert_eq!(PageInfo::new(1, 20, 21).pages, 2);
        assert_eq!(PageInfo::new(3, 7, 50).pages, 8);
    }
}
