//! Query shaping for enumeration queries

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use super::execution::Execution;
use super::status::ExecutionStatus;

/// Default number of executions returned per page
pub const DEFAULT_PAGE_SIZE: usize = 3500;

/// Filter and pagination settings for an enumeration query
///
/// Built per call and never persisted. An empty status set matches every
/// status. Pages are 1-based. A `page_size` of 0 means no limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCriteria {
    pub statuses: HashSet<ExecutionStatus>,
    pub start_time_cutoff: Option<i64>,
    pub page: usize,
    pub page_size: usize,
    pub sort_type: Option<ExecutionComparator>,
}

impl Default for ExecutionCriteria {
    fn default() -> Self {
        Self {
            statuses: HashSet::new(),
            start_time_cutoff: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_type: None,
        }
    }
}

impl ExecutionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = ExecutionStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_start_time_cutoff(mut self, cutoff: i64) -> Self {
        self.start_time_cutoff = Some(cutoff);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_sort_type(mut self, sort_type: ExecutionComparator) -> Self {
        self.sort_type = Some(sort_type);
        self
    }

    pub fn matches_status(&self, status: ExecutionStatus) -> bool {
        self.statuses.is_empty() || self.statuses.contains(&status)
    }

    /// Executions that have not started yet always pass the cutoff
    pub fn matches_start_time(&self, start_time: Option<i64>) -> bool {
        match (self.start_time_cutoff, start_time) {
            (Some(cutoff), Some(start)) => start > cutoff,
            _ => true,
        }
    }

    /// Status and start time filters combined
    pub fn matches(&self, execution: &Execution) -> bool {
        self.matches_status(execution.status) && self.matches_start_time(execution.start_time)
    }

    /// Maximum number of items per page, `usize::MAX` when unlimited
    pub fn limit(&self) -> usize {
        if self.page_size == 0 {
            usize::MAX
        } else {
            self.page_size
        }
    }

    /// Returns the items on the page selected by `page` and `page_size`
    ///
    /// Pages past the end, including offsets too large to represent, are
    /// empty. Without a limit every item is on the first page.
    pub fn paginate<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let page = self.page.max(1);
        let limit = self.limit();
        items
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect()
    }
}

/// Sort orders understood by the repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionComparator {
    /// Storage order: newest id first
    NaturalAsc,
    /// Oldest id first
    NaturalDesc,
    BuildTimeAsc,
    BuildTimeDesc,
    /// Most recently started first, unstarted executions ahead of all others
    StartTimeOrId,
}

impl ExecutionComparator {
    pub fn compare(&self, a: &Execution, b: &Execution) -> Ordering {
        match self {
            ExecutionComparator::NaturalAsc => b.id.cmp(&a.id),
            ExecutionComparator::NaturalDesc => a.id.cmp(&b.id),
            ExecutionComparator::BuildTimeAsc => a
                .build_time
                .cmp(&b.build_time)
                .then_with(|| a.id.cmp(&b.id)),
            ExecutionComparator::BuildTimeDesc => b
                .build_time
                .cmp(&a.build_time)
                .then_with(|| b.id.cmp(&a.id)),
            ExecutionComparator::StartTimeOrId => match (a.start_time, b.start_time) {
                (None, None) => b.id.cmp(&a.id),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => y.cmp(&x).then_with(|| b.id.cmp(&a.id)),
            },
        }
    }
}
