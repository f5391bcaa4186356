//! Run DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{Run, RunStatus};

/// Page size used when a listing does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 15;

/// Largest page a listing may ask for
pub const MAX_PAGE_SIZE: i64 = 500;

/// Response to a trigger request
///
/// The run executes in the background; clients poll it by `run_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredRun {
    pub run_id: Uuid,
    pub status: RunStatus,
}

/// One page of runs plus the unpaged total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunList {
    pub runs: Vec<Run>,
    pub total: i64,
}

/// Query parameters of the run listing
///
/// `page` (1-based) takes precedence over `offset`. Out-of-range values
/// fall back to defaults instead of failing the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRunsQuery {
    pub app_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub page: Option<i64>,
}

impl ListRunsQuery {
    /// Resolves the effective `(limit, offset)` pair
    pub fn window(&self) -> (i64, i64) {
        let limit = self
            .limit
            .filter(|n| *n > 0)
            .map_or(DEFAULT_PAGE_SIZE, |n| n.min(MAX_PAGE_SIZE));
        let offset = match self.page {
            Some(page) if page > 1 => (page - 1).saturating_mul(limit),
            Some(_) => 0,
            None => self.offset.filter(|n| *n >= 0).unwrap_or(0),
        };
        (limit, offset)
    }

    /// App filter, ignoring a blank value
    pub fn app_filter(&self) -> Option<&str> {
        self.app_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}
