use axum::extract::{Query, rejection::QueryRejection};
use serde::Deserialize;

use super::ApiError;
use crate::constants::pagination::{DEFAULT_LIMIT, MAX_LIMIT};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated `(offset, limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

pub fn validate_page(query: Result<Query<PageQuery>, QueryRejection>) -> Result<Page, ApiError> {
    let Query(query) = query?;

    let offset = query.offset.unwrap_or(0);
    let offset = u64::try_from(offset).map_err(|_| {
        ApiError::validation(format!("Invalid offset: {offset}. Offset must be >= 0"))
    })?;

    let limit = query.limit.map_or(Ok(DEFAULT_LIMIT), |limit| {
        u64::try_from(limit)
            .ok()
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .ok_or_else(|| {
                ApiError::validation(format!(
                    "Invalid limit: {limit}. Limit must be between 1 and {MAX_LIMIT}"
                ))
            })
    })?;

    Ok(Page { offset, limit })
}
