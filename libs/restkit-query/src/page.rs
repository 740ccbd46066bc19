use serde::{Deserialize, Serialize};

use crate::errors::QueryError;

/// Window into a result set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

impl Page {
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Reject pages whose limit exceeds `max_limit`.
    pub fn validate(&self, max_limit: u64) -> Result<(), QueryError> {
        if self.limit > max_limit {
            return Err(QueryError::MaxPageLimitExceeded(max_limit));
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn limit_at_cap_is_valid() {
        assert_eq!(Page::new(0, 5).validate(5), Ok(()));
        assert_eq!(Page::new(100, 0).validate(5), Ok(()));
    }

    #[test]
    fn limit_over_cap_reports_max() {
        assert_eq!(
            Page::new(0, 6).validate(5),
            Err(QueryError::MaxPageLimitExceeded(5))
        );
    }
}
