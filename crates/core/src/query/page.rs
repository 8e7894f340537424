//! Offset/limit pagination.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Page size bounds applied by the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    /// Limit used when the caller gives none.
    pub default_limit: u32,
    /// Largest limit a caller may request.
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 1000,
        }
    }
}

impl PageLimits {
    /// Bounds with a custom ceiling of at least one row; the default limit
    /// never exceeds it.
    pub fn with_max(max_limit: u32) -> Self {
        let max_limit = max_limit.max(1);
        let defaults = Self::default();
        Self {
            default_limit: defaults.default_limit.min(max_limit),
            max_limit,
        }
    }
}

/// Caller-supplied pagination arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageArgs {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl PageArgs {
    pub fn new(offset: u64, limit: u32) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// Effective limit under `limits`.
    pub fn resolve(&self, limits: &PageLimits) -> DomainResult<u32> {
        match self.limit {
            None => Ok(limits.default_limit),
            Some(0) => Err(DomainError::InvalidPage("limit must be positive".into())),
            Some(requested) if requested > limits.max_limit => Err(DomainError::PageTooLarge {
                requested,
                max: limits.max_limit,
            }),
            Some(requested) => Ok(requested),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_bounds() {
        let limits = PageLimits::default();
        assert_eq!(PageArgs::default().resolve(&limits).unwrap(), 50);
        assert_eq!(PageArgs::new(0, 1000).resolve(&limits).unwrap(), 1000);
        assert!(matches!(
            PageArgs::new(0, 1001).resolve(&limits),
            Err(DomainError::PageTooLarge { requested: 1001, max: 1000 })
        ));
        assert!(matches!(
            PageArgs::new(10, 0).resolve(&limits),
            Err(DomainError::InvalidPage(_))
        ));
    }

    #[test]
    fn test_custom_max_clamps_default() {
        let limits = PageLimits::with_max(20);
        assert_eq!(limits.default_limit, 20);
        assert_eq!(PageArgs::default().resolve(&limits).unwrap(), 20);
    }

    #[test]
    fn test_zero_max_still_serves_a_row() {
        let limits = PageLimits::with_max(0);
        assert_eq!(limits.max_limit, 1);
        assert_eq!(PageArgs::default().resolve(&limits).unwrap(), 1);
        assert!(matches!(
            PageArgs::new(0, 2).resolve(&limits),
            Err(DomainError::PageTooLarge { requested: 2, max: 1 })
        ));
    }
}
