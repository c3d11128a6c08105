use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// `?page=&per_page=` query parameters. Out-of-range values are clamped.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    /// Drives infinite scroll on the storefront.
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        let page = pagination.page();
        let per_page = pagination.per_page();
        Self {
            has_more: page.saturating_mul(per_page) < total,
            items,
            total,
            page,
            per_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            has_more: self.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_inputs() {
        let pagination = Pagination {
            page: Some(0),
            per_page: Some(1_000),
        };
        assert_eq!(pagination.page(), 1);
        assert_eq!(pagination.per_page(), MAX_PER_PAGE);
        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn computes_offset() {
        let pagination = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(pagination.offset(), 20);
    }

    #[test]
    fn has_more_until_last_page() {
        let first = Pagination {
            page: Some(1),
            per_page: Some(10),
        };
        let last = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert!(Page::new(vec![0; 10], 25, &first).has_more);
        assert!(!Page::new(vec![0; 5], 25, &last).has_more);
    }
}
