use serde::Serialize;

/// 1-indexed page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub per_page: u64,
    pub page: u64,
}

impl Pagination {
    /// Clamp raw request values. Missing `per_page` falls back to the configured
    /// page size; anything below 1 is raised to 1, anything above the configured
    /// maximum is capped.
    pub fn new(per_page: Option<i64>, page: Option<i64>) -> Self {
        let listing = &crate::config::CONFIG.listing;
        let requested = per_page.unwrap_or(listing.results_on_page as i64);
        let mut per_page = requested.max(1) as u64;
        if per_page > listing.max_per_page {
            if listing.debug_logging {
                tracing::warn!("perPage {} exceeds max {}, capping to max", per_page, listing.max_per_page);
            }
            per_page = listing.max_per_page.max(1);
        }
        Self {
            per_page,
            page: page.unwrap_or(1).max(1) as u64,
        }
    }

    /// Exact values, used where the config must not apply
    pub fn exact(per_page: u64, page: u64) -> Self {
        Self {
            per_page: per_page.max(1),
            page: page.max(1),
        }
    }

    /// Rows before this page, held within the range of a Postgres `bigint`
    pub fn offset(&self) -> u64 {
        (self.page - 1)
            .saturating_mul(self.per_page)
            .min(i64::MAX as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
}

impl<T> Page<T> {
    /// `current_page` always echoes the request, even past the last page.
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let last_page = total.div_ceil(pagination.per_page).max(1);
        Self {
            items,
            total,
            per_page: pagination.per_page,
            current_page: pagination.page,
            last_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
        }
    }
}
