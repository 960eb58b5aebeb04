//! Page arithmetic shared by every listing path.
//!
//! Both the flat-filter listing and the aggregate listing go through
//! [`paginate`], so there is exactly one definition of "is there a next page":
//! `next_page = page + 1` iff `page < total_pages`.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_PAGE, DEFAULT_PAGE_LIMIT, DEFAULT_SORT_FIELD, ERR_INVALID_SORT, ERR_PAGE_OUT_OF_RANGE,
};
use crate::error::{AppError, Result};

/// Raw pagination parameters as they arrive on a query string
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PaginationQuery {
    /// Coerce missing or zero values to the defaults (page 1, limit 10)
    pub fn normalize(self) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(DEFAULT_PAGE),
            self.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
    }

    /// Like [`normalize`](Self::normalize), but rejects pages whose window
    /// does not fit a signed 64-bit offset
    pub fn validate(self) -> Result<PageRequest> {
        let request = self.normalize();
        if request.checked_window().is_none() {
            return Err(AppError::invalid_field("page", ERR_PAGE_OUT_OF_RANGE));
        }
        Ok(request)
    }
}

/// A validated page request: `page >= 1`, `limit >= 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    limit: u64,
}

impl PageRequest {
    /// Out-of-range values fall back to the defaults rather than failing
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: if page == 0 { DEFAULT_PAGE } else { page },
            limit: if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit },
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Skip/limit window this page covers
    pub fn window(&self) -> PageWindow {
        PageWindow {
            skip: (self.page - 1).saturating_mul(self.limit),
            limit: self.limit,
        }
    }

    /// The window, if both offset and limit fit in an `i64`
    pub fn checked_window(&self) -> Option<PageWindow> {
        let skip = (self.page - 1).checked_mul(self.limit)?;
        i64::try_from(skip).ok()?;
        i64::try_from(self.limit).ok()?;
        Some(PageWindow {
            skip,
            limit: self.limit,
        })
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_PAGE_LIMIT)
    }
}

/// Offset window handed to the storage collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub skip: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort key for listings, named by the record's serialized field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Sort key from client input; the field must pass [`is_field_name`]
    pub fn parse(field: &str, direction: SortDirection) -> Result<Self> {
        if !is_field_name(field) {
            return Err(AppError::invalid_field("sort", ERR_INVALID_SORT));
        }
        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Newest first
impl Default for Sort {
    fn default() -> Self {
        Sort::desc(DEFAULT_SORT_FIELD)
    }
}

/// Page metadata computed from a request and a total count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub current_page: u64,
    pub limit: u64,
    pub total_count: u64,
    pub total_pages: u64,
    pub next_page: Option<u64>,
}

/// Compute page metadata
///
/// `total_pages = ceil(total_count / limit)`; `next_page` is `page + 1`
/// exactly when `page < total_pages`.
pub fn paginate(request: PageRequest, total_count: u64) -> PageMeta {
    let total_pages = total_count.div_ceil(request.limit);
    let next_page = (request.page < total_pages).then(|| request.page + 1);

    PageMeta {
        current_page: request.page,
        limit: request.limit,
        total_count,
        total_pages,
        next_page,
    }
}

/// A page of items plus its metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub next_page: Option<u64>,
    pub limit: u64,
}

impl<T> PaginationResult<T> {
    pub fn new(items: Vec<T>, meta: PageMeta) -> Self {
        Self {
            items,
            total_count: meta.total_count,
            current_page: meta.current_page,
            total_pages: meta.total_pages,
            next_page: meta.next_page,
            limit: meta.limit,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginationResult<U> {
        PaginationResult {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            current_page: self.current_page,
            total_pages: self.total_pages,
            next_page: self.next_page,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page_of_three() {
        let meta = paginate(PageRequest::new(1, 10), 25);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.next_page, Some(2));
        assert_eq!(meta.current_page, 1);
    }

    #[test]
    fn test_last_page_has_no_next() {
        let meta = paginate(PageRequest::new(3, 10), 25);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.next_page, None);
    }

    #[test]
    fn test_empty_collection() {
        let meta = paginate(PageRequest::new(1, 10), 0);
        assert_eq!(meta.total_pages, 0);
        assert_eq!(meta.next_page, None);
    }

    #[test]
    fn test_exact_multiple() {
        let meta = paginate(PageRequest::new(1, 10), 20);
        assert_eq!(meta.total_pages, 2);
        assert_eq!(meta.next_page, Some(2));

        let meta = paginate(PageRequest::new(2, 10), 20);
        assert_eq!(meta.next_page, None);
    }

    #[test]
    fn test_page_past_the_end() {
        let meta = paginate(PageRequest::new(7, 10), 25);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.next_page, None);
        assert_eq!(meta.current_page, 7);
    }

    #[test]
    fn test_next_page_rule_holds_over_a_grid() {
        for total in 0..60u64 {
            for limit in 1..12u64 {
                for page in 1..10u64 {
                    let meta = paginate(PageRequest::new(page, limit), total);
                    let expected_pages = (total + limit - 1) / limit;
                    assert_eq!(meta.total_pages, expected_pages);
                    assert_eq!(
                        meta.next_page,
                        if page < expected_pages { Some(page + 1) } else { None },
                        "page={} limit={} total={}",
                        page,
                        limit,
                        total
                    );
                }
            }
        }
    }

    #[test]
    fn test_zero_values_coerce_to_defaults() {
        let request = PageRequest::new(0, 0);
        assert_eq!(request.page(), 1);
        assert_eq!(request.limit(), 10);
    }

    #[test]
    fn test_missing_query_values_coerce_to_defaults() {
        let request = PaginationQuery::default().normalize();
        assert_eq!(request, PageRequest::new(1, 10));

        let request = PaginationQuery {
            page: Some(3),
            limit: None,
        }
        .normalize();
        assert_eq!(request.page(), 3);
        assert_eq!(request.limit(), 10);
    }

    #[test]
    fn test_window_offsets() {
        assert_eq!(
            PageRequest::new(1, 10).window(),
            PageWindow { skip: 0, limit: 10 }
        );
        assert_eq!(
            PageRequest::new(4, 25).window(),
            PageWindow { skip: 75, limit: 25 }
        );
    }

    #[test]
    fn test_validate_rejects_unaddressable_pages() {
        let huge = PaginationQuery {
            page: Some(184_467_440_737_095_516),
            limit: Some(1000),
        };
        assert!(huge.validate().is_err());

        let past_i64 = PaginationQuery {
            page: Some(2),
            limit: Some(i64::MAX as u64 + 1),
        };
        assert!(past_i64.validate().is_err());

        let fine = PaginationQuery {
            page: Some(3),
            limit: Some(20),
        };
        assert_eq!(fine.validate().unwrap(), PageRequest::new(3, 20));
        assert_eq!(
            PageRequest::new(3, 20).checked_window(),
            Some(PageWindow { skip: 40, limit: 20 })
        );
    }

    #[test]
    fn test_sort_parse_accepts_field_names_only() {
        assert_eq!(
            Sort::parse("email", SortDirection::Asc).unwrap(),
            Sort::asc("email")
        );
        assert!(Sort::parse("_created2", SortDirection::Desc).is_ok());
        assert!(Sort::parse("a;b", SortDirection::Asc).is_err());
        assert!(Sort::parse("doc->>'x'", SortDirection::Asc).is_err());
        assert!(Sort::parse("", SortDirection::Asc).is_err());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = PaginationResult::new(vec![1, 2], paginate(PageRequest::new(1, 2), 5));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["totalCount"], 5);
        assert_eq!(value["totalPages"], 3);
        assert_eq!(value["nextPage"], 2);
        assert_eq!(value["currentPage"], 1);
        assert_eq!(value["items"].as_array().unwrap().len(), 2);
    }
}
