use serde::Serialize;

use crate::validator::{permitted_value, Validator};

pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Pagination and ordering for list queries. `sort` is a column name,
/// optionally prefixed with '-' for descending order.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: "id".to_string(),
            sort_safelist: MOVIE_SORT_SAFELIST,
        }
    }
}

impl Filters {
    /// Column to order by. Only ever returns an entry of the safelist, so the
    /// result is safe to interpolate into SQL.
    pub fn sort_column(&self) -> &'static str {
        let wanted = self.sort.trim_start_matches('-');
        self.sort_safelist
            .iter()
            .copied()
            .find(|s| *s == wanted)
            .unwrap_or("id")
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

pub fn validate_filters(v: &mut Validator, f: &Filters) {
    v.check(f.page > 0, "page", "must be greater than zero");
    v.check(f.page <= 10_000_000, "page", "must be a maximum of 10 million");
    v.check(f.page_size > 0, "page_size", "must be greater than zero");
    v.check(f.page_size <= 100, "page_size", "must be a maximum of 100");
    v.check(
        permitted_value(&f.sort.as_str(), f.sort_safelist),
        "sort",
        "invalid sort value",
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}
