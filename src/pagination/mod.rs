//! Pagination module
//!
//! Follows HATEOAS-style `next_page` links for one entity at a time.
//!
//! # Overview
//!
//! The first page is requested from the entity's list path with the page
//! size, ordering and filters as query parameters. Every later page is the
//! `next_page` URL from the previous response, requested verbatim. Retries
//! happen inside the HTTP client; the paginator adds page-size clamping,
//! loop detection and response validation.

mod paginator;
mod types;

pub use paginator::Paginator;
pub use types::{
    PagePhase, PageRequest, PageResponse, PaginationState, PaginatorConfig,
    DEFAULT_MAX_PAGE_SIZE, DEFAULT_NEXT_PAGE_PATH, DEFAULT_ORDERING_PARAM,
    DEFAULT_PAGE_SIZE_PARAM, DEFAULT_RECORDS_PATH,
};
