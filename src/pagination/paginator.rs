//! Cursor-following paginator

use super::types::{PagePhase, PageRequest, PageResponse, PaginationState, PaginatorConfig};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::{get_path, JsonValue, Record};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Fetches the pages of one entity, following `next_page` links
///
/// A paginator belongs to a single entity run. It tracks every cursor it has
/// seen and fails with [`Error::PaginationLoop`] rather than revisit one.
#[derive(Debug)]
pub struct Paginator {
    client: Arc<HttpClient>,
    config: PaginatorConfig,
    entity: String,
    page_cap: u32,
    clamp_warned: bool,
    state: PaginationState,
}

impl Paginator {
    /// Create a paginator; `advertised_max` is the schema's page size cap
    pub fn new(
        client: Arc<HttpClient>,
        config: PaginatorConfig,
        entity: impl Into<String>,
        advertised_max: Option<u32>,
    ) -> Self {
        let page_cap = advertised_max.unwrap_or(config.max_page_size).max(1);
        Self {
            client,
            config,
            entity: entity.into(),
            page_cap,
            clamp_warned: false,
            state: PaginationState::new(),
        }
    }

    /// Effective page size cap
    pub fn page_cap(&self) -> u32 {
        self.page_cap
    }

    /// Whether any request has been clamped to the cap
    pub fn was_clamped(&self) -> bool {
        self.clamp_warned
    }

    /// Pagination state so far
    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    /// Consume the paginator, keeping its state
    pub fn into_state(self) -> PaginationState {
        self.state
    }

    /// Fetch one page
    pub async fn fetch_page(
        &mut self,
        request: &PageRequest,
        cancel: &CancellationToken,
    ) -> Result<PageResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.state.phase = PagePhase::Fetching;
        match self.fetch_inner(request, cancel).await {
            Ok(page) => {
                self.state.pages += 1;
                self.state.records += page.records.len() as u64;
                self.state.phase = if page.is_last() {
                    PagePhase::Done
                } else {
                    PagePhase::More
                };
                Ok(page)
            }
            Err(e) => {
                self.state.phase = PagePhase::Failed;
                Err(e)
            }
        }
    }

    async fn fetch_inner(
        &mut self,
        request: &PageRequest,
        cancel: &CancellationToken,
    ) -> Result<PageResponse> {
        let url = match &request.cursor {
            Some(cursor) => self.resolve(cursor)?,
            None => self.first_page_url(request)?,
        };

        // The starting point counts as visited so a link back to it is a loop
        if self.state.pages == 0 {
            self.state.visit(url.as_str());
        }

        debug!("Fetching page {} of '{}': {url}", self.state.pages + 1, self.entity);

        let response = self
            .client
            .get_counted(url.as_str(), &[], cancel, &mut self.state.retries)
            .await
            .map_err(|e| self.page_error(e))?;

        let body: JsonValue = response.json().map_err(|e| self.page_error(e))?;
        let mut page = self.parse_body(&body)?;

        if let Some(cursor) = page.next_cursor.take() {
            let next = self.resolve(&cursor)?;
            if !self.state.visit(next.as_str()) {
                return Err(Error::PaginationLoop {
                    entity: self.entity.clone(),
                    cursor,
                });
            }
            page.next_cursor = Some(next.to_string());
        }

        Ok(page)
    }

    /// First-page URL with page size, ordering and filters in the query
    fn first_page_url(&mut self, request: &PageRequest) -> Result<Url> {
        let page_size = self.clamp(request.page_size);
        let mut url = self.resolve(&request.list_path)?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair(&self.config.page_size_param, &page_size.to_string());
            if let Some(ordering) = &request.ordering {
                query.append_pair(&self.config.ordering_param, ordering);
            }
            for (key, value) in &request.filters {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn clamp(&mut self, requested: u32) -> u32 {
        if requested == 0 {
            return self.page_cap;
        }
        if requested > self.page_cap {
            if !self.clamp_warned {
                warn!(
                    "Page size {requested} for '{}' exceeds the cap of {}, clamping",
                    self.entity, self.page_cap
                );
                self.clamp_warned = true;
            }
            return self.page_cap;
        }
        requested
    }

    fn resolve(&self, cursor: &str) -> Result<Url> {
        self.client
            .resolve_url(cursor)
            .map_err(|e| Error::page_fetch(&self.entity, format!("invalid page link '{cursor}': {e}")))
    }

    fn parse_body(&self, body: &JsonValue) -> Result<PageResponse> {
        if !body.is_object() {
            return Err(Error::page_fetch(&self.entity, "response body is not a JSON object"));
        }

        let records = get_path(body, &self.config.records_path)
            .and_then(JsonValue::as_array)
            .ok_or_else(|| {
                Error::page_fetch(
                    &self.entity,
                    format!("response has no '{}' array", self.config.records_path),
                )
            })?
            .iter()
            .map(|item| match item {
                JsonValue::Object(map) => Ok(map.clone()),
                other => Err(Error::page_fetch(
                    &self.entity,
                    format!("record is not an object: {other}"),
                )),
            })
            .collect::<Result<Vec<Record>>>()?;

        let next_cursor = match get_path(body, &self.config.next_page_path) {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) if s.trim().is_empty() => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(Error::page_fetch(
                    &self.entity,
                    format!("'{}' is not a URL: {other}", self.config.next_page_path),
                ))
            }
        };

        Ok(PageResponse {
            records,
            next_cursor,
        })
    }

    /// Auth and cancellation keep their identity; anything else fails the page
    fn page_error(&self, e: Error) -> Error {
        match e {
            Error::Auth { .. } | Error::TokenRefresh { .. } | Error::Cancelled => e,
            Error::PageFetch { .. } => e,
            other => Error::page_fetch(&self.entity, other.to_string()),
        }
    }
}
