//! Per-session search state.
//!
//! A [`SearchSession`] owns the ordered result list of the latest search and
//! the page the user is looking at. Submitting a new search replaces both;
//! page navigation only moves the cursor. Each interactive session owns its
//! own instance.

use crate::error::Result;
use crate::model::Comment;
use crate::paginate::{DEFAULT_PAGE_SIZE, Paginator, ResultPage};
use crate::query::Query;

/// Result list plus current page for one user session.
#[derive(Debug, Clone)]
pub struct SearchSession {
    page_size: usize,
    query: Option<Query>,
    results: Vec<Comment>,
    current_page: usize,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl SearchSession {
    #[must_use]
    pub const fn new(page_size: usize) -> Self {
        Self {
            page_size,
            query: None,
            results: Vec::new(),
            current_page: 1,
        }
    }

    /// Install the results of a new search and go back to page 1.
    pub fn submit(&mut self, query: Query, results: Vec<Comment>) {
        self.query = Some(query);
        self.results = results;
        self.current_page = 1;
    }

    /// The query that produced the current results.
    #[must_use]
    pub const fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    #[must_use]
    pub fn results(&self) -> &[Comment] {
        &self.results
    }

    #[must_use]
    pub const fn has_results(&self) -> bool {
        self.query.is_some()
    }

    #[must_use]
    pub fn paginator(&self) -> Paginator {
        Paginator::new(self.results.len(), self.page_size)
    }

    /// Clamp raw user input into the valid page range.
    #[must_use]
    pub fn clamp_page(&self, page: usize) -> usize {
        self.paginator().clamp(page)
    }

    #[must_use]
    pub const fn current_page_number(&self) -> usize {
        self.current_page
    }

    /// Jump to page `page`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KasoError::PageOutOfRange`] and leaves the cursor
    /// unchanged when `page` is not a valid page.
    pub fn goto(&mut self, page: usize) -> Result<ResultPage<'_, Comment>> {
        self.paginator().range(page)?;
        self.current_page = page;
        self.current_page()
    }

    /// Advance one page, staying on the last page at the end.
    ///
    /// # Errors
    ///
    /// Propagates paging errors; none occur for a consistent session.
    pub fn next_page(&mut self) -> Result<ResultPage<'_, Comment>> {
        let target = self.paginator().clamp(self.current_page + 1);
        self.goto(target)
    }

    /// Go back one page, staying on page 1 at the start.
    ///
    /// # Errors
    ///
    /// Propagates paging errors; none occur for a consistent session.
    pub fn prev_page(&mut self) -> Result<ResultPage<'_, Comment>> {
        let target = self.paginator().clamp(self.current_page.saturating_sub(1));
        self.goto(target)
    }

    /// The page under the cursor.
    ///
    /// # Errors
    ///
    /// Propagates paging errors; none occur for a consistent session.
    pub fn current_page(&self) -> Result<ResultPage<'_, Comment>> {
        self.paginator().page(&self.results, self.current_page)
    }
}
