//! Fixed-size page windows over an ordered result list.

use std::ops::Range;

use serde::Serialize;

use crate::error::{KasoError, Result};

/// Number of comments shown per page.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Page arithmetic for a result list of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    len: usize,
    page_size: usize,
}

impl Paginator {
    /// Create a paginator. A zero page size is treated as one.
    #[must_use]
    pub fn new(len: usize, page_size: usize) -> Self {
        Self {
            len,
            page_size: page_size.max(1),
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// `max(1, ceil(len / page_size))`; an empty result still has one page.
    #[must_use]
    pub const fn total_pages(&self) -> usize {
        if self.len == 0 {
            1
        } else {
            self.len.div_ceil(self.page_size)
        }
    }

    /// Index range of 1-based page `page`.
    ///
    /// # Errors
    ///
    /// Returns [`KasoError::PageOutOfRange`] when `page` is outside
    /// `[1, total_pages]`.
    pub fn range(&self, page: usize) -> Result<Range<usize>> {
        let total = self.total_pages();
        if page == 0 || page > total {
            return Err(KasoError::PageOutOfRange { page, total });
        }
        let start = (page - 1) * self.page_size;
        let end = (start + self.page_size).min(self.len);
        Ok(start..end)
    }

    /// Clamp user input into the valid page range.
    #[must_use]
    pub fn clamp(&self, page: usize) -> usize {
        page.clamp(1, self.total_pages())
    }

    /// Slice page `page` out of `items`.
    ///
    /// # Errors
    ///
    /// Returns [`KasoError::PageOutOfRange`] for an invalid page.
    pub fn page<'a, T>(&self, items: &'a [T], page: usize) -> Result<ResultPage<'a, T>> {
        debug_assert_eq!(items.len(), self.len);
        let range = self.range(page)?;
        Ok(ResultPage {
            number: page,
            total_pages: self.total_pages(),
            total_items: self.len,
            start: range.start,
            items: &items[range],
        })
    }
}

/// A window into an ordered result list.
#[derive(Debug, Clone, Serialize)]
pub struct ResultPage<'a, T> {
    /// 1-based page number.
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
    /// Offset of the first item within the full list.
    pub start: usize,
    pub items: &'a [T],
}

impl<T> ResultPage<'_, T> {
    /// 1-based position of the first shown item (0 when empty).
    #[must_use]
    pub const fn first_position(&self) -> usize {
        if self.items.is_empty() { 0 } else { self.start + 1 }
    }

    /// 1-based position of the last shown item.
    #[must_use]
    pub const fn last_position(&self) -> usize {
        self.start + self.items.len()
    }
}
