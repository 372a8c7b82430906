//! Search pipeline over a comment store.
//!
//! Ties the pieces together: the store filters by the query, the ordering
//! module arranges matches into conversation blocks, and the paginator
//! slices the result for display.

use crate::error::Result;
use crate::model::Comment;
use crate::order::sort_comments;
use crate::paginate::{Paginator, ResultPage};
use crate::query::Query;
use crate::store::CommentStore;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::info;

/// Where comments are searched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Parameterized SQL over the local `SQLite` store.
    #[default]
    Sqlite,
    /// Parallel scan over an archive loaded into memory.
    Memory,
}

impl Backend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }

    /// Parse a backend name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sql" | "db" => Some(Self::Sqlite),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search engine over one comment store.
pub struct SearchEngine {
    store: Box<dyn CommentStore>,
}

impl SearchEngine {
    pub fn new(store: impl CommentStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn CommentStore {
        self.store.as_ref()
    }

    /// All comments accepted by `query`, in presentation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub fn search(&self, query: &Query) -> Result<Vec<Comment>> {
        let start = Instant::now();
        let mut results = self.store.find(query)?;
        let matched_ms = start.elapsed().as_millis();
        sort_comments(&mut results);

        info!(
            query = %query,
            store = %self.store.describe(),
            results = results.len(),
            match_ms = matched_ms,
            total_ms = start.elapsed().as_millis(),
            "search complete"
        );
        Ok(results)
    }

    /// Run `query` and slice out page `page` of `page_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the page is out of range.
    pub fn search_page(
        &self,
        query: &Query,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<Comment>, PageWindow)> {
        let results = self.search(query)?;
        let paginator = Paginator::new(results.len(), page_size);
        let slice = paginator.page(&results, page)?;
        Ok((slice.items.to_vec(), PageWindow::from(&slice)))
    }
}

/// Position of one page within a result list, detached from the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub page: usize,
    pub total_pages: usize,
    pub total_results: usize,
    /// 1-based position of the first shown item (0 when empty).
    pub first: usize,
    pub last: usize,
}

impl<T> From<&ResultPage<'_, T>> for PageWindow {
    fn from(page: &ResultPage<'_, T>) -> Self {
        Self {
            page: page.number,
            total_pages: page.total_pages,
            total_results: page.total_items,
            first: page.first_position(),
            last: page.last_position(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KasoError;
    use crate::storage::Storage;
    use crate::store::MemoryStore;

    fn comments() -> Vec<Comment> {
        vec![
            Comment::original(100, "alice", "2024-01-01T00:00:00Z", "scratch 猫"),
            Comment::reply(105, 100, "bob", "2024-01-03T00:00:00Z", "scratch reply"),
            Comment::reply(101, 100, "carol", "2024-01-02T00:00:00Z", "scratch 宣伝"),
            Comment::original(200, "dave", "2024-02-01T00:00:00Z", "scratch news"),
            Comment::original(150, "erin", "2024-01-15T00:00:00Z", "unrelated"),
        ]
    }

    fn ids(results: &[Comment]) -> Vec<i64> {
        results.iter().map(|c| c.id).collect()
    }

    #[test]
    fn results_are_ordered() {
        let engine = SearchEngine::new(MemoryStore::new(comments()));
        let results = engine.search(&Query::parse(None, Some("scratch"))).unwrap();
        assert_eq!(ids(&results), vec![200, 100, 101, 105]);
    }

    #[test]
    fn backends_agree() {
        let mut all = comments();
        all.extend([
            Comment::original(300, "ＦＵＬＬ", "2024-03-01T00:00:00Z", "ＳＣＲＡＴＣＨ最高"),
            Comment::original(301, "gus", "2024-03-02T00:00:00Z", "x\u{304B}\u{3099}y"),
            Comment::original(302, "hal", "2024-03-03T00:00:00Z", "%E3%81%8B%E3%82%99"),
        ]);
        let mut storage = Storage::open_memory().unwrap();
        storage.import_comments(&all).unwrap();
        let sql = SearchEngine::new(storage);
        let mem = SearchEngine::new(MemoryStore::new(all));

        for (author, text) in [
            (None, "scratch"),
            (None, "scratch -宣伝"),
            (None, "猫|news"),
            (None, ""),
            (None, "-scratch"),
            (None, "ｓｃｒａｔｃｈ"),
            (Some("ｆｕｌｌ"), ""),
            (None, "\u{304B}\u{3099}"),
            (None, "\u{304C} -x"),
        ] {
            let q = Query::parse(author, Some(text));
            assert_eq!(
                ids(&sql.search(&q).unwrap()),
                ids(&mem.search(&q).unwrap()),
                "query {q}"
            );
        }

        let full_width = Query::parse(None, Some("ｓｃｒａｔｃｈ"));
        assert_eq!(ids(&sql.search(&full_width).unwrap()), vec![300]);
        let decomposed = Query::parse(None, Some("\u{304B}\u{3099}"));
        assert_eq!(ids(&sql.search(&decomposed).unwrap()), vec![302, 301]);
    }

    #[test]
    fn search_page_window() {
        let engine = SearchEngine::new(MemoryStore::new(comments()));
        let (items, window) = engine.search_page(&Query::default(), 2, 2).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            window,
            PageWindow {
                page: 2,
                total_pages: 3,
                total_results: 5,
                first: 3,
                last: 4,
            }
        );
        let err = engine.search_page(&Query::default(), 4, 2).unwrap_err();
        assert!(matches!(err, KasoError::PageOutOfRange { page: 4, total: 3 }));
    }

    #[test]
    fn backend_parse() {
        assert_eq!(Backend::parse("SQLite"), Some(Backend::Sqlite));
        assert_eq!(Backend::parse("mem"), Some(Backend::Memory));
        assert_eq!(Backend::parse("tantivy"), None);
        assert_eq!(Backend::default().to_string(), "sqlite");
    }
}
