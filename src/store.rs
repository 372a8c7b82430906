//! Comment store abstraction.
//!
//! The [`CommentStore`] trait is the seam between the search pipeline and
//! the place comments live: a document loaded into memory
//! ([`MemoryStore`]) or the `SQLite` database ([`crate::storage::Storage`]).

use rayon::prelude::*;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{ArchiveDocument, Comment, StoreSummary};
use crate::query::Query;

/// Read access to a collection of comments.
pub trait CommentStore {
    /// Comments accepted by `query`, in unspecified order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn find(&self, query: &Query) -> Result<Vec<Comment>>;

    /// Every comment in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn all(&self) -> Result<Vec<Comment>>;

    /// Number of stored comments.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn count(&self) -> Result<usize>;

    /// Short human-readable label for logs.
    fn describe(&self) -> String;
}

impl<S: CommentStore + ?Sized> CommentStore for Arc<S> {
    fn find(&self, query: &Query) -> Result<Vec<Comment>> {
        (**self).find(query)
    }

    fn all(&self) -> Result<Vec<Comment>> {
        (**self).all()
    }

    fn count(&self) -> Result<usize> {
        (**self).count()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Comments held in memory, scanned in parallel on every search.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    comments: Vec<Comment>,
}

impl MemoryStore {
    #[must_use]
    pub const fn new(comments: Vec<Comment>) -> Self {
        Self { comments }
    }

    #[must_use]
    pub fn from_document(doc: ArchiveDocument) -> Self {
        Self::new(doc.into_comments())
    }

    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Counts and date bounds over the held comments.
    #[must_use]
    pub fn summary(&self) -> StoreSummary {
        summarize(&self.comments)
    }
}

impl CommentStore for MemoryStore {
    fn find(&self, query: &Query) -> Result<Vec<Comment>> {
        if query.is_unfiltered() {
            return Ok(self.comments.clone());
        }
        let predicate = query.compile();
        Ok(self
            .comments
            .par_iter()
            .filter(|c| predicate.matches(c))
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<Comment>> {
        Ok(self.comments.clone())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.comments.len())
    }

    fn describe(&self) -> String {
        format!("memory ({} comments)", self.comments.len())
    }
}

/// Compute counts and date bounds for a slice of comments.
#[must_use]
pub fn summarize(comments: &[Comment]) -> StoreSummary {
    let replies = comments.iter().filter(|c| c.is_reply).count();
    let total = comments.len();
    StoreSummary {
        comments_count: to_i64(total),
        originals_count: to_i64(total - replies),
        replies_count: to_i64(replies),
        first_comment_at: comments.iter().map(|c| c.datetime).min(),
        last_comment_at: comments.iter().map(|c| c.datetime).max(),
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
