//! Deterministic ordering of matched comments.
//!
//! Comments are grouped by [`Comment::group_key`] so that a top-level
//! comment and its replies form one contiguous block. Groups run from the
//! highest key to the lowest (most recently started conversations first);
//! inside a group comments run oldest to newest. Ties fall back to putting
//! the top-level comment first, then to ascending id, which makes the order
//! total.

use std::cmp::{Ordering, Reverse};

use crate::model::Comment;

/// Compare two comments by presentation order.
#[must_use]
pub fn compare(a: &Comment, b: &Comment) -> Ordering {
    Reverse(a.group_key())
        .cmp(&Reverse(b.group_key()))
        .then_with(|| a.datetime.cmp(&b.datetime))
        .then_with(|| a.is_reply.cmp(&b.is_reply))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort comments in place into presentation order.
pub fn sort_comments(comments: &mut [Comment]) {
    comments.sort_by(compare);
}
