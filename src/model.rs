//! Data models for archived Scratch comments.
//!
//! The archive document nests replies under their top-level comment; the
//! rest of the crate works on the flattened [`Comment`] form where every
//! reply carries the id of its parent.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single comment, either a top-level post or a reply to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub user: String,
    pub datetime: DateTime<Utc>,
    /// Timestamp exactly as the source reported it.
    pub datetime_raw: String,
    pub content: String,
    pub is_reply: bool,
    pub parent_id: Option<i64>,
}

impl Comment {
    /// Build a top-level comment.
    pub fn original(
        id: i64,
        user: impl Into<String>,
        datetime: &str,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user: user.into(),
            datetime: parse_datetime_or_epoch(datetime),
            datetime_raw: datetime.to_string(),
            content: content.into(),
            is_reply: false,
            parent_id: None,
        }
    }

    /// Build a reply attached to `parent_id`.
    pub fn reply(
        id: i64,
        parent_id: i64,
        user: impl Into<String>,
        datetime: &str,
        content: impl Into<String>,
    ) -> Self {
        Self {
            is_reply: true,
            parent_id: Some(parent_id),
            ..Self::original(id, user, datetime, content)
        }
    }

    /// Key shared by a top-level comment and all of its replies.
    #[must_use]
    pub fn group_key(&self) -> i64 {
        self.parent_id.unwrap_or(self.id)
    }
}

/// Top-level shape of a comment archive document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveDocument {
    #[serde(default)]
    pub comments: Vec<CommentThread>,
}

/// A top-level comment together with its replies, as stored in the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    pub id: i64,
    pub user: String,
    pub datetime: String,
    pub content: String,
    #[serde(default)]
    pub replies: Vec<RawReply>,
}

/// A reply entry inside a [`CommentThread`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReply {
    pub id: i64,
    pub user: String,
    pub datetime: String,
    pub content: String,
}

impl ArchiveDocument {
    /// Flatten threads into comments: each parent followed by its replies.
    #[must_use]
    pub fn into_comments(self) -> Vec<Comment> {
        let mut comments = Vec::with_capacity(
            self.comments.len() + self.comments.iter().map(|t| t.replies.len()).sum::<usize>(),
        );
        for thread in self.comments {
            let parent = Comment::original(thread.id, thread.user, &thread.datetime, thread.content);
            comments.push(parent);
            comments.extend(thread.replies.into_iter().map(|r| {
                Comment::reply(r.id, thread.id, r.user, &r.datetime, r.content)
            }));
        }
        comments
    }
}

const fn epoch_utc() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Parse a source timestamp.
///
/// Accepts RFC 3339 and the naive `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS`
/// forms (interpreted as UTC).
#[must_use]
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parse a source timestamp, falling back to the Unix epoch.
#[must_use]
pub fn parse_datetime_or_epoch(value: &str) -> DateTime<Utc> {
    parse_datetime(value).unwrap_or_else(epoch_utc)
}

/// Aggregate view of a comment store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSummary {
    pub comments_count: i64,
    pub originals_count: i64,
    pub replies_count: i64,
    pub first_comment_at: Option<DateTime<Utc>>,
    pub last_comment_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn flatten_keeps_parent_before_replies() {
        let doc: ArchiveDocument = serde_json::from_str(
            r#"{"comments":[
                {"id":1,"user":"a","datetime":"2024-01-01T00:00:00Z","content":"hi",
                 "replies":[{"id":3,"user":"b","datetime":"2024-01-01T01:00:00Z","content":"yo"}]},
                {"id":2,"user":"c","datetime":"2024-01-02T00:00:00Z","content":"x"}
            ]}"#,
        )
        .unwrap();

        let comments = doc.into_comments();
        let ids: Vec<i64> = comments.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(comments[1].parent_id, Some(1));
        assert!(comments[1].is_reply);
        assert_eq!(comments[2].parent_id, None);
    }

    #[test]
    fn group_key_uses_parent() {
        let parent = Comment::original(10, "a", "2024-01-01T00:00:00Z", "p");
        let reply = Comment::reply(11, 10, "b", "2024-01-01T00:00:00Z", "r");
        assert_eq!(parent.group_key(), 10);
        assert_eq!(reply.group_key(), 10);
    }

    #[test]
    fn parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).single().unwrap();
        assert_eq!(parse_datetime("2024-03-05T12:30:00Z"), Some(expected));
        assert_eq!(parse_datetime("2024-03-05T21:30:00+09:00"), Some(expected));
        assert_eq!(parse_datetime("2024-03-05 12:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-03-05T12:30:00.000"), Some(expected));
        assert_eq!(parse_datetime("yesterday"), None);
        assert_eq!(parse_datetime_or_epoch("garbage"), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn document_without_comments_is_empty() {
        let doc: ArchiveDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.into_comments().is_empty());
    }
}
