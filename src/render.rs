//! Text rendering of comments and result pages.
//!
//! Stored content may still carry HTML entities or percent-escapes from
//! earlier transport steps; everything shown to a reader goes through
//! [`decode_for_display`] first. Raw content is only used for matching.

use crate::encoding::decode_for_display;
use crate::model::Comment;
use crate::search::PageWindow;
use serde::Serialize;
use std::io::{self, Write};

/// Marker placed in front of replies.
pub const REPLY_MARKER: &str = "↳ ";

/// One comment on one line:
/// `↳ ID:<id> [<datetime>] <user>: <content> (reply to ID:<parent>)`.
///
/// The marker and the trailing parent reference appear only on replies.
#[must_use]
pub fn format_comment_line(comment: &Comment) -> String {
    let prefix = if comment.is_reply { REPLY_MARKER } else { "" };
    let content = single_line(&decode_for_display(&comment.content));
    let mut line = format!(
        "{prefix}ID:{} [{}] {}: {content}",
        comment.id, comment.datetime_raw, comment.user
    );
    if let Some(parent) = comment.parent_id {
        line.push_str(&format!(" (reply to ID:{parent})"));
    }
    line
}

/// `<id> | <user> | <content>` cut to `max_chars` of content.
#[must_use]
pub fn format_compact(comment: &Comment, max_chars: usize) -> String {
    format!(
        "{} | {} | {}",
        comment.id,
        comment.user,
        truncate(&single_line(&decode_for_display(&comment.content)), max_chars)
    )
}

/// `N results` headline.
#[must_use]
pub fn format_result_count(total: usize) -> String {
    if total == 1 {
        "1 result".to_string()
    } else {
        format!("{total} results")
    }
}

/// `showing a - b / N`, plus the page position.
#[must_use]
pub fn format_window(window: &PageWindow) -> String {
    format!(
        "showing {} - {} / {} (page {}/{})",
        window.first, window.last, window.total_results, window.page, window.total_pages
    )
}

/// Wrap decoded content for the detailed view.
#[must_use]
pub fn wrap_content(comment: &Comment, width: usize) -> Vec<String> {
    textwrap::wrap(&decode_for_display(&comment.content), width)
        .into_iter()
        .map(std::borrow::Cow::into_owned)
        .collect()
}

/// Serializable view of a comment with its content decoded.
#[derive(Debug, Clone, Serialize)]
pub struct CommentView<'a> {
    pub id: i64,
    pub user: &'a str,
    pub datetime: &'a str,
    pub content: String,
    pub is_reply: bool,
    pub parent_id: Option<i64>,
}

impl<'a> From<&'a Comment> for CommentView<'a> {
    fn from(c: &'a Comment) -> Self {
        Self {
            id: c.id,
            user: &c.user,
            datetime: &c.datetime_raw,
            content: decode_for_display(&c.content),
            is_reply: c.is_reply,
            parent_id: c.parent_id,
        }
    }
}

/// JSON envelope for one page of search results.
#[derive(Debug, Serialize)]
pub struct PageView<'a> {
    pub query: String,
    #[serde(flatten)]
    pub window: PageWindow,
    pub comments: Vec<CommentView<'a>>,
}

/// Write comments as CSV with a header row.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn write_csv(out: &mut impl Write, comments: &[Comment]) -> io::Result<()> {
    writeln!(out, "id,user,datetime,is_reply,parent_id,content")?;
    for c in comments {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            c.id,
            csv_field(&c.user),
            csv_field(&c.datetime_raw),
            c.is_reply,
            c.parent_id.map(|p| p.to_string()).unwrap_or_default(),
            csv_field(&decode_for_display(&c.content)),
        )?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn single_line(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_line_has_marker_and_parent() {
        let c = Comment::reply(12, 10, "bob", "2024-01-02 03:04:05", "%E7%8C%AB &amp; 犬");
        assert_eq!(
            format_comment_line(&c),
            "↳ ID:12 [2024-01-02 03:04:05] bob: 猫 & 犬 (reply to ID:10)"
        );
    }

    #[test]
    fn original_line_is_plain() {
        let c = Comment::original(10, "alice", "2024-01-01T00:00:00Z", "line1\nline2");
        assert_eq!(
            format_comment_line(&c),
            "ID:10 [2024-01-01T00:00:00Z] alice: line1 line2"
        );
    }

    #[test]
    fn undecodable_content_is_shown_unescaped() {
        let c = Comment::original(1, "u", "t", "&lt;b&gt;%FF");
        assert_eq!(format_comment_line(&c), "ID:1 [t] u: <b>%FF");
    }

    #[test]
    fn window_text() {
        let w = PageWindow {
            page: 3,
            total_pages: 3,
            total_results: 450,
            first: 401,
            last: 450,
        };
        assert_eq!(format_window(&w), "showing 401 - 450 / 450 (page 3/3)");
        assert_eq!(format_result_count(450), "450 results");
        assert_eq!(format_result_count(1), "1 result");
    }

    #[test]
    fn csv_quotes_when_needed() {
        let comments = vec![
            Comment::original(1, "a", "t", "plain"),
            Comment::reply(2, 1, "b", "t", "say \"hi\", ok"),
        ];
        let mut out = Vec::new();
        write_csv(&mut out, &comments).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "1,a,t,false,,plain");
        assert_eq!(lines[2], "2,b,t,true,1,\"say \"\"hi\"\", ok\"");
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("猫猫猫猫猫", 5), "猫猫猫猫猫");
        assert_eq!(truncate("猫猫猫猫猫猫", 5), "猫猫...");
    }

    #[test]
    fn json_view_decodes_content() {
        let c = Comment::original(1, "u", "t", "&quot;x&quot;");
        let json = serde_json::to_string(&CommentView::from(&c)).unwrap();
        assert!(json.contains(r#""content":"\"x\"""#));
    }
}
