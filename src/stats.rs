//! Archive statistics.
//!
//! Counts over an optional inclusive date range: totals, reply rate, the
//! most active users and comments per day.

use crate::error::{KasoError, Result};
use crate::model::Comment;
use chrono::NaiveDate;
use itertools::Itertools;
use serde::Serialize;

/// Default number of users in the ranking.
pub const DEFAULT_TOP_USERS: usize = 20;

/// Inclusive calendar-day range; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DateRange {
    /// Parse `YYYY-MM-DD` bounds.
    ///
    /// # Errors
    ///
    /// Returns [`KasoError::InvalidArgument`] for malformed dates or when
    /// `since` is after `until`.
    pub fn parse(since: Option<&str>, until: Option<&str>) -> Result<Self> {
        let range = Self {
            since: since.map(parse_day).transpose()?,
            until: until.map(parse_day).transpose()?,
        };
        if let (Some(s), Some(u)) = (range.since, range.until) {
            if s > u {
                return Err(KasoError::invalid_argument(format!(
                    "--since {s} is after --until {u}"
                )));
            }
        }
        Ok(range)
    }

    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.since.is_none_or(|s| day >= s) && self.until.is_none_or(|u| day <= u)
    }
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| {
        KasoError::invalid_argument(format!("invalid date '{s}' (expected YYYY-MM-DD): {e}"))
    })
}

/// Comment count for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCount {
    pub user: String,
    pub count: u64,
}

/// Comment count for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// Aggregate statistics over a set of comments.
#[derive(Debug, Clone, Serialize)]
pub struct CommentStats {
    pub range: DateRange,
    pub total: u64,
    pub originals: u64,
    pub replies: u64,
    /// Percentage of replies, rounded to two decimals; 0 when empty.
    pub reply_rate: f64,
    pub top_users: Vec<UserCount>,
    pub daily_counts: Vec<DailyCount>,
}

impl CommentStats {
    /// Compute statistics for the comments that fall inside `range`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(comments: &[Comment], range: DateRange, top_n: usize) -> Self {
        let filtered: Vec<&Comment> = comments
            .iter()
            .filter(|c| range.contains(c.datetime.date_naive()))
            .collect();

        let total = filtered.len() as u64;
        let replies = filtered.iter().filter(|c| c.is_reply).count() as u64;
        let reply_rate = if total == 0 {
            0.0
        } else {
            (replies as f64 / total as f64 * 10_000.0).round() / 100.0
        };

        let top_users = filtered
            .iter()
            .map(|c| c.user.as_str())
            .counts()
            .into_iter()
            .sorted_by(|(ua, ca), (ub, cb)| cb.cmp(ca).then_with(|| ua.cmp(ub)))
            .take(top_n)
            .map(|(user, count)| UserCount {
                user: user.to_string(),
                count: count as u64,
            })
            .collect();

        let daily_counts = filtered
            .iter()
            .map(|c| c.datetime.date_naive())
            .counts()
            .into_iter()
            .sorted_by_key(|(date, _)| *date)
            .map(|(date, count)| DailyCount {
                date,
                count: count as u64,
            })
            .collect();

        Self {
            range,
            total,
            originals: total - replies,
            replies,
            reply_rate,
            top_users,
            daily_counts,
        }
    }

    /// Day with the most comments; the earliest one on ties.
    #[must_use]
    pub fn busiest_day(&self) -> Option<&DailyCount> {
        self.daily_counts
            .iter()
            .rev()
            .max_by_key(|d| d.count)
    }
}
