//! `SQLite` storage for archived comments.
//!
//! The store is a single `comments` table with indexes on the columns the
//! search and thread lookups touch. Content queries are compiled from the
//! query AST into fixed `instr` templates over the `kaso_fold` function
//! registered on every connection; user text is only ever bound as a
//! parameter.

use crate::encoding::fold;
use crate::error::{KasoError, Result};
use crate::model::{Comment, StoreSummary, parse_datetime, parse_datetime_or_epoch};
use crate::query::{FOLD_FUNCTION, Query};
use crate::store::CommentStore;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags, Row, params, params_from_iter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;

const REQUIRED_COLUMNS: &[&str] = &["id", "user", "datetime", "content", "is_reply", "parent_id"];

const SELECT_COLUMNS: &str = "SELECT id, user, datetime, content, is_reply, parent_id FROM comments";

/// `SQLite` storage manager
#[derive(Debug)]
pub struct Storage {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        register_functions(&conn)?;

        let storage = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        storage.migrate()?;
        Ok(storage)
    }

    /// Open a store that must already be materialized on disk.
    ///
    /// # Errors
    ///
    /// Returns [`KasoError::StoreNotFound`] when the file does not exist,
    /// or a database error if it cannot be opened.
    pub fn open_existing(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(KasoError::store_not_found(path));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        register_functions(&conn)?;
        let storage = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        storage.migrate()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        register_functions(&conn)?;
        let storage = Self { conn, path: None };
        storage.migrate()?;
        Ok(storage)
    }

    /// Get a reference to the underlying database connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&self) -> Result<()> {
        let current_version = self.get_schema_version();

        if current_version > SCHEMA_VERSION {
            return Err(KasoError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: current_version,
            });
        }

        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: rusqlite::Result<i32> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat missing schema table as version 0.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                user TEXT NOT NULL,
                datetime TEXT NOT NULL,
                content TEXT NOT NULL,
                is_reply INTEGER NOT NULL DEFAULT 0,
                parent_id INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_comments_user ON comments(user);
            CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
            CREATE INDEX IF NOT EXISTS idx_comments_datetime ON comments(datetime);
            ",
        )?;
        Ok(())
    }

    /// Check that the `comments` table carries every column the queries use.
    ///
    /// # Errors
    ///
    /// Returns [`KasoError::UnknownArchiveFormat`] naming the missing columns.
    pub fn validate(&self) -> Result<()> {
        check_columns(&self.conn)
    }

    /// Check a database file's `comments` columns without migrating it.
    ///
    /// Run this on foreign databases before [`Storage::open_existing`],
    /// which would otherwise add schema objects to them.
    ///
    /// # Errors
    ///
    /// Returns [`KasoError::StoreNotFound`] for a missing file,
    /// [`KasoError::UnknownArchiveFormat`] for missing columns, or a
    /// database error if the file is not a readable database.
    pub fn validate_file(db_path: impl AsRef<Path>) -> Result<()> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(KasoError::store_not_found(path));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        check_columns(&conn)
    }

    /// Store comments in one transaction, replacing rows with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is written in that case.
    pub fn import_comments(&mut self, comments: &[Comment]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(
                r"
                INSERT OR REPLACE INTO comments (id, user, datetime, content, is_reply, parent_id)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )?;

            for comment in comments {
                stmt.execute(params![
                    comment.id,
                    comment.user,
                    comment.datetime_raw,
                    comment.content,
                    i32::from(comment.is_reply),
                    comment.parent_id,
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        info!("Stored {} comments", count);
        Ok(count)
    }

    /// Search with a query compiled to parameterized SQL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn search(&self, query: &Query) -> Result<Vec<Comment>> {
        let filter = query.to_sql();
        let sql = format!("{SELECT_COLUMNS} WHERE {}", filter.clause);
        debug!(sql = %sql, params = filter.params.len(), "comment search");

        let mut stmt = self.conn.prepare(&sql)?;
        let comments = stmt
            .query_map(params_from_iter(filter.params.iter()), comment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(comments)
    }

    /// Get a comment by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        let result = self.conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?"),
            params![id],
            comment_from_row,
        );

        match result {
            Ok(comment) => Ok(Some(comment)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replies attached to `parent_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_replies(&self, parent_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE parent_id = ? ORDER BY datetime ASC, id ASC"
        ))?;
        let replies = stmt
            .query_map(params![parent_id], comment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(replies)
    }

    /// The conversation containing `id`: its top-level comment and all replies.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_thread(&self, id: i64) -> Result<Vec<Comment>> {
        let Some(comment) = self.get_comment(id)? else {
            return Ok(Vec::new());
        };

        let root_id = comment.group_key();
        let mut thread = Vec::new();
        if let Some(root) = self.get_comment(root_id)? {
            thread.push(root);
        }
        thread.extend(self.get_replies(root_id)?);
        if thread.is_empty() {
            thread.push(comment);
        }
        Ok(thread)
    }

    /// Every stored comment in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_all_comments(&self) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
        let comments = stmt
            .query_map([], comment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(comments)
    }

    /// Counts and date bounds in a single query.
    ///
    /// # Errors
    ///
    /// Returns an error if the consolidated query fails.
    pub fn get_summary(&self) -> Result<StoreSummary> {
        let query = r"
            SELECT
                COUNT(*) AS comments_count,
                COALESCE(SUM(CASE WHEN is_reply = 0 THEN 1 ELSE 0 END), 0) AS originals_count,
                COALESCE(SUM(CASE WHEN is_reply != 0 THEN 1 ELSE 0 END), 0) AS replies_count,
                MIN(datetime) AS first_comment_at,
                MAX(datetime) AS last_comment_at
            FROM comments
        ";

        Ok(self.conn.query_row(query, [], |row| {
            let first: Option<String> = row.get(3)?;
            let last: Option<String> = row.get(4)?;
            Ok(StoreSummary {
                comments_count: row.get(0)?,
                originals_count: row.get(1)?,
                replies_count: row.get(2)?,
                first_comment_at: first.as_deref().and_then(parse_datetime),
                last_comment_at: last.as_deref().and_then(parse_datetime),
            })
        })?)
    }

    /// Apply safe, idempotent database optimizations.
    ///
    /// # Errors
    ///
    /// Returns an error if any pragma fails.
    pub fn optimize(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            PRAGMA optimize;
            PRAGMA wal_checkpoint(TRUNCATE);
            ",
        )?;
        Ok(())
    }
}

fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        FOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| fold(&text))),
    )?;
    Ok(())
}

fn check_columns(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(comments)")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<_>>()?;

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !columns.iter().any(|have| have.eq_ignore_ascii_case(c)))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(KasoError::UnknownArchiveFormat {
            hint: Some(format!("comments table lacks {}", missing.join(", "))),
        })
    }
}

impl CommentStore for Storage {
    fn find(&self, query: &Query) -> Result<Vec<Comment>> {
        self.search(query)
    }

    fn all(&self) -> Result<Vec<Comment>> {
        self.get_all_comments()
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn describe(&self) -> String {
        self.path.as_ref().map_or_else(
            || "sqlite (in-memory)".to_string(),
            |p| format!("sqlite ({})", p.display()),
        )
    }
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let datetime_raw: String = row.get(2)?;
    let parent_id: Option<i64> = row.get(5)?;
    Ok(Comment {
        id: row.get(0)?,
        user: row.get(1)?,
        datetime: parse_datetime_or_epoch(&datetime_raw),
        datetime_raw,
        content: row.get(3)?,
        is_reply: row.get::<_, i64>(4)? != 0 || parent_id.is_some(),
        parent_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Comment> {
        vec![
            Comment::original(1, "alice", "2024-01-01T00:00:00Z", "scratchで猫を動かす"),
            Comment::reply(2, 1, "bob", "2024-01-02T00:00:00Z", "scratch 宣伝です"),
            Comment::original(3, "Carol", "2024-01-03T00:00:00Z", "不具合がある"),
            Comment::reply(4, 3, "dave", "2024-01-04T00:00:00Z", "バグを見つけた"),
            Comment::original(5, "erin", "2024-01-05T00:00:00Z", "問題ない"),
            Comment::original(6, "frank", "2024-01-06T00:00:00Z", "%E7%8C%AB%E3%81%A0"),
            Comment::original(7, "gina", "2024-01-07T00:00:00Z", "&lt;b&gt; bold"),
            Comment::original(8, "hank", "2024-01-08T00:00:00Z", "100% 本当"),
            Comment::original(9, "ivan", "2024-01-09T00:00:00Z", "100 ok"),
        ]
    }

    fn store() -> Storage {
        let mut storage = Storage::open_memory().unwrap();
        storage.import_comments(&sample()).unwrap();
        storage
    }

    fn ids(storage: &Storage, author: Option<&str>, text: Option<&str>) -> Vec<i64> {
        let mut ids: Vec<i64> = storage
            .search(&Query::parse(author, text))
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_create_database() {
        let storage = Storage::open_memory().unwrap();
        assert_eq!(storage.count().unwrap(), 0);
        storage.validate().unwrap();
    }

    #[test]
    fn test_import_and_retrieve() {
        let storage = store();
        assert_eq!(storage.count().unwrap(), 9);
        let reply = storage.get_comment(2).unwrap().unwrap();
        assert!(reply.is_reply);
        assert_eq!(reply.parent_id, Some(1));
        assert_eq!(reply.datetime_raw, "2024-01-02T00:00:00Z");
        assert!(storage.get_comment(99).unwrap().is_none());
    }

    #[test]
    fn test_import_replaces_same_id() {
        let mut storage = store();
        storage
            .import_comments(&[Comment::original(5, "erin", "2024-01-05T00:00:00Z", "edited")])
            .unwrap();
        assert_eq!(storage.count().unwrap(), 9);
        assert_eq!(storage.get_comment(5).unwrap().unwrap().content, "edited");
    }

    #[test]
    fn test_search_matches_memory_semantics() {
        let storage = store();
        assert_eq!(ids(&storage, None, Some("scratch -宣伝")), vec![1]);
        assert_eq!(ids(&storage, None, Some("バグ|不具合")), vec![3, 4]);
        assert_eq!(ids(&storage, None, Some("猫")), vec![1, 6]);
        assert_eq!(ids(&storage, None, Some("<b>")), vec![7]);
        assert_eq!(ids(&storage, Some("CAROL"), None), vec![3]);
        assert_eq!(ids(&storage, Some("a"), Some("scratch")), vec![1]);
    }

    #[test]
    fn test_wildcard_characters_are_literal() {
        let storage = store();
        assert_eq!(ids(&storage, None, Some("100%")), vec![8]);
        assert_eq!(ids(&storage, None, Some("_")), Vec::<i64>::new());
    }

    #[test]
    fn test_search_folds_case_and_composition() {
        let mut storage = Storage::open_memory().unwrap();
        storage
            .import_comments(&[
                Comment::original(1, "ＫＡＳＯ", "2024-01-01T00:00:00Z", "ＳＣＲＡＴＣＨ最高"),
                Comment::original(2, "x", "2024-01-02T00:00:00Z", "x\u{304B}\u{3099}y"),
                Comment::original(3, "y", "2024-01-03T00:00:00Z", "%E3%81%8B%E3%82%99"),
                Comment::original(4, "z", "2024-01-04T00:00:00Z", "x\u{304C}y"),
            ])
            .unwrap();

        assert_eq!(ids(&storage, None, Some("ｓｃｒａｔｃｈ")), vec![1]);
        assert_eq!(ids(&storage, Some("ｋａｓｏ"), None), vec![1]);
        assert_eq!(ids(&storage, None, Some("\u{304B}\u{3099}")), vec![2, 3, 4]);
        assert_eq!(ids(&storage, None, Some("\u{304C}")), vec![2, 3, 4]);
        assert_eq!(ids(&storage, None, Some("-\u{304C}")), vec![1]);
    }

    #[test]
    fn test_unfiltered_search_returns_all() {
        let storage = store();
        assert_eq!(ids(&storage, None, None).len(), 9);
        assert_eq!(ids(&storage, None, Some("バグ|")).len(), 9);
    }

    #[test]
    fn test_get_thread_from_reply() {
        let storage = store();
        let thread = storage.get_thread(4).unwrap();
        let ids: Vec<i64> = thread.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert!(storage.get_thread(404).unwrap().is_empty());
    }

    #[test]
    fn test_summary() {
        let summary = store().get_summary().unwrap();
        assert_eq!(summary.comments_count, 9);
        assert_eq!(summary.originals_count, 7);
        assert_eq!(summary.replies_count, 2);
        assert_eq!(
            summary.first_comment_at,
            parse_datetime("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_summary_empty() {
        let summary = Storage::open_memory().unwrap().get_summary().unwrap();
        assert_eq!(summary.comments_count, 0);
        assert!(summary.first_comment_at.is_none());
    }

    #[test]
    fn test_validate_rejects_foreign_table() {
        let storage = Storage::open_memory().unwrap();
        storage
            .connection()
            .execute_batch("DROP TABLE comments; CREATE TABLE comments (id INTEGER, body TEXT);")
            .unwrap();
        let err = storage.validate().unwrap_err();
        assert!(err.to_string().contains("user"));
    }

    #[test]
    fn test_open_existing_requires_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Storage::open_existing(dir.path().join("missing.db"))
            .err()
            .unwrap();
        assert!(matches!(err, KasoError::StoreNotFound { .. }));
    }

    #[test]
    fn test_schema_version_from_newer_build_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kaso.db");
        {
            let storage = Storage::open(&path).unwrap();
            storage.set_schema_version(SCHEMA_VERSION + 1).unwrap();
        }
        let err = Storage::open_existing(&path).err().unwrap();
        assert!(matches!(err, KasoError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_validate_file_leaves_foreign_database_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("foreign.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE comments (id INTEGER, body TEXT);")
                .unwrap();
        }

        let err = Storage::validate_file(&path).unwrap_err();
        assert!(matches!(err, KasoError::UnknownArchiveFormat { .. }));
        assert!(err.to_string().contains("user"));

        let conn = Connection::open(&path).unwrap();
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE name = 'meta'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(tables, 0);
    }
}
