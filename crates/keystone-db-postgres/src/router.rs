//! Writer/reader routing.
//!
//! Routing is decided per statement. A statement goes to the writer when it
//! writes, or when the session is mid-flush (it holds uncommitted writes that
//! a following read must observe). Everything else goes to the reader.

use sqlx_postgres::PgPool;

/// Which pool a statement runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// The primary.
    Writer,
    /// The replica.
    Reader,
}

/// Read/write classification of a SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Only reads data.
    Read,
    /// Modifies data or schema, or takes row locks.
    Write,
}

const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "CREATE", "ALTER", "DROP", "TRUNCATE",
    "GRANT", "REVOKE", "COMMENT", "LOCK", "COPY", "CALL", "DO", "VACUUM", "REINDEX", "CLUSTER",
    "REFRESH", "SET", "RESET", "BEGIN", "START", "COMMIT", "ROLLBACK", "SAVEPOINT", "RELEASE",
    "PREPARE", "NOTIFY", "LISTEN",
];

const DATA_MODIFYING: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE"];

/// Classifies a SQL statement.
///
/// Leading comments and parentheses are skipped. `WITH` queries are writes
/// when any CTE modifies data. `SELECT ... FOR UPDATE/SHARE` is a write since
/// the lock must be taken on the primary.
#[must_use]
pub fn classify(sql: &str) -> StatementKind {
    let words = keywords(sql);
    let Some(first) = words.first() else {
        return StatementKind::Read;
    };

    let is_write = match first.as_str() {
        "SELECT" | "VALUES" | "TABLE" | "SHOW" | "EXPLAIN" => takes_row_lock(&words),
        "WITH" => {
            words.iter().any(|w| DATA_MODIFYING.contains(&w.as_str())) || takes_row_lock(&words)
        }
        other => WRITE_KEYWORDS.contains(&other),
    };

    if is_write {
        StatementKind::Write
    } else {
        StatementKind::Read
    }
}

fn takes_row_lock(words: &[String]) -> bool {
    words.windows(2).any(|pair| {
        pair[0] == "FOR" && matches!(pair[1].as_str(), "UPDATE" | "SHARE" | "NO" | "KEY")
    })
}

/// Upper-cased bare words of `sql`, skipping comments and quoted text.
fn keywords(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    let flush = |current: &mut String, words: &mut Vec<String>| {
        if !current.is_empty() {
            words.push(current.to_ascii_uppercase());
            current.clear();
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                flush(&mut current, &mut words);
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                flush(&mut current, &mut words);
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            '\'' | '"' => {
                flush(&mut current, &mut words);
                for q in chars.by_ref() {
                    if q == c {
                        break;
                    }
                }
            }
            c if c.is_ascii_alphanumeric() || c == '_' => current.push(c),
            _ => flush(&mut current, &mut words),
        }
    }
    flush(&mut current, &mut words);
    words
}

/// Holds the writer and reader pools.
///
/// Cheap to clone; pools are reference counted.
#[derive(Debug, Clone)]
pub struct SessionRouter {
    writer: PgPool,
    reader: PgPool,
}

impl SessionRouter {
    /// Creates a router over two pools.
    #[must_use]
    pub fn new(writer: PgPool, reader: PgPool) -> Self {
        Self { writer, reader }
    }

    /// Chooses the pool for `sql`.
    #[must_use]
    pub fn route(&self, sql: &str, flushing: bool) -> Route {
        if flushing || classify(sql) == StatementKind::Write {
            Route::Writer
        } else {
            Route::Reader
        }
    }

    /// Returns the pool for a route.
    #[must_use]
    pub fn pool(&self, route: Route) -> &PgPool {
        match route {
            Route::Writer => &self.writer,
            Route::Reader => &self.reader,
        }
    }

    /// The writer pool.
    #[must_use]
    pub fn writer(&self) -> &PgPool {
        &self.writer
    }

    /// The reader pool.
    #[must_use]
    pub fn reader(&self) -> &PgPool {
        &self.reader
    }

    /// Closes both pools.
    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads() {
        assert_eq!(classify("SELECT * FROM tokens"), StatementKind::Read);
        assert_eq!(classify("  select 1"), StatementKind::Read);
        assert_eq!(classify("(SELECT 1) UNION (SELECT 2)"), StatementKind::Read);
        assert_eq!(
            classify("WITH t AS (SELECT 1) SELECT * FROM t"),
            StatementKind::Read
        );
        assert_eq!(classify(""), StatementKind::Read);
    }

    #[test]
    fn test_writes() {
        assert_eq!(
            classify("INSERT INTO tokens (user_id) VALUES ($1)"),
            StatementKind::Write
        );
        assert_eq!(
            classify("update tokens set is_valid = false"),
            StatementKind::Write
        );
        assert_eq!(classify("DELETE FROM tokens"), StatementKind::Write);
        assert_eq!(classify("CREATE TABLE x (id int)"), StatementKind::Write);
        assert_eq!(
            classify("WITH gone AS (DELETE FROM t RETURNING id) SELECT * FROM gone"),
            StatementKind::Write
        );
    }

    #[test]
    fn test_locking_select_is_write() {
        assert_eq!(
            classify("SELECT * FROM tokens WHERE id = $1 FOR UPDATE"),
            StatementKind::Write
        );
        assert_eq!(
            classify("SELECT * FROM tokens FOR NO KEY UPDATE SKIP LOCKED"),
            StatementKind::Write
        );
    }

    #[test]
    fn test_comments_and_literals_ignored() {
        assert_eq!(
            classify("-- UPDATE everything\nSELECT 1"),
            StatementKind::Read
        );
        assert_eq!(
            classify("/* DELETE */ SELECT 'INSERT' AS \"UPDATE\""),
            StatementKind::Read
        );
        assert_eq!(
            classify("/* audit */ INSERT INTO log VALUES (1)"),
            StatementKind::Write
        );
    }
}
