//! SQLite history of AI reviews, one record per pull request.
//!
//! Saving a review for a PR that already has one replaces it, comments
//! included. Timestamps are stored as RFC 3339 UTC text so they compare
//! lexically.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use prpilot_core::{AiComment, AiReview, PrPilotError, PullRequest};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A persisted AI review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReview {
    pub id: i64,
    pub pr_number: u64,
    pub pr_title: String,
    pub pr_author: String,
    pub summary: String,
    pub score: f64,
    pub suggestions: Vec<String>,
    pub issues: Vec<String>,
    pub comments: Vec<AiComment>,
    /// Model that produced the review.
    pub model: String,
    pub processing_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredReview {
    /// The review payload without storage metadata.
    pub fn review(&self) -> AiReview {
        AiReview {
            summary: self.summary.clone(),
            score: self.score,
            suggestions: self.suggestions.clone(),
            issues: self.issues.clone(),
            comments: self.comments.clone(),
        }
    }
}

/// Review count per PR author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorCount {
    pub author: String,
    pub count: u64,
}

/// Aggregates over the stored reviews.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatistics {
    pub total_reviews: u64,
    /// Mean score rounded to two decimals, `0.0` when empty.
    pub average_score: f64,
    /// Reviews created in the last seven days.
    pub recent_reviews: u64,
    pub reviews_by_author: Vec<AuthorCount>,
}

/// Metadata recorded alongside a saved review.
#[derive(Debug, Clone, Default)]
pub struct SaveMeta<'a> {
    pub model: &'a str,
    pub processing_time_ms: Option<u64>,
}

/// SQLite-backed review history.
///
/// # Examples
///
/// ```
/// use prpilot_review::store::ReviewStore;
///
/// let store = ReviewStore::in_memory().unwrap();
/// assert!(store.get(1).unwrap().is_none());
/// assert_eq!(store.statistics().unwrap().total_reviews, 0);
/// ```
pub struct ReviewStore {
    conn: Mutex<Connection>,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> PrPilotError + '_ {
    move |e| PrPilotError::Database(format!("{context}: {e}"))
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const REVIEW_COLUMNS: &str = "id, pr_number, pr_title, pr_author, summary, score, \
     suggestions, issues, model, processing_time_ms, created_at, updated_at";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<StoredReview> {
    let pr_number: i64 = row.get(1)?;
    let processing: Option<i64> = row.get(9)?;
    Ok(StoredReview {
        id: row.get(0)?,
        pr_number: pr_number.max(0) as u64,
        pr_title: row.get(2)?,
        pr_author: row.get(3)?,
        summary: row.get(4)?,
        score: row.get(5)?,
        suggestions: json_column(row, 6)?,
        issues: json_column(row, 7)?,
        comments: Vec::new(),
        model: row.get(8)?,
        processing_time_ms: processing.map(|p| p.max(0) as u64),
        created_at: time_column(row, 10)?,
        updated_at: time_column(row, 11)?,
    })
}

impl ReviewStore {
    /// Open or create the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Database`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, PrPilotError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PrPilotError::Database(format!("failed to create store directory: {e}"))
            })?;
        }
        let conn = Connection::open(path).map_err(db_err("failed to open database"))?;
        Self::init(conn)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, PrPilotError> {
        let conn =
            Connection::open_in_memory().map_err(db_err("failed to create in-memory database"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, PrPilotError> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS ai_reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pr_number INTEGER NOT NULL UNIQUE,
                pr_title TEXT NOT NULL,
                pr_author TEXT NOT NULL,
                summary TEXT NOT NULL,
                score REAL NOT NULL,
                suggestions TEXT NOT NULL,
                issues TEXT NOT NULL,
                model TEXT NOT NULL,
                processing_time_ms INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ai_review_comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                review_id INTEGER NOT NULL REFERENCES ai_reviews(id) ON DELETE CASCADE,
                body TEXT NOT NULL,
                file_path TEXT,
                line_number INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_comments_review ON ai_review_comments(review_id);
            ",
        )
        .map_err(db_err("failed to create schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PrPilotError> {
        self.conn
            .lock()
            .map_err(|_| PrPilotError::Database("review store lock poisoned".into()))
    }

    /// Insert or replace the review for `pr`.
    ///
    /// The original `created_at` is kept when a review is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Database`] on SQLite failures.
    pub fn save(
        &self,
        pr: &PullRequest,
        review: &AiReview,
        meta: SaveMeta<'_>,
    ) -> Result<StoredReview, PrPilotError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("failed to begin transaction"))?;
        let now = timestamp(Utc::now());

        tx.execute(
            "INSERT INTO ai_reviews
                (pr_number, pr_title, pr_author, summary, score, suggestions, issues,
                 model, processing_time_ms, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(pr_number) DO UPDATE SET
                pr_title = excluded.pr_title,
                pr_author = excluded.pr_author,
                summary = excluded.summary,
                score = excluded.score,
                suggestions = excluded.suggestions,
                issues = excluded.issues,
                model = excluded.model,
                processing_time_ms = excluded.processing_time_ms,
                updated_at = excluded.updated_at",
            params![
                pr.number as i64,
                pr.title,
                pr.author,
                review.summary,
                review.score,
                serde_json::to_string(&review.suggestions)?,
                serde_json::to_string(&review.issues)?,
                meta.model,
                meta.processing_time_ms.map(|p| p as i64),
                now,
            ],
        )
        .map_err(db_err("failed to save review"))?;

        let id: i64 = tx
            .query_row(
                "SELECT id FROM ai_reviews WHERE pr_number = ?1",
                params![pr.number as i64],
                |row| row.get(0),
            )
            .map_err(db_err("failed to read saved review"))?;

        tx.execute("DELETE FROM ai_review_comments WHERE review_id = ?1", params![id])
            .map_err(db_err("failed to replace comments"))?;
        for comment in &review.comments {
            tx.execute(
                "INSERT INTO ai_review_comments (review_id, body, file_path, line_number)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, comment.body, comment.path, comment.line.map(|l| l as i64)],
            )
            .map_err(db_err("failed to save comment"))?;
        }
        tx.commit().map_err(db_err("failed to commit review"))?;

        tracing::debug!(pr = pr.number, comments = review.comments.len(), "saved AI review");
        Self::load(&conn, pr.number)?
            .ok_or_else(|| PrPilotError::Database("saved review disappeared".into()))
    }

    /// The stored review for PR `number`.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Database`] on SQLite failures.
    pub fn get(&self, number: u64) -> Result<Option<StoredReview>, PrPilotError> {
        let conn = self.lock()?;
        Self::load(&conn, number)
    }

    fn load(conn: &Connection, number: u64) -> Result<Option<StoredReview>, PrPilotError> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM ai_reviews WHERE pr_number = ?1");
        let review = conn
            .query_row(&sql, params![number as i64], review_from_row)
            .optional()
            .map_err(db_err("failed to read review"))?;
        match review {
            Some(mut review) => {
                review.comments = Self::comments(conn, review.id)?;
                Ok(Some(review))
            }
            None => Ok(None),
        }
    }

    fn comments(conn: &Connection, review_id: i64) -> Result<Vec<AiComment>, PrPilotError> {
        let mut stmt = conn
            .prepare(
                "SELECT body, file_path, line_number FROM ai_review_comments
                 WHERE review_id = ?1 ORDER BY id",
            )
            .map_err(db_err("failed to prepare comment query"))?;
        let rows = stmt
            .query_map(params![review_id], |row| {
                let line: Option<i64> = row.get(2)?;
                Ok(AiComment {
                    body: row.get(0)?,
                    path: row.get(1)?,
                    line: line.map(|l| l.max(0) as u64),
                })
            })
            .map_err(db_err("failed to read comments"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(db_err("failed to read comments"))
    }

    fn query_reviews(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<StoredReview>, PrPilotError> {
        let mut stmt = conn.prepare(sql).map_err(db_err("failed to prepare query"))?;
        let rows = stmt
            .query_map(params, review_from_row)
            .map_err(db_err("failed to list reviews"))?;
        let mut reviews = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err("failed to list reviews"))?;
        for review in &mut reviews {
            review.comments = Self::comments(conn, review.id)?;
        }
        Ok(reviews)
    }

    /// Up to `limit` reviews, most recently created first.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Database`] on SQLite failures.
    pub fn list(&self, limit: usize) -> Result<Vec<StoredReview>, PrPilotError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM ai_reviews ORDER BY created_at DESC, id DESC LIMIT ?1"
        );
        Self::query_reviews(&conn, &sql, params![limit as i64])
    }

    /// Reviews whose PR title or summary contains `query`, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Database`] on SQLite failures.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<StoredReview>, PrPilotError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM ai_reviews
             WHERE instr(lower(pr_title), lower(?1)) > 0 OR instr(lower(summary), lower(?1)) > 0
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        );
        Self::query_reviews(&conn, &sql, params![query.trim(), limit as i64])
    }

    /// Delete the review for PR `number`; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Database`] on SQLite failures.
    pub fn delete(&self, number: u64) -> Result<bool, PrPilotError> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM ai_reviews WHERE pr_number = ?1",
                params![number as i64],
            )
            .map_err(db_err("failed to delete review"))?;
        Ok(removed > 0)
    }

    /// # Errors
    ///
    /// Returns [`PrPilotError::Database`] on SQLite failures.
    pub fn statistics(&self) -> Result<ReviewStatistics, PrPilotError> {
        let conn = self.lock()?;
        let (total, average): (i64, Option<f64>) = conn
            .query_row("SELECT COUNT(*), AVG(score) FROM ai_reviews", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(db_err("failed to compute statistics"))?;

        let cutoff = timestamp(Utc::now() - Duration::days(7));
        let recent: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ai_reviews WHERE created_at >= ?1",
                params![cutoff],
                |row| row.get(0),
            )
            .map_err(db_err("failed to compute statistics"))?;

        let mut stmt = conn
            .prepare(
                "SELECT pr_author, COUNT(*) AS n FROM ai_reviews
                 GROUP BY pr_author ORDER BY n DESC, pr_author",
            )
            .map_err(db_err("failed to compute statistics"))?;
        let by_author = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok(AuthorCount {
                    author: row.get(0)?,
                    count: count.max(0) as u64,
                })
            })
            .map_err(db_err("failed to compute statistics"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err("failed to compute statistics"))?;

        Ok(ReviewStatistics {
            total_reviews: total.max(0) as u64,
            average_score: average.map(|a| (a * 100.0).round() / 100.0).unwrap_or(0.0),
            recent_reviews: recent.max(0) as u64,
            reviews_by_author: by_author,
        })
    }
}
