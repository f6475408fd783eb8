//! Persistent article index over SQLite
//!
//! One database per newsgroup (`<group>.db`). Rows are written once through
//! conflict-ignore upserts keyed on `(group_name, article_num)`, so
//! re-fetching a range is idempotent and the first-written value always
//! wins. All writes go through a single writer task (see
//! [`index_group`](crate::indexer::index_group)); readers are unrestricted.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder};
use tracing::debug;

use crate::error::Result;
use crate::overview::OverviewRow;

/// SQLite's default bind-variable limit is 999; each row uses 10 binds,
/// so batches are chunked to 90 rows per INSERT.
const MAX_ROWS_PER_INSERT: usize = 90;

/// Filter for [`IndexStore::query`]
///
/// All substring matches are case-insensitive. Unset options do not
/// constrain the result; a filter with only `group_name` returns the full
/// group ordered by article number.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Newsgroup to query (required)
    pub group_name: String,
    /// Substring the subject must contain
    pub subject_like: Option<String>,
    /// Substring the subject must not contain
    pub not_subject: Option<String>,
    /// Substring the From header must contain
    pub from_like: Option<String>,
    /// Inclusive lower bound on `date_unix`
    pub date_from_unix: Option<i64>,
    /// Inclusive upper bound on `date_unix`
    pub date_to_unix: Option<i64>,
    /// Optional cap on the number of returned rows
    pub limit: Option<u32>,
}

impl QueryFilter {
    /// Filter matching every row of one group
    pub fn for_group(group: impl Into<String>) -> Self {
        Self {
            group_name: group.into(),
            ..Default::default()
        }
    }
}

/// Result of one [`IndexStore::upsert_batch`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Rows newly inserted
    pub inserted: u64,
    /// Rows skipped because their `(group_name, article_num)` key already existed
    pub ignored: u64,
}

/// Database row shape; converted to [`OverviewRow`] at the API boundary
#[derive(FromRow)]
struct ArticleRecord {
    group_name: String,
    article_num: i64,
    subject: String,
    from_addr: String,
    date_raw: String,
    date_unix: Option<i64>,
    message_id: String,
    bytes_len: Option<i64>,
    line_count: Option<i64>,
    xref: String,
}

impl From<ArticleRecord> for OverviewRow {
    fn from(record: ArticleRecord) -> Self {
        OverviewRow {
            article_num: record.article_num as u64,
            group_name: record.group_name,
            subject: record.subject,
            from_addr: record.from_addr,
            date_raw: record.date_raw,
            date_unix: record.date_unix,
            message_id: record.message_id,
            bytes_len: record.bytes_len.map(|b| b as u64),
            line_count: record.line_count.map(|l| l as u32),
            xref: record.xref,
        }
    }
}

/// SQLite-backed article index
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Open (creating if missing) the index database at `path`
    ///
    /// Enables WAL journaling and ensures the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Open the index database for one newsgroup under `dir`
    ///
    /// The file is named `<group>.db`, e.g. `alt.binaries.test.db`.
    pub async fn open_for_group(dir: &Path, group: &str) -> Result<Self> {
        Self::open(&dir.join(format!("{}.db", group))).await
    }

    /// Open an in-memory index (tests and dry runs)
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps every handle on the same in-memory
        // database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create the articles table and its secondary indexes if absent
    ///
    /// Idempotent; safe to call on every open.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                group_name  TEXT    NOT NULL,
                article_num INTEGER NOT NULL,
                subject     TEXT    NOT NULL DEFAULT '',
                from_addr   TEXT    NOT NULL DEFAULT '',
                date_raw    TEXT    NOT NULL DEFAULT '',
                date_unix   INTEGER,
                message_id  TEXT    NOT NULL,
                bytes_len   INTEGER,
                line_count  INTEGER,
                xref        TEXT    NOT NULL DEFAULT '',
                PRIMARY KEY (group_name, article_num)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Secondary indexes backing the query filters
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_subject ON articles (group_name, subject)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_from ON articles (group_name, from_addr)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_date ON articles (group_name, date_unix)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a batch of rows inside one transaction
    ///
    /// Conflicts on `(group_name, article_num)` are ignored, making
    /// re-fetches idempotent. Batches are chunked internally to stay within
    /// SQLite's bind-variable limit.
    pub async fn upsert_batch(&self, rows: &[OverviewRow]) -> Result<UpsertOutcome> {
        if rows.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in rows.chunks(MAX_ROWS_PER_INSERT) {
            let mut query_builder = QueryBuilder::new(
                "INSERT OR IGNORE INTO articles (group_name, article_num, subject, from_addr, \
                 date_raw, date_unix, message_id, bytes_len, line_count, xref) ",
            );

            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.group_name)
                    .push_bind(row.article_num as i64)
                    .push_bind(&row.subject)
                    .push_bind(&row.from_addr)
                    .push_bind(&row.date_raw)
                    .push_bind(row.date_unix)
                    .push_bind(&row.message_id)
                    .push_bind(row.bytes_len.map(|b| b as i64))
                    .push_bind(row.line_count.map(|l| l as i64))
                    .push_bind(&row.xref);
            });

            let result = query_builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        let outcome = UpsertOutcome {
            inserted,
            ignored: rows.len() as u64 - inserted,
        };
        debug!(
            "Upserted batch: {} inserted, {} ignored",
            outcome.inserted, outcome.ignored
        );
        Ok(outcome)
    }

    /// Query rows matching `filter`, ordered by `article_num` ascending
    pub async fn query(&self, filter: &QueryFilter) -> Result<Vec<OverviewRow>> {
        let mut query_builder = QueryBuilder::new(
            "SELECT group_name, article_num, subject, from_addr, date_raw, date_unix, \
             message_id, bytes_len, line_count, xref FROM articles WHERE group_name = ",
        );
        query_builder.push_bind(&filter.group_name);

        if let Some(subject_like) = &filter.subject_like {
            query_builder.push(" AND lower(subject) LIKE '%' || lower(");
            query_builder.push_bind(subject_like);
            query_builder.push(") || '%'");
        }
        if let Some(not_subject) = &filter.not_subject {
            query_builder.push(" AND lower(subject) NOT LIKE '%' || lower(");
            query_builder.push_bind(not_subject);
            query_builder.push(") || '%'");
        }
        if let Some(from_like) = &filter.from_like {
            query_builder.push(" AND lower(from_addr) LIKE '%' || lower(");
            query_builder.push_bind(from_like);
            query_builder.push(") || '%'");
        }
        if let Some(date_from) = filter.date_from_unix {
            query_builder.push(" AND date_unix >= ");
            query_builder.push_bind(date_from);
        }
        if let Some(date_to) = filter.date_to_unix {
            query_builder.push(" AND date_unix <= ");
            query_builder.push_bind(date_to);
        }

        query_builder.push(" ORDER BY article_num ASC");

        if let Some(limit) = filter.limit {
            query_builder.push(" LIMIT ");
            query_builder.push_bind(limit as i64);
        }

        let records: Vec<ArticleRecord> = query_builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        Ok(records.into_iter().map(OverviewRow::from).collect())
    }

    /// Total number of indexed rows for one group
    pub async fn count(&self, group: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE group_name = ?")
            .bind(group)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Close the underlying pool, flushing WAL state
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "alt.binaries.test";

    fn row(article_num: u64, subject: &str) -> OverviewRow {
        OverviewRow {
            article_num,
            group_name: GROUP.to_string(),
            subject: subject.to_string(),
            from_addr: "Alice <a@x>".to_string(),
            date_raw: "Mon, 01 Jan 2024 00:00:00 +0000".to_string(),
            date_unix: Some(1_704_067_200),
            message_id: format!("<m{}@x>", article_num),
            bytes_len: Some(42),
            line_count: Some(3),
            xref: String::new(),
        }
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = IndexStore::in_memory().await.unwrap();
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
        assert_eq!(store.count(GROUP).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_reports_inserted() {
        let store = IndexStore::in_memory().await.unwrap();
        let rows = vec![row(1, "one"), row(2, "two")];

        let outcome = store.upsert_batch(&rows).await.unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 2, ignored: 0 });
        assert_eq!(store.count(GROUP).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = IndexStore::in_memory().await.unwrap();
        let rows = vec![row(1, "one"), row(2, "two")];

        store.upsert_batch(&rows).await.unwrap();
        let second = store.upsert_batch(&rows).await.unwrap();

        assert_eq!(second, UpsertOutcome { inserted: 0, ignored: 2 });
        assert_eq!(store.count(GROUP).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_first_written_value_wins() {
        let store = IndexStore::in_memory().await.unwrap();
        store.upsert_batch(&[row(1, "original")]).await.unwrap();

        let mut replacement = row(1, "replacement");
        replacement.message_id = "<other@x>".to_string();
        let outcome = store.upsert_batch(&[replacement]).await.unwrap();
        assert_eq!(outcome.ignored, 1);

        let rows = store.query(&QueryFilter::for_group(GROUP)).await.unwrap();
        assert_eq!(rows[0].subject, "original");
        assert_eq!(rows[0].message_id, "<m1@x>");
    }

    #[tokio::test]
    async fn test_upsert_larger_than_one_statement() {
        let store = IndexStore::in_memory().await.unwrap();
        let rows: Vec<OverviewRow> = (1..=250).map(|n| row(n, "bulk")).collect();

        let outcome = store.upsert_batch(&rows).await.unwrap();
        assert_eq!(outcome.inserted, 250);
        assert_eq!(store.count(GROUP).await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_query_orders_by_article_num() {
        let store = IndexStore::in_memory().await.unwrap();
        store
            .upsert_batch(&[row(30, "c"), row(10, "a"), row(20, "b")])
            .await
            .unwrap();

        let rows = store.query(&QueryFilter::for_group(GROUP)).await.unwrap();
        let nums: Vec<u64> = rows.iter().map(|r| r.article_num).collect();
        assert_eq!(nums, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_query_subject_filter_case_insensitive() {
        let store = IndexStore::in_memory().await.unwrap();
        store
            .upsert_batch(&[row(1, "Hello World"), row(2, "HELLO again"), row(3, "other")])
            .await
            .unwrap();

        let filter = QueryFilter {
            subject_like: Some("hello".to_string()),
            ..QueryFilter::for_group(GROUP)
        };
        let rows = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].article_num, 1);
        assert_eq!(rows[1].article_num, 2);
    }

    #[tokio::test]
    async fn test_query_not_subject_excludes() {
        let store = IndexStore::in_memory().await.unwrap();
        store
            .upsert_batch(&[
                row(1, "ubuntu 24.04 release"),
                row(2, "Ubuntu BETA builds"),
                row(3, "debian"),
            ])
            .await
            .unwrap();

        let filter = QueryFilter {
            subject_like: Some("ubuntu".to_string()),
            not_subject: Some("beta".to_string()),
            ..QueryFilter::for_group(GROUP)
        };
        let rows = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].article_num, 1);
    }

    #[tokio::test]
    async fn test_query_from_filter() {
        let store = IndexStore::in_memory().await.unwrap();
        let mut bob = row(2, "post");
        bob.from_addr = "Bob <b@y>".to_string();
        store.upsert_batch(&[row(1, "post"), bob]).await.unwrap();

        let filter = QueryFilter {
            from_like: Some("bob".to_string()),
            ..QueryFilter::for_group(GROUP)
        };
        let rows = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].article_num, 2);
    }

    #[tokio::test]
    async fn test_query_date_window_inclusive() {
        let store = IndexStore::in_memory().await.unwrap();
        let mut early = row(1, "early");
        early.date_unix = Some(1000);
        let mut mid = row(2, "mid");
        mid.date_unix = Some(2000);
        let mut late = row(3, "late");
        late.date_unix = Some(3000);
        store.upsert_batch(&[early, mid, late]).await.unwrap();

        let filter = QueryFilter {
            date_from_unix: Some(1000),
            date_to_unix: Some(2000),
            ..QueryFilter::for_group(GROUP)
        };
        let rows = store.query(&filter).await.unwrap();
        let nums: Vec<u64> = rows.iter().map(|r| r.article_num).collect();
        assert_eq!(nums, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_query_limit() {
        let store = IndexStore::in_memory().await.unwrap();
        let rows: Vec<OverviewRow> = (1..=10).map(|n| row(n, "s")).collect();
        store.upsert_batch(&rows).await.unwrap();

        let filter = QueryFilter {
            limit: Some(3),
            ..QueryFilter::for_group(GROUP)
        };
        let rows = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].article_num, 1);
    }

    #[tokio::test]
    async fn test_query_other_group_is_empty() {
        let store = IndexStore::in_memory().await.unwrap();
        store.upsert_batch(&[row(1, "s")]).await.unwrap();

        let rows = store
            .query(&QueryFilter::for_group("alt.binaries.other"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_null_fields() {
        let store = IndexStore::in_memory().await.unwrap();
        let mut sparse = row(1, "sparse");
        sparse.date_unix = None;
        sparse.bytes_len = None;
        sparse.line_count = None;
        store.upsert_batch(&[sparse]).await.unwrap();

        let rows = store.query(&QueryFilter::for_group(GROUP)).await.unwrap();
        assert_eq!(rows[0].date_unix, None);
        assert_eq!(rows[0].bytes_len, None);
        assert_eq!(rows[0].line_count, None);
    }

    #[tokio::test]
    async fn test_open_for_group_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open_for_group(dir.path(), GROUP).await.unwrap();
        store.upsert_batch(&[row(1, "persisted")]).await.unwrap();
        store.close().await;

        assert!(dir.path().join(format!("{}.db", GROUP)).exists());

        let reopened = IndexStore::open_for_group(dir.path(), GROUP).await.unwrap();
        assert_eq!(reopened.count(GROUP).await.unwrap(), 1);
    }
}
