//! In-memory SQLite implementation of [`QueryEngine`].

use async_trait::async_trait;
use indexmap::IndexMap;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, InterruptHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tabula_types::{quote_identifier, Dataset, QueryOutcome, TabularData, Value, TABLE_NAME};
use tracing::{debug, info, warn};

use crate::{EngineError, QueryEngine};

/// Result rows kept per query.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

const DEFAULT_MAX_CACHED: usize = 8;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connections kept per dataset version.
const MAX_IDLE: usize = 4;

/// A dataset version and the read-only connections loaded with it.
///
/// Each query checks out a connection of its own, so queries on the same
/// dataset never wait on each other. The idle lock is held only to pop or
/// push a connection.
struct LoadedTable {
    data: Arc<TabularData>,
    idle: Mutex<Vec<Connection>>,
}

impl LoadedTable {
    fn load(data: Arc<TabularData>) -> Result<Self, EngineError> {
        let conn = open_loaded(&data)?;
        Ok(Self {
            data,
            idle: Mutex::new(vec![conn]),
        })
    }

    fn checkout(&self) -> Result<Connection, EngineError> {
        let idle = self.idle.lock().map_err(|_| EngineError::Poisoned)?.pop();
        match idle {
            Some(conn) => Ok(conn),
            None => {
                debug!(rows = self.data.row_count(), "opening another connection");
                open_loaded(&self.data)
            }
        }
    }

    fn checkin(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_IDLE {
                idle.push(conn);
            }
        }
    }
}

/// A private in-memory database holding `data`, switched to read-only.
fn open_loaded(data: &TabularData) -> Result<Connection, EngineError> {
    if data.columns.is_empty() {
        return Err(EngineError::NoColumns);
    }

    let mut conn = Connection::open_in_memory()?;

    let definitions: Vec<String> = data
        .columns
        .iter()
        .map(|c| match affinity(data.declared_type(c)) {
            Some(ty) => format!("{} {}", quote_identifier(c), ty),
            None => quote_identifier(c),
        })
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({});",
        TABLE_NAME,
        definitions.join(", ")
    ))?;

    let placeholders = vec!["?"; data.columns.len()].join(", ");
    let statement = format!("INSERT INTO {} VALUES ({})", TABLE_NAME, placeholders);
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&statement)?;
        for row in &data.rows {
            stmt.execute(rusqlite::params_from_iter(row.iter().map(to_sql)))?;
        }
    }
    tx.commit()?;

    conn.execute_batch("PRAGMA query_only = ON;")?;
    Ok(conn)
}

/// Per-query state shared with the blocking worker.
///
/// `interrupt` is set only while this query's statement runs; the worker
/// clears it before the connection can serve anyone else.
#[derive(Default)]
struct QueryGuard {
    cancelled: AtomicBool,
    interrupt: Mutex<Option<InterruptHandle>>,
}

impl QueryGuard {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(slot) = self.interrupt.lock() {
            if let Some(handle) = slot.as_ref() {
                handle.interrupt();
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Sandboxed SQL engine over in-memory SQLite.
///
/// Loaded datasets are cached by fingerprint, oldest evicted first.
pub struct SqliteEngine {
    tables: Mutex<IndexMap<String, Arc<LoadedTable>>>,
    max_rows: usize,
    max_cached: usize,
    timeout: Duration,
}

impl SqliteEngine {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(IndexMap::new()),
            max_rows: DEFAULT_MAX_ROWS,
            max_cached: DEFAULT_MAX_CACHED,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn with_max_cached(mut self, max_cached: usize) -> Self {
        self.max_cached = max_cached.max(1);
        self
    }

    /// Number of datasets currently loaded.
    pub fn cached_tables(&self) -> usize {
        self.lock_tables().map(|t| t.len()).unwrap_or(0)
    }

    fn lock_tables(&self) -> Result<MutexGuard<'_, IndexMap<String, Arc<LoadedTable>>>, EngineError> {
        self.tables.lock().map_err(|_| EngineError::Poisoned)
    }

    async fn table_for(&self, dataset: &Dataset) -> Result<Arc<LoadedTable>, EngineError> {
        let cached = self.lock_tables()?.get(&dataset.fingerprint).cloned();
        if let Some(table) = cached {
            return Ok(table);
        }

        let started = Instant::now();
        let data = Arc::clone(&dataset.data);
        let loaded = Arc::new(tokio::task::spawn_blocking(move || LoadedTable::load(data)).await??);
        info!(
            dataset = %dataset.id,
            rows = dataset.data.row_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded dataset into query engine"
        );

        // A concurrent load may have won; keep whichever landed first.
        let mut tables = self.lock_tables()?;
        let table = tables
            .entry(dataset.fingerprint.clone())
            .or_insert(loaded)
            .clone();
        while tables.len() > self.max_cached {
            tables.shift_remove_index(0);
        }
        Ok(table)
    }

    async fn try_execute(&self, sql: &str, dataset: &Dataset) -> Result<QueryOutcome, EngineError> {
        let table = self.table_for(dataset).await?;
        let sql = sql.trim().trim_end_matches(';').trim().to_string();
        let max_rows = self.max_rows;
        let guard = Arc::new(QueryGuard::default());

        let worker = {
            let guard = Arc::clone(&guard);
            tokio::task::spawn_blocking(move || -> Result<QueryOutcome, EngineError> {
                let conn = table.checkout()?;
                {
                    let mut slot = guard.interrupt.lock().map_err(|_| EngineError::Poisoned)?;
                    if guard.is_cancelled() {
                        return Err(EngineError::Timeout(0));
                    }
                    *slot = Some(conn.get_interrupt_handle());
                }
                let result = run_query(&conn, &sql, max_rows);
                if let Ok(mut slot) = guard.interrupt.lock() {
                    *slot = None;
                }
                // An interrupted connection is dropped rather than reused
                if !guard.is_cancelled() {
                    table.checkin(conn);
                }
                Ok(result?)
            })
        };

        match tokio::time::timeout(self.timeout, worker).await {
            Ok(joined) => joined?,
            Err(_) => {
                guard.cancel();
                Err(EngineError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }
}

impl Default for SqliteEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryEngine for SqliteEngine {
    async fn execute(&self, sql: &str, dataset: &Dataset) -> QueryOutcome {
        let started = Instant::now();
        match self.try_execute(sql, dataset).await {
            Ok(outcome) => {
                debug!(
                    rows = outcome.rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "query executed"
                );
                outcome
            }
            Err(e) => {
                if matches!(e, EngineError::Timeout(_)) {
                    warn!(dataset = %dataset.id, "query timed out");
                } else {
                    debug!(error = %e, "query failed");
                }
                QueryOutcome::error(e.to_string())
            }
        }
    }

    fn evict(&self, fingerprint: &str) {
        if let Ok(mut tables) = self.lock_tables() {
            tables.shift_remove(fingerprint);
        }
    }
}

fn run_query(conn: &Connection, sql: &str, max_rows: usize) -> Result<QueryOutcome, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= max_rows {
            break;
        }
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(from_sql(row.get_ref(i)?));
        }
        out.push(values);
    }

    Ok(QueryOutcome::ok(columns, out))
}

/// Column affinity from a declared type name.
fn affinity(declared: Option<&str>) -> Option<&'static str> {
    let t = declared?.to_ascii_lowercase();
    if t.contains("int") || t.contains("bool") {
        Some("INTEGER")
    } else if ["float", "double", "real", "decimal", "numeric", "number"]
        .iter()
        .any(|k| t.contains(k))
    {
        Some("REAL")
    } else if ["char", "text", "str", "object", "date", "time", "category"]
        .iter()
        .any(|k| t.contains(k))
    {
        Some("TEXT")
    } else {
        None
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) if f.is_nan() => SqlValue::Null,
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Dataset {
        let data = TabularData::new(
            vec!["region".into(), "month".into(), "sales".into()],
            vec![
                vec!["east".into(), "2024-01".into(), Value::Int(100)],
                vec!["east".into(), "2024-02".into(), Value::Int(150)],
                vec!["west".into(), "2024-01".into(), Value::Float(80.5)],
                vec!["west".into(), "2024-02".into(), Value::Null],
            ],
        );
        Dataset::new("sales", data)
    }

    #[tokio::test]
    async fn test_aggregate_query() {
        let engine = SqliteEngine::new();
        let outcome = engine
            .execute(
                "SELECT region, SUM(sales) AS total FROM data GROUP BY region ORDER BY region;",
                &sales(),
            )
            .await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.columns, vec!["region", "total"]);
        assert_eq!(outcome.rows[0], vec![Value::text("east"), Value::Int(250)]);
        assert_eq!(outcome.rows[1][1], Value::Float(80.5));
    }

    #[tokio::test]
    async fn test_cte_and_window_functions() {
        let engine = SqliteEngine::new();
        let sql = "WITH m AS (SELECT month, SUM(sales) AS s FROM data GROUP BY month) \
                   SELECT month, s, SUM(s) OVER (ORDER BY month) AS running FROM m";
        let outcome = engine.execute(sql, &sales()).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[1][2], Value::Float(330.5));
    }

    #[tokio::test]
    async fn test_unknown_column_is_structured_error() {
        let engine = SqliteEngine::new();
        let outcome = engine.execute("SELECT revenue FROM data", &sales()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("no such column"));
    }

    #[tokio::test]
    async fn test_connection_is_read_only() {
        let engine = SqliteEngine::new();
        let dataset = sales();
        let outcome = engine.execute("DELETE FROM data", &dataset).await;
        assert!(!outcome.success);
        let count = engine.execute("SELECT COUNT(*) FROM data", &dataset).await;
        assert_eq!(count.rows[0][0], Value::Int(4));
    }

    #[tokio::test]
    async fn test_empty_table_queries_succeed() {
        let engine = SqliteEngine::new();
        let dataset = Dataset::new("empty", TabularData::new(vec!["a".into(), "b".into()], vec![]));
        let outcome = engine.execute("SELECT * FROM data", &dataset).await;
        assert!(outcome.success);
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.columns, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_row_cap_and_eviction() {
        let engine = SqliteEngine::new().with_max_rows(2).with_max_cached(1);
        let dataset = sales();
        let outcome = engine.execute("SELECT * FROM data", &dataset).await;
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(engine.cached_tables(), 1);

        let other = Dataset::new("other", TabularData::new(vec!["x".into()], vec![vec![Value::Int(1)]]));
        engine.execute("SELECT * FROM data", &other).await;
        assert_eq!(engine.cached_tables(), 1);

        engine.evict(&other.fingerprint);
        assert_eq!(engine.cached_tables(), 0);
    }

    const ENDLESS: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                           SELECT COUNT(*) FROM c";

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_query_does_not_block_same_dataset() {
        let engine = SqliteEngine::new().with_timeout(Duration::from_secs(2));
        let dataset = sales();
        engine.execute("SELECT 1", &dataset).await;

        let slow = engine.execute(ENDLESS, &dataset);
        let fast = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let started = Instant::now();
            let outcome = engine.execute("SELECT COUNT(*) FROM data", &dataset).await;
            (outcome, started.elapsed())
        };
        let (slow, (fast, elapsed)) = tokio::join!(slow, fast);

        assert!(fast.success, "{:?}", fast.error);
        assert_eq!(fast.rows[0][0], Value::Int(4));
        assert!(elapsed < Duration::from_secs(1), "fast query waited {:?}", elapsed);
        assert!(slow.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_does_not_leak_into_next_query() {
        let engine = SqliteEngine::new().with_timeout(Duration::from_millis(300));
        let dataset = sales();

        let timed_out = engine.execute(ENDLESS, &dataset).await;
        assert!(!timed_out.success);

        for _ in 0..3 {
            let outcome = engine.execute("SELECT SUM(sales) FROM data", &dataset).await;
            assert!(outcome.success, "{:?}", outcome.error);
        }
    }

    #[test]
    fn test_affinity_from_declared_types() {
        assert_eq!(affinity(Some("int64")), Some("INTEGER"));
        assert_eq!(affinity(Some("float64")), Some("REAL"));
        assert_eq!(affinity(Some("datetime64[ns]")), Some("TEXT"));
        assert_eq!(affinity(Some("blob")), None);
        assert_eq!(affinity(None), None);
    }
}
