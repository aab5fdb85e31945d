use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use checktree::query::{CellValue, QueryClient, QueryError, QueryResult, Row};

/// Scripted behaviour for one statement.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return the result immediately.
    Respond(QueryResult),
    /// Sleep, then return the result.
    RespondAfter(Duration, QueryResult),
    /// Fail with an execute error.
    Fail(String),
    /// Panic inside the query call.
    Panic(String),
    /// Never complete (until the run context cancels the caller).
    Hang,
}

/// A fake query client that:
/// - records which statements were executed, in order
/// - tracks the maximum number of concurrent in-flight calls
/// - responds per statement according to a configured `Script`.
///
/// Statements with no script fail, so tests notice unexpected queries.
pub struct FakeQueryClient {
    scripts: Mutex<HashMap<String, Script>>,
    executed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeQueryClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, sql: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(sql.to_string(), script);
    }

    /// Statements executed so far, in start order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Highest number of concurrently in-flight calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, sql: &str) {
        self.executed.lock().unwrap().push(sql.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl QueryClient for FakeQueryClient {
    fn execute_sync<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<QueryResult, QueryError>> + Send + 'a>> {
        let script = self.scripts.lock().unwrap().get(sql).cloned();
        Box::pin(async move {
            self.enter(sql);
            let outcome = match script {
                Some(Script::Respond(result)) => Ok(result),
                Some(Script::RespondAfter(delay, result)) => {
                    tokio::time::sleep(delay).await;
                    Ok(result)
                }
                Some(Script::Fail(message)) => Err(QueryError::Execute(message)),
                Some(Script::Panic(message)) => {
                    self.leave();
                    panic!("{message}");
                }
                Some(Script::Hang) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                None => Err(QueryError::Execute(format!(
                    "no script configured for statement: {sql}"
                ))),
            };
            self.leave();
            outcome
        })
    }
}

/// A result with a single `status` column, one row per given status.
pub fn status_rows(statuses: &[&str]) -> QueryResult {
    QueryResult {
        columns: vec!["status".to_string()],
        rows: statuses
            .iter()
            .map(|status| {
                let mut row = Row::default();
                row.cells.insert(
                    "status".to_string(),
                    CellValue::Text(status.to_string()),
                );
                row
            })
            .collect(),
    }
}

/// A single-row result with the given column/value pairs.
pub fn single_row(pairs: &[(&str, CellValue)]) -> QueryResult {
    let mut row = Row::default();
    let mut columns = Vec::new();
    for (column, value) in pairs {
        columns.push(column.to_string());
        row.cells.insert(column.to_string(), value.clone());
    }
    QueryResult {
        columns,
        rows: vec![row],
    }
}
