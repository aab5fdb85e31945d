// src/query/static_client.rs

//! Fixture-backed query client.
//!
//! The real query engine is outside this crate's scope; the CLI binary runs
//! against canned results declared in `[result.<name>]` sections of the
//! workspace file instead. Each fixture is keyed by the exact query text it
//! answers.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::client::{QueryClient, QueryError, QueryResult};

/// Query client that serves pre-declared results keyed by query text.
///
/// Unknown statements produce a `QueryError::Execute`, which surfaces on the
/// leaf like any other query-service failure.
#[derive(Debug, Default)]
pub struct StaticQueryClient {
    results: HashMap<String, QueryResult>,
}

impl StaticQueryClient {
    pub fn new(results: HashMap<String, QueryResult>) -> Self {
        Self { results }
    }

    pub fn insert(&mut self, sql: impl Into<String>, result: QueryResult) {
        self.results.insert(sql.into(), result);
    }
}

impl QueryClient for StaticQueryClient {
    fn execute_sync<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<QueryResult, QueryError>> + Send + 'a>> {
        Box::pin(async move {
            match self.results.get(sql) {
                Some(result) => Ok(result.clone()),
                None => Err(QueryError::Execute(format!(
                    "no fixture result declared for query: {sql}"
                ))),
            }
        })
    }
}
