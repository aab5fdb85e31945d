// src/query/mod.rs

//! Opaque query-service boundary.
//!
//! The execution engine treats the backing query engine as a service that
//! executes resolved statements and returns typed rows/columns or an error.
//! - [`client`] defines the `QueryClient` trait plus the result/error types.
//! - [`static_client`] is a fixture-backed implementation used by the CLI
//!   binary and in examples; real deployments plug in their own client.

pub mod client;
pub mod static_client;

pub use client::{CellValue, QueryClient, QueryError, QueryResult, Row};
pub use static_client::StaticQueryClient;
