//! # Cairn Exec
//! Streaming tuple operators over the cairn storage engine. Every operator is
//! a single-producer stream with the same shape: open, has_next, next,
//! rewind, close, plus a schema descriptor. All page access goes through the
//! buffer pool of the transaction driving the plan.

/// Grouped aggregation and its per-type aggregators.
pub mod aggregate;
/// Operator-level error types.
pub mod errors;
/// The operator trait and the materialized tuple iterator.
pub mod executor;
/// Relational select over a child operator.
pub mod filter;
/// Tuple insertion through the buffer pool.
pub mod insert;
/// Sequential scan over a heap file.
pub mod seq_scan;

pub use aggregate::{Aggregate, AggregateOp};
pub use errors::{ExecResult, ExecutionError};
pub use executor::{OpIterator, TupleIterator};
pub use filter::{Filter, Predicate};
pub use insert::Insert;
pub use seq_scan::SeqScan;
