//! Parallel execution engine.
//!
//! The executor schedules one task per profile under a bounded pool, the
//! stream module multiplexes their output into a single ordered display,
//! and the approval module gates the mutating pass behind operator review.

pub mod approval;
pub mod executor;
pub mod stream;

pub use executor::{ExecutionPlan, ExecutionResult, Executor};
pub use stream::StreamEvent;
