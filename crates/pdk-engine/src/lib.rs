//! pdk-engine
//!
//! The live execution engine: one periodic tick task per running algorithm.
//! Each tick fetches quotes for the configured symbols, evaluates the
//! algorithm's rules in order, and submits resulting fills to the ledger.
//!
//! Which algorithms are running is tracked through a [`RunnerRegistry`]:
//! the in-memory implementation suits a single process, the lease-backed
//! one coordinates replicas through the database.

mod engine;
pub mod eval;
mod registry;

pub use engine::{engine_error, EngineError, LiveEngine};
pub use registry::{InMemoryRegistry, LeaseRegistry, RunnerRegistry};
