//! In-process adapters for development runs and tests.
//!
//! They honour the same contracts as the Postgres adapters, including the
//! unique slug constraint and keyed job collapsing, and expose switches to
//! simulate an unreachable backend.

mod posts;
mod queue;

pub use posts::MemoryPostStore;
pub use queue::MemoryJobQueue;
