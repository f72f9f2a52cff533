//! Small building blocks shared by the workspace crates:
//! a bounded worker pool, text budgeting helpers and session/run ids.

pub mod ids;
pub mod pool;
pub mod text;

pub use pool::{PoolError, WorkerPool};
