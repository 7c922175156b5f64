//! Task scheduling
//!
//! [`DispatchLoop`] finds `New` tasks in the ledger and submits their ids to
//! the [`WorkerPool`], which hands them to idle workers one at a time.

pub mod dispatch;
pub mod pool;

pub use dispatch::{DispatchLoop, ScanReport};
pub use pool::{PoolError, PoolSettings, PoolState, WorkerPool};
