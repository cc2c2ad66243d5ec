//! Bounded worker pool on plain OS threads
//!
//! # Features
//! - Request/result queues, bounded or unbounded
//! - Scaling up and down at runtime
//! - Cooperative dismissal: a worker never abandons a job it is running
//! - Panics and errors inside jobs become failed outcomes
//! - Graceful shutdown, sync or from inside a tokio runtime
//! - Metrics snapshots and periodic monitoring

pub mod errors;
pub mod logging;
pub mod model;
pub mod pool;
pub mod queue;
pub mod result;
pub mod worker;

pub use errors::{JobError, PoolError};
pub use model::{Job, JobBuilder, JobId, PoolMetrics};
pub use pool::{Config, ThreadPool};
pub use queue::WorkQueue;
pub use result::{Outcome, PoolResult};
pub use worker::{Worker, WorkerState};
