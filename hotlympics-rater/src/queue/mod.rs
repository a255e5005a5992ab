//! Prefetching pair queue

mod block_queue;
mod types;

pub use block_queue::BlockQueue;
pub use types::{QueueFailure, QueueSnapshot, QueueStats, QueueStatus, RefillOutcome};
