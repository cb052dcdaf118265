//! # Autoflow Queue
//! Durable delay scheduler: persists delayed action executions, then runs
//! them via short-delay in-process timers plus a periodic poll loop. The
//! durable rows are the source of truth; timers only shave latency.

pub mod queue;

pub use queue::{ActionExecutor, DelayQueue};
