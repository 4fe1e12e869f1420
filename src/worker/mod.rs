//! Request worker: drains the durable queue.
//!
//! Each delivery runs: validate, filter, presence on, memory fetch, generate,
//! presence off, deliver, record, then a detached memory write-back.

pub mod worker;

pub use worker::{ProcessOutcome, RequestWorker, WorkerDeps, DELIVERY_APOLOGY};
