//! Durable job queue on Redis Streams.
//!
//! This crate provides:
//! - Job enqueueing with submission-level dedup
//! - Consumer-group delivery with a visibility-timeout lease
//! - Reclaiming leases of crashed workers
//! - Dead letter queue and pre-pickup removal
//! - An idempotency ledger for externally visible side effects

pub mod error;
pub mod idempotency;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use idempotency::{effect_key, IdempotencyLedger, MemoryLedger, RedisLedger};
pub use job::ClipJob;
pub use queue::{JobQueue, QueueConfig};
