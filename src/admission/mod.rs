//! Admission control for in-flight calls and buffered bytes
//!
//! Two process-wide gates bound resource usage across all concurrent
//! transfers: [`BucketLimiter`] caps the number of in-flight calls per
//! bucket, and [`MemoryLimiter`] caps the bytes buffered in memory. Both are
//! owned by the transfer manager instance and shared by reference.

mod bucket;
mod memory;

pub use bucket::{BucketLimiter, BucketPermit};
pub use memory::{MemoryLimiter, MemoryReservation};
