//! Session reconstruction and time attribution.
//!
//! Turns a fetched, time-ordered batch of GUI events into session groups,
//! attributed intervals, per-employee statistics and pooled counts. All of
//! it is synchronous and in-memory; fetching happens in [`crate::service`].

pub mod aggregator;
pub mod attribution;
pub mod payloads;
pub mod pooled;
pub mod sessions;
pub mod types;

pub use aggregator::*;
pub use attribution::*;
pub use payloads::*;
pub use pooled::*;
pub use sessions::*;
pub use types::*;
