//! Domain types for the capgen job client.
//!
//! Pure data and validation with no I/O: job configuration assembly,
//! job handles and states, result bundles, transcript classification.

pub mod assemble;
pub mod catalog;
pub mod error;
pub mod job;
pub mod job_events;
pub mod transcript;
pub mod types;
