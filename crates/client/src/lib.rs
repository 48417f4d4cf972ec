//! Job execution and progress streaming client for the capgen backend.
//!
//! Starts one caption-generation job, follows its server-sent progress
//! stream, reconciles the stream into a job state machine with
//! cancellation, and cleans up upload temp directories afterwards.
//!
//! [`runner::JobRunner`] is the entry point. The binary entrypoint
//! lives in `main.rs`.

pub mod api;
pub mod backend;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod events;
pub mod launcher;
pub mod messages;
pub mod runner;
pub mod sse;
pub mod stream;
