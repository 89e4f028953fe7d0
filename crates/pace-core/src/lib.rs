//! Core types and the circle alignment/streak engine for Pace.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.
//!
//! The engine is generic over [`store::AlignmentStore`], the abstraction over
//! the document store that holds alignment records, circles, and the derived
//! per-circle aggregates. Backends (e.g. `pace-store-sqlite`) implement the
//! trait; the modules here implement the semantics:
//!
//! - [`members`] — membership resolution with coach exclusion
//! - [`stats`] — per-day average alignment across a circle's members
//! - [`percentile`] — rank among all circles by today's average
//! - [`history`] — day-by-day contribution timeline with a read-through cache
//! - [`streak`] — the consecutive-kept-days counter
//! - [`cache`] — the same-day-plus-TTL cache in front of the aggregator

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod alignment;
pub mod cache;
pub mod circle;
pub mod dates;
pub mod error;
pub mod history;
pub mod members;
pub mod percentile;
pub mod stats;
pub mod store;
pub mod streak;

pub use error::{Error, Result};
