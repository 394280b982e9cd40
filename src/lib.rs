//! Spectral telemetry pipeline.
//!
//! Producers send JSON batches of sensor readings tagged by metric id over
//! plain TCP. The collector reassembles the unframed messages, appends each
//! batch to a bounded per-metric sliding window, computes confidence
//! statistics and a radix-2 magnitude spectrum over the window, optionally
//! persists the spectrum, and answers every request with one ordered reply.

pub mod collector;
pub mod config;
pub mod export;
pub mod producer;
pub mod spectral;
pub mod stats;
pub mod store;
pub mod wire;
pub mod writer;
