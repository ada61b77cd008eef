//! Pullstream: model pull progress engine
//!
//! Starts model pulls on a model-hosting backend, decodes the progress it
//! streams back over either transport, and turns it into an ordered sequence
//! of typed progress events with at most one active pull per model.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod progress;
