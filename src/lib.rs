//! `gaia-xp-classifier` library crate.
//!
//! The binary (`xpc`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable with in-memory collaborators
//! - a transport layer (HTTP, queue worker) can reuse `app::pipeline` directly

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod quality;
pub mod report;
pub mod resolve;
