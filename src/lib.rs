//! `kr-yields` library crate.
//!
//! The binary (`yq`) is a thin wrapper around this library so that:
//!
//! - the resolver and every source are testable without spawning processes
//! - other front-ends can reuse `YieldResolver` and the market snapshot directly

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod logging;
pub mod market;
pub mod report;
pub mod resolver;
