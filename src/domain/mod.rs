//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - resolver input/output (`BondQuerySpec`, `YieldQuote`, `SourceKind`)
//! - the normalized per-source result (`RawObservation`)
//! - market quotes for non-bond instruments (`PriceQuote`, `ChartRange`)

pub mod types;

pub use types::*;
