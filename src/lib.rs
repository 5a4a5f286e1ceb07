//! Carbonexia MRV library
//!
//! Baseline normalization for building energy use and the MRV
//! (measurement, reporting, verification) credit engine built on it.

pub mod baseline;
pub mod core;
pub mod db;
pub mod mrv;
pub mod store;
