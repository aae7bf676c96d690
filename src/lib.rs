//! Faultline: feature extraction and repair-predicate synthesis
//!
//! Turns Java use sites into fixed-schema feature rows, runs them through an
//! external model, and keeps the legal candidate conditions it proposes.

// Core infrastructure - re-exported from faultline-core
pub use faultline_core::condition;
pub use faultline_core::feature;
pub use faultline_core::filter;
pub use faultline_core::ledger;
pub use faultline_core::site;
pub use faultline_core::types;

// Process-facing round trip
pub mod predict;
pub mod runner;
pub mod subject;
pub mod tsv;

// Front door
pub mod error;
pub mod output;
