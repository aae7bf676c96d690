//! Core infrastructure for faultline.
//!
//! This crate provides the process-free half of the repair-predicate pipeline:
//! - Use sites handed over by the Java parser
//! - Feature items, the ordered feature registry, and row extraction
//! - The deduplication ledger shared across predict calls
//! - Candidate conditions and the left/right condition sets
//! - The condition-expression parser and legality filter
//! - Error types and error codes

pub mod condition;
pub mod error;
pub mod feature;
pub mod filter;
pub mod ledger;
pub mod site;
pub mod types;
