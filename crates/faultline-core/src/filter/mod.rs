//! Legality filtering for model-proposed conditions.
//!
//! Conditions are parsed into a small Java expression tree ([`CondExpr`]) and
//! judged by a [`LegalityFilter`]. The default policy,
//! [`JavaLegalityFilter`], only admits conditions that would compile as a
//! guard at the use site.
//!
//! ## Usage
//!
//! ```
//! use std::collections::BTreeSet;
//! use faultline_core::filter::{JavaLegalityFilter, LegalityFilter};
//!
//! let legal: BTreeSet<String> = ["x".to_string()].into_iter().collect();
//! let filter = JavaLegalityFilter::new();
//!
//! assert!(filter.is_legal_expr(Some("String"), "x", "x == null", &legal, Some("Foo")));
//! assert!(!filter.is_legal_expr(Some("int"), "x", "x == null", &legal, Some("Foo")));
//! ```

mod expr;
mod legality;

// Re-export public API from expression module
pub use expr::{parse_condition, BinaryOp, CondExpr, ExprError, Literal, UnaryOp};

// Re-export public API from legality module
pub use legality::{
    JavaLegalityFilter, JavaType, LegalityFilter, LegalityQuery, Rejection, ValueKind,
};
