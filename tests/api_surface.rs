//! Compile-only test to verify public API surface.
//!
//! This file serves as a compile-time contract for the public API.
//! If this file fails to compile, the public API has regressed.
//!
//! Run with: cargo test -- api_surface

// Allow unused imports - this test is about compile-time verification, not runtime usage
#![allow(unused_imports)]

// ============================================================================
// Core Infrastructure Types
// ============================================================================

// site and types modules - parser hand-off
use faultline::site::{Assignment, Use, UseSite, UseTarget, VariableBinding};
use faultline::types::{base_name, Location};

// feature module - schema registry and extraction
use faultline::feature::{
    default_items, sanitize_value, FeatureItem, FeatureRegistry, FeatureRow, COLUMN, FILE_NAME,
    LAST_ASSIGN, LINE, METHOD_NAME, MISSING_VALUE, PARTIAL_EXPR, SEP, VAR_NAME, VAR_TYPE,
};

// ledger module
use faultline::ledger::DeduplicationLedger;

// condition module - candidate aggregation
use faultline::condition::{CandidateCondition, ConditionPair, ConditionSet};

// filter module - legality
use faultline::filter::{
    parse_condition, BinaryOp, CondExpr, ExprError, JavaLegalityFilter, JavaType, LegalityFilter,
    LegalityQuery, Literal, Rejection, UnaryOp, ValueKind,
};

// ============================================================================
// Round Trip Types
// ============================================================================

use faultline::error::{CoreError, FaultlineError, FaultlineResult, OutputErrorCode};
use faultline::output::{
    emit_response, ErrorInfo, ErrorResponse, ExtractResponse, PredictResponse, SCHEMA_VERSION,
};
use faultline::predict::{PredictReport, PredictRequest, Predictor};
use faultline::runner::{run_model, ModelOutcome};
use faultline::subject::{
    Subject, SubjectError, SubjectResult, DEFAULT_PLACEHOLDER, DEFAULT_PREDICT_TIMEOUT_SECS,
    DEFAULT_SOURCE_SUFFIX,
};
use faultline::tsv::{
    parse_result_bytes, parse_results, read_feature_rows, read_results, write_feature_file, FeatureFileWriter,
    MalformedLine, ResultBatch, ResultLine, RESULT_COLUMNS,
};

// ============================================================================
// Test
// ============================================================================

#[test]
fn api_surface_compiles() {
    // The imports above form the public API contract.

    let _ = std::any::type_name::<UseSite>();
    let _ = std::any::type_name::<FeatureRegistry>();
    let _ = std::any::type_name::<DeduplicationLedger>();
    let _ = std::any::type_name::<ConditionPair>();
    let _ = std::any::type_name::<JavaLegalityFilter>();
    let _ = std::any::type_name::<Predictor>();
    let _ = std::any::type_name::<Subject>();
    let _ = std::any::type_name::<ModelOutcome>();
    let _ = std::any::type_name::<FaultlineError>();
}

#[test]
fn legality_filter_is_object_safe() {
    let filter: std::sync::Arc<dyn LegalityFilter> = std::sync::Arc::new(JavaLegalityFilter::new());
    let legal = std::collections::BTreeSet::from(["x".to_string()]);
    assert!(filter.is_legal_expr(Some("String"), "x", "x != null", &legal, None));
}

#[test]
fn schema_version_is_stable() {
    // The schema version is part of the public API contract
    assert_eq!(SCHEMA_VERSION, "1");
}
