//! The predict round trip.
//!
//! One call of [`Predictor::predict`] for a subject:
//!
//! 1. writes the variable-feature file (header plus every row the ledger has
//!    not seen), recording the class name from the first surviving row;
//! 2. writes the expression-feature file the same way;
//! 3. runs the external model under the subject's timeout, after removing any
//!    result file a previous call left behind;
//! 4. reads the result file, skipping malformed lines, unless the model timed
//!    out or never launched;
//! 5. substitutes the placeholder, judges each condition with the legality
//!    filter, and keeps the accepted ones in the right-hand set;
//! 6. deletes all three working files, on every exit path.
//!
//! A write failure in step 1 or 2, or a model run that timed out or never
//! started, ends the call with empty sets. Every other failure is logged and
//! the caller gets whatever was collected, possibly nothing.
//!
//! Calls for the same subject are serialized because they share working
//! files; calls for different subjects run in parallel.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use faultline_core::condition::{CandidateCondition, ConditionPair};
use faultline_core::feature::{FeatureRegistry, FeatureRow, FILE_NAME};
use faultline_core::filter::{JavaLegalityFilter, LegalityFilter, LegalityQuery};
use faultline_core::ledger::DeduplicationLedger;

use crate::runner::{run_model, ModelOutcome};
use crate::subject::Subject;
use crate::tsv::{self, FeatureFileWriter};

// ============================================================================
// Request and Report
// ============================================================================

/// Inputs of one predict call.
#[derive(Debug, Clone, Default)]
pub struct PredictRequest {
    /// Rows describing variable uses.
    pub var_features: Vec<FeatureRow>,
    /// Rows describing expression uses.
    pub expr_features: Vec<FeatureRow>,
    /// In-scope variables at the site, name to static type.
    pub legal_variables: BTreeMap<String, String>,
}

impl PredictRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var_rows(mut self, rows: impl IntoIterator<Item = FeatureRow>) -> Self {
        self.var_features.extend(rows);
        self
    }

    pub fn with_expr_rows(mut self, rows: impl IntoIterator<Item = FeatureRow>) -> Self {
        self.expr_features.extend(rows);
        self
    }

    pub fn with_legal_variable(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.legal_variables.insert(name.into(), ty.into());
        self
    }
}

/// What happened during one predict call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PredictReport {
    pub var_rows_written: usize,
    pub expr_rows_written: usize,
    /// Rows skipped because the ledger had already seen them.
    pub duplicate_rows: usize,
    /// Rows dropped because their width does not match the registry.
    pub invalid_rows: usize,
    /// Class name context handed to the legality filter.
    pub class_name: Option<String>,
    /// `None` when the model was never run.
    pub outcome: Option<ModelOutcome>,
    pub results_parsed: usize,
    pub results_malformed: usize,
    pub results_rejected: usize,
    pub accepted: usize,
}

// ============================================================================
// Predictor
// ============================================================================

/// Drives predict round trips against the external model.
///
/// Cloning shares the registry, ledger, filter, and per-subject locks.
#[derive(Clone)]
pub struct Predictor {
    registry: Arc<FeatureRegistry>,
    ledger: Arc<DeduplicationLedger>,
    filter: Arc<dyn LegalityFilter>,
    subject_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor")
            .field("registry", &self.registry)
            .field("ledger_rows", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl Predictor {
    pub fn new(
        registry: Arc<FeatureRegistry>,
        ledger: Arc<DeduplicationLedger>,
        filter: Arc<dyn LegalityFilter>,
    ) -> Self {
        Predictor {
            registry,
            ledger,
            filter,
            subject_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Built-in feature items, a fresh ledger, and the Java legality policy.
    pub fn with_defaults() -> Self {
        Predictor::new(
            Arc::new(FeatureRegistry::with_defaults()),
            Arc::new(DeduplicationLedger::new()),
            Arc::new(JavaLegalityFilter::new()),
        )
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &DeduplicationLedger {
        &self.ledger
    }

    /// Run one round trip and return the accepted conditions.
    pub fn predict(&self, subject: &Subject, request: &PredictRequest) -> ConditionPair {
        self.predict_with_report(subject, request).0
    }

    /// Run one round trip, also reporting what happened at each step.
    pub fn predict_with_report(
        &self,
        subject: &Subject,
        request: &PredictRequest,
    ) -> (ConditionPair, PredictReport) {
        let key = subject.key();
        let lock = self.subject_lock(&key);
        let _serialized = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let span = info_span!("predict", subject = %key);
        let _enter = span.enter();

        let var_path = subject.var_features_path();
        let expr_path = subject.expr_features_path();
        let result_path = subject.predict_result_path();
        let _cleanup = WorkingFiles::new([var_path.clone(), expr_path.clone(), result_path.clone()]);

        let mut pair = ConditionPair::new();
        let mut report = PredictReport::default();

        // Steps 1 and 2: without both input files the model run is meaningless.
        let var_written = match self.write_features(&var_path, &request.var_features) {
            Ok(written) => written,
            Err(e) => {
                error!("Failed to write {}: {}", var_path.display(), e);
                return (pair, report);
            }
        };
        report.var_rows_written = var_written.rows;
        report.duplicate_rows += var_written.duplicates;
        report.invalid_rows += var_written.invalid;
        report.class_name = var_written
            .first_file_name
            .as_deref()
            .map(|file| subject.class_name(file));

        let expr_written = match self.write_features(&expr_path, &request.expr_features) {
            Ok(written) => written,
            Err(e) => {
                error!("Failed to write {}: {}", expr_path.display(), e);
                return (pair, report);
            }
        };
        report.expr_rows_written = expr_written.rows;
        report.duplicate_rows += expr_written.duplicates;
        report.invalid_rows += expr_written.invalid;

        info!(
            "Wrote {} variable and {} expression rows ({} duplicates skipped)",
            report.var_rows_written, report.expr_rows_written, report.duplicate_rows
        );

        // Step 3: only this run's output may be read back.
        match fs::remove_file(&result_path) {
            Ok(()) => debug!("Removed stale {}", result_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                error!("Cannot remove stale {}: {}", result_path.display(), e);
                return (pair, report);
            }
        }
        let outcome = match subject.expand_command() {
            Ok(command) => run_model(&command, &subject.home, subject.timeout()),
            Err(e) => {
                warn!("Cannot build predict command: {}", e);
                ModelOutcome::LaunchFailed {
                    message: e.to_string(),
                }
            }
        };
        let usable = !matches!(
            outcome,
            ModelOutcome::TimedOut { .. } | ModelOutcome::LaunchFailed { .. }
        );
        report.outcome = Some(outcome);
        if !usable {
            warn!("Model run failed, discarding any output");
            return (pair, report);
        }

        // Step 4
        let batch = match tsv::read_results(&result_path) {
            Ok(batch) => batch,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("No prediction result at {}", result_path.display());
                return (pair, report);
            }
            Err(e) => {
                warn!("Failed to read {}: {}", result_path.display(), e);
                return (pair, report);
            }
        };
        for bad in &batch.malformed {
            warn!(
                "Skipping malformed result line {}: {:?}",
                bad.line_no, bad.text
            );
        }
        report.results_malformed = batch.malformed.len();
        report.results_parsed = batch.lines.len();

        // Step 5
        let legal_names: BTreeSet<String> = request.legal_variables.keys().cloned().collect();
        for line in &batch.lines {
            let condition = line.condition(&subject.placeholder);
            let var_type = request
                .legal_variables
                .get(&line.var_name)
                .map(String::as_str);
            let query = LegalityQuery {
                var_type,
                var_name: &line.var_name,
                condition: &condition,
                legal_names: &legal_names,
                class_name: report.class_name.as_deref(),
            };
            match self.filter.check(&query) {
                Ok(()) => {
                    if pair
                        .right
                        .insert(CandidateCondition::new(condition, line.probability.clone()))
                    {
                        report.accepted += 1;
                    }
                }
                Err(reason) => {
                    info!(
                        var = %line.var_name,
                        var_type = var_type.unwrap_or("?"),
                        condition = %condition,
                        "Filter illegal predicate: {}",
                        reason
                    );
                    report.results_rejected += 1;
                }
            }
        }

        info!(
            "Accepted {} of {} predicted conditions",
            report.accepted, report.results_parsed
        );
        (pair, report)
    }

    fn subject_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = lock_recovering(&self.subject_locks);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Write one feature file, admitting only full-width rows the ledger has
    /// not seen.
    fn write_features(&self, path: &Path, rows: &[FeatureRow]) -> io::Result<WrittenRows> {
        let file_column = self.registry.index_of(FILE_NAME);
        let width = self.registry.len();
        let mut writer = FeatureFileWriter::create(path, &self.registry.header())?;
        let mut duplicates = 0;
        let mut invalid = 0;
        let mut first_file_name = None;

        for row in rows {
            let line = row.to_line();
            if row.len() != width || line.is_empty() {
                warn!(
                    expected = width,
                    found = row.len(),
                    "Dropping feature row of wrong width: {:?}",
                    line
                );
                invalid += 1;
                continue;
            }
            if !self.ledger.check_and_mark(&line) {
                debug!("Skipping already submitted row: {}", line);
                duplicates += 1;
                continue;
            }
            if first_file_name.is_none() {
                first_file_name = file_column
                    .and_then(|idx| row.get(idx))
                    .map(str::to_string);
            }
            writer.append(&line)?;
        }

        Ok(WrittenRows {
            rows: writer.finish()?,
            duplicates,
            invalid,
            first_file_name,
        })
    }
}

struct WrittenRows {
    rows: usize,
    duplicates: usize,
    invalid: usize,
    first_file_name: Option<String>,
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Cleanup
// ============================================================================

/// Deletes the round trip's working files when dropped.
struct WorkingFiles {
    paths: [PathBuf; 3],
}

impl WorkingFiles {
    fn new(paths: [PathBuf; 3]) -> Self {
        WorkingFiles { paths }
    }
}

impl Drop for WorkingFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}
