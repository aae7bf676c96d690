//! Subject configuration.
//!
//! A subject is one buggy program under repair (e.g. `chart` bug `1`). Its
//! configuration names the working files of the predict round trip and the
//! command that runs the external model.
//!
//! ## Subject File Format
//!
//! ```json
//! {
//!   "name": "chart",
//!   "id": 1,
//!   "home": "/work/chart_1_buggy",
//!   "out_dir": "/work/ml/input",
//!   "predict_command": [
//!     "bash", "-c",
//!     "source /opt/venv/bin/activate && cd /opt/ml && python run_predict.py {name} {id} {var_features} {expr_features} {predict_result}"
//!   ],
//!   "predict_timeout_secs": 600
//! }
//! ```
//!
//! ## Template Variables
//!
//! - `{name}` - Subject name
//! - `{id}` - Subject bug id
//! - `{home}` - Subject checkout root
//! - `{var_features}` - Variable-feature file path
//! - `{expr_features}` - Expression-feature file path
//! - `{predict_result}` - Result file path
//!
//! Any other `{identifier}` in the command is rejected when the subject is
//! loaded. Braces around anything that is not an identifier are left alone.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Default bound on one model run.
pub const DEFAULT_PREDICT_TIMEOUT_SECS: u64 = 600;

/// Default token standing in for the variable in condition templates.
pub const DEFAULT_PLACEHOLDER: &str = "$";

/// Default suffix stripped from the file-name column to get a class name.
pub const DEFAULT_SOURCE_SUFFIX: &str = ".java";

const TEMPLATE_VARIABLES: &[&str] = &[
    "name",
    "id",
    "home",
    "var_features",
    "expr_features",
    "predict_result",
];

/// Errors from loading or validating a subject.
#[derive(Debug, Error)]
pub enum SubjectError {
    /// Subject file could not be read.
    #[error("cannot read subject file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid JSON format.
    #[error("invalid subject JSON in {}: {message}", path.display())]
    InvalidJson { path: PathBuf, message: String },

    /// A field holds an unusable value.
    #[error("invalid subject field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Template variable not known.
    #[error("unknown template variable '{variable}' in predict command")]
    UnknownVariable { variable: String },
}

/// Result type for subject operations.
pub type SubjectResult<T> = Result<T, SubjectError>;

// ============================================================================
// Subject
// ============================================================================

/// Configuration of one subject's predict round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject name (`chart`, `lang`, ...).
    pub name: String,
    /// Bug id; JSON may give it as a string or a number.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Subject checkout root; the model runs with this as its working directory.
    pub home: PathBuf,
    /// Directory holding the working files.
    pub out_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_features: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr_features: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predict_result: Option<PathBuf>,
    /// Model command; the first element is the program.
    pub predict_command: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub predict_timeout_secs: u64,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default = "default_source_suffix")]
    pub source_suffix: String,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_PREDICT_TIMEOUT_SECS
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

fn default_source_suffix() -> String {
    DEFAULT_SOURCE_SUFFIX.to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

impl Subject {
    /// Create a subject with default file names, timeout, placeholder and suffix.
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        home: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        predict_command: Vec<String>,
    ) -> Self {
        Subject {
            name: name.into(),
            id: id.into(),
            home: home.into(),
            out_dir: out_dir.into(),
            var_features: None,
            expr_features: None,
            predict_result: None,
            predict_command,
            predict_timeout_secs: DEFAULT_PREDICT_TIMEOUT_SECS,
            placeholder: default_placeholder(),
            source_suffix: default_source_suffix(),
        }
    }

    pub fn with_var_features(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_features = Some(path.into());
        self
    }

    pub fn with_expr_features(mut self, path: impl Into<PathBuf>) -> Self {
        self.expr_features = Some(path.into());
        self
    }

    pub fn with_predict_result(mut self, path: impl Into<PathBuf>) -> Self {
        self.predict_result = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.predict_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn with_source_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.source_suffix = suffix.into();
        self
    }

    /// Read and validate a subject file.
    pub fn load(path: &Path) -> SubjectResult<Subject> {
        let content = fs::read_to_string(path).map_err(|source| SubjectError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let subject: Subject =
            serde_json::from_str(&content).map_err(|e| SubjectError::InvalidJson {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        subject.validate()?;
        Ok(subject)
    }

    /// Check identity fields, placeholder and command template.
    pub fn validate(&self) -> SubjectResult<()> {
        for (field, value) in [("name", &self.name), ("id", &self.id)] {
            if value.trim().is_empty() {
                return Err(invalid_field(field, "must not be empty"));
            }
            if value.contains(['/', '\\']) {
                return Err(invalid_field(field, "must not contain path separators"));
            }
        }
        if self.placeholder.is_empty() {
            return Err(invalid_field("placeholder", "must not be empty"));
        }
        if self.predict_command.is_empty() {
            return Err(invalid_field("predict_command", "cannot be empty"));
        }
        for arg in &self.predict_command {
            if let Some(variable) = template_variables(arg)
                .into_iter()
                .find(|v| !TEMPLATE_VARIABLES.contains(v))
            {
                return Err(SubjectError::UnknownVariable {
                    variable: variable.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Key under which predict calls for this subject are serialized.
    pub fn key(&self) -> String {
        format!("{}_{}", self.name, self.id)
    }

    pub fn var_features_path(&self) -> PathBuf {
        self.var_features
            .clone()
            .unwrap_or_else(|| self.default_path("var.tsv"))
    }

    pub fn expr_features_path(&self) -> PathBuf {
        self.expr_features
            .clone()
            .unwrap_or_else(|| self.default_path("expr.tsv"))
    }

    pub fn predict_result_path(&self) -> PathBuf {
        self.predict_result
            .clone()
            .unwrap_or_else(|| self.default_path("pred.tsv"))
    }

    fn default_path(&self, extension: &str) -> PathBuf {
        self.out_dir.join(format!("{}.{}", self.key(), extension))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.predict_timeout_secs)
    }

    /// Class name for a file-name column value: the value with the source
    /// suffix stripped, or the whole value when it lacks the suffix.
    pub fn class_name(&self, file_name: &str) -> String {
        file_name
            .strip_suffix(self.source_suffix.as_str())
            .unwrap_or(file_name)
            .to_string()
    }

    /// Expand template variables in the predict command.
    ///
    /// # Errors
    ///
    /// Returns `UnknownVariable` if the command uses a variable outside the
    /// documented set, and `InvalidField` if the command is empty.
    pub fn expand_command(&self) -> SubjectResult<Vec<String>> {
        if self.predict_command.is_empty() {
            return Err(invalid_field("predict_command", "cannot be empty"));
        }

        let var_features = self.var_features_path();
        let expr_features = self.expr_features_path();
        let predict_result = self.predict_result_path();
        let values: [(&str, String); 6] = [
            ("name", self.name.clone()),
            ("id", self.id.clone()),
            ("home", self.home.display().to_string()),
            ("var_features", var_features.display().to_string()),
            ("expr_features", expr_features.display().to_string()),
            ("predict_result", predict_result.display().to_string()),
        ];

        self.predict_command
            .iter()
            .map(|arg| expand_single_arg(arg, &values))
            .collect()
    }
}

fn invalid_field(field: &str, reason: &str) -> SubjectError {
    SubjectError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn expand_single_arg(arg: &str, values: &[(&str, String)]) -> SubjectResult<String> {
    let mut result = arg.to_string();
    for variable in template_variables(arg) {
        let value = values
            .iter()
            .find(|(name, _)| *name == variable)
            .map(|(_, value)| value)
            .ok_or_else(|| SubjectError::UnknownVariable {
                variable: variable.to_string(),
            })?;
        result = result.replace(&format!("{{{}}}", variable), value);
    }
    Ok(result)
}

/// Identifiers written as `{identifier}` in `arg`, in order of appearance.
fn template_variables(arg: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let inner = &after[..close];
                let is_identifier = !inner.is_empty()
                    && inner.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
                    && inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if is_identifier {
                    found.push(inner);
                    rest = &after[close + 1..];
                } else {
                    rest = after;
                }
            }
            None => break,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Subject {
        Subject::new(
            "chart",
            "1",
            "/work/chart_1",
            "/work/out",
            vec![
                "run_predict".to_string(),
                "{name}".to_string(),
                "{id}".to_string(),
                "--in={var_features}".to_string(),
            ],
        )
    }

    #[test]
    fn default_paths_use_subject_key() {
        let subject = sample();
        assert_eq!(subject.key(), "chart_1");
        assert_eq!(
            subject.var_features_path(),
            PathBuf::from("/work/out/chart_1.var.tsv")
        );
        assert_eq!(
            subject.expr_features_path(),
            PathBuf::from("/work/out/chart_1.expr.tsv")
        );
        assert_eq!(
            subject.predict_result_path(),
            PathBuf::from("/work/out/chart_1.pred.tsv")
        );
    }

    #[test]
    fn overrides_replace_default_paths() {
        let subject = sample().with_predict_result("/tmp/result.tsv");
        assert_eq!(subject.predict_result_path(), PathBuf::from("/tmp/result.tsv"));
        assert_eq!(
            subject.var_features_path(),
            PathBuf::from("/work/out/chart_1.var.tsv")
        );
    }

    #[test]
    fn expand_command_substitutes_variables() {
        let expanded = sample().expand_command().unwrap();
        assert_eq!(
            expanded,
            vec!["run_predict", "chart", "1", "--in=/work/out/chart_1.var.tsv"]
        );
    }

    #[test]
    fn expand_leaves_non_identifier_braces() {
        let subject = Subject::new(
            "lang",
            "7",
            "/h",
            "/o",
            vec!["sh".to_string(), "-c".to_string(), "f() { echo {id}; }; f".to_string()],
        );
        assert_eq!(subject.expand_command().unwrap()[2], "f() { echo 7; }; f");
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let mut subject = sample();
        subject.predict_command.push("{model}".to_string());
        match subject.validate() {
            Err(SubjectError::UnknownVariable { variable }) => assert_eq!(variable, "model"),
            other => panic!("Expected UnknownVariable, got {other:?}"),
        }
        assert!(subject.expand_command().is_err());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        assert!(matches!(
            Subject::new("", "1", "/h", "/o", vec!["x".to_string()]).validate(),
            Err(SubjectError::InvalidField { .. })
        ));
        assert!(matches!(
            Subject::new("a/b", "1", "/h", "/o", vec!["x".to_string()]).validate(),
            Err(SubjectError::InvalidField { .. })
        ));
        assert!(matches!(
            Subject::new("a", "1", "/h", "/o", vec![]).validate(),
            Err(SubjectError::InvalidField { .. })
        ));
        assert!(matches!(
            sample().with_placeholder("").validate(),
            Err(SubjectError::InvalidField { .. })
        ));
    }

    #[test]
    fn class_name_strips_suffix() {
        let subject = sample();
        assert_eq!(subject.class_name("Foo.java"), "Foo");
        assert_eq!(subject.class_name("Foo"), "Foo");
        assert_eq!(subject.with_source_suffix(".kt").class_name("Bar.kt"), "Bar");
    }

    #[test]
    fn load_reads_json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subject.json");
        fs::write(
            &path,
            r#"{"name": "chart", "id": 1, "home": "/h", "out_dir": "/o",
                "predict_command": ["model", "{predict_result}"]}"#,
        )
        .unwrap();

        let subject = Subject::load(&path).unwrap();
        assert_eq!(subject.id, "1");
        assert_eq!(subject.timeout(), Duration::from_secs(600));
        assert_eq!(subject.placeholder, "$");
        assert_eq!(subject.source_suffix, ".java");
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Subject::load(&missing),
            Err(SubjectError::Read { .. })
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{\"name\": ").unwrap();
        assert!(matches!(
            Subject::load(&bad),
            Err(SubjectError::InvalidJson { .. })
        ));
    }
}
