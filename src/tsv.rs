//! Tab-separated working files.
//!
//! Feature files are a header line followed by one [`FeatureRow`] per line.
//! Result files are a header line followed by
//! `index<TAB>varName<TAB>conditionTemplate<TAB>probability[...]` rows.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use faultline_core::feature::FeatureRow;

/// Minimum column count of a usable result line.
pub const RESULT_COLUMNS: usize = 4;

// ============================================================================
// Feature Files
// ============================================================================

/// Streaming writer for a feature file.
///
/// The header is written on creation; rows are appended one line each.
pub struct FeatureFileWriter {
    out: BufWriter<File>,
    rows: usize,
}

impl FeatureFileWriter {
    /// Create (or truncate) `path`, creating parent directories, and write
    /// the header line.
    pub fn create(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{}", header)?;
        Ok(FeatureFileWriter { out, rows: 0 })
    }

    pub fn append(&mut self, row: &str) -> io::Result<()> {
        writeln!(self.out, "{}", row)?;
        self.rows += 1;
        Ok(())
    }

    /// Rows appended so far (header excluded).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush to disk, returning the row count.
    pub fn finish(mut self) -> io::Result<usize> {
        self.out.flush()?;
        Ok(self.rows)
    }
}

/// Write a complete feature file.
pub fn write_feature_file<'a>(
    path: &Path,
    header: &str,
    rows: impl IntoIterator<Item = &'a FeatureRow>,
) -> io::Result<usize> {
    let mut writer = FeatureFileWriter::create(path, header)?;
    for row in rows {
        writer.append(&row.to_line())?;
    }
    writer.finish()
}

/// Read the rows of a feature file, skipping the header and blank lines.
pub fn read_feature_rows(path: &Path) -> io::Result<Vec<FeatureRow>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for line in reader.lines().skip(1) {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        rows.push(FeatureRow::parse(line));
    }
    Ok(rows)
}

// ============================================================================
// Result Files
// ============================================================================

/// One usable line of the model's result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLine {
    /// 1-indexed line number in the file.
    pub line_no: usize,
    pub var_name: String,
    /// Condition with the placeholder still in place.
    pub template: String,
    /// Probability exactly as written by the model.
    pub probability: String,
}

impl ResultLine {
    /// Split a result line; `None` if it has fewer than four columns.
    ///
    /// The first column (index) and any columns past the fourth are ignored.
    pub fn parse(line_no: usize, line: &str) -> Option<ResultLine> {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < RESULT_COLUMNS {
            return None;
        }
        Some(ResultLine {
            line_no,
            var_name: columns[1].to_string(),
            template: columns[2].to_string(),
            probability: columns[3].to_string(),
        })
    }

    /// The condition text with every `placeholder` replaced by the variable.
    pub fn condition(&self, placeholder: &str) -> String {
        self.template.replace(placeholder, &self.var_name)
    }
}

/// A line that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub line_no: usize,
    pub text: String,
}

/// Contents of a result file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultBatch {
    pub lines: Vec<ResultLine>,
    pub malformed: Vec<MalformedLine>,
}

/// Parse result-file text: header dropped, blank lines ignored.
pub fn parse_results(content: &str) -> ResultBatch {
    parse_result_bytes(content.as_bytes())
}

/// Parse raw result-file bytes.
///
/// Lines are decoded one at a time; a line that is not valid UTF-8 is
/// reported as malformed without affecting its neighbours.
pub fn parse_result_bytes(content: &[u8]) -> ResultBatch {
    let mut batch = ResultBatch::default();
    for (idx, raw) in content.split(|&b| b == b'\n').enumerate().skip(1) {
        let line_no = idx + 1;
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(_) => {
                batch.malformed.push(MalformedLine {
                    line_no,
                    text: String::from_utf8_lossy(raw).into_owned(),
                });
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match ResultLine::parse(line_no, line) {
            Some(result) => batch.lines.push(result),
            None => batch.malformed.push(MalformedLine {
                line_no,
                text: line.to_string(),
            }),
        }
    }
    batch
}

/// Read and parse a result file.
///
/// A missing file surfaces as an `io::ErrorKind::NotFound` error so the
/// caller can tell "model wrote nothing" from a real read failure.
pub fn read_results(path: &Path) -> io::Result<ResultBatch> {
    let content = fs::read(path)?;
    Ok(parse_result_bytes(&content))
}
