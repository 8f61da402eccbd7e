//! Labeled test cases and the CSV loader for them.
//!
//! The label file has a header row followed by `filename,<unused>,transcript`
//! rows. Fields may be double-quoted; `""` inside quotes is a literal quote.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SetupError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub input_path: PathBuf,
    /// Lowercased, trimmed reference transcript.
    pub expected_text: String,
}

impl TestCase {
    pub fn new(input_path: impl Into<PathBuf>, expected_text: &str) -> Self {
        Self {
            input_path: input_path.into(),
            expected_text: expected_text.trim().to_lowercase(),
        }
    }
}

pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>, SetupError> {
    if !path.exists() {
        return Err(SetupError::MissingFile(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| SetupError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cases = parse_test_cases(&content, path)?;
    if cases.is_empty() {
        return Err(SetupError::EmptyDataset(path.to_path_buf()));
    }
    Ok(cases)
}

/// Parses label rows; `origin` is only used in error messages.
pub fn parse_test_cases(content: &str, origin: &Path) -> Result<Vec<TestCase>, SetupError> {
    let mut cases = Vec::new();
    for (index, line) in content.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_record(line);
        if fields.len() < 3 {
            return Err(SetupError::MalformedRow {
                path: origin.to_path_buf(),
                line: index + 1,
                columns: fields.len(),
            });
        }
        let case = TestCase::new(fields[0].trim(), &fields[2]);
        debug!(input = %case.input_path.display(), truth = %case.expected_text, "loaded test case");
        cases.push(case);
    }
    Ok(cases)
}

/// Every referenced input file must exist before the board is touched.
pub fn check_inputs_exist(cases: &[TestCase]) -> Result<(), SetupError> {
    match cases.iter().find(|case| !case.input_path.exists()) {
        Some(case) => Err(SetupError::MissingFile(case.input_path.clone())),
        None => Ok(()),
    }
}

/// Reads a raw payload file, optionally insisting on an exact size.
pub fn read_payload(path: &Path, expected_len: Option<usize>) -> Result<Vec<u8>, SetupError> {
    if !path.exists() {
        return Err(SetupError::MissingFile(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|source| SetupError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    match expected_len {
        Some(expected) if bytes.len() != expected => Err(SetupError::WrongSize {
            path: path.to_path_buf(),
            expected,
            actual: bytes.len(),
        }),
        _ => Ok(bytes),
    }
}

fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
