//! Result verification: golden-tensor comparison for the functional test and
//! latency/transcript aggregation for the dataset evaluation.

use std::fmt;
use std::path::Path;

use crate::dataset;
use crate::error::SetupError;
use crate::wer::WordErrorRate;

/// Reference output tensor, flattened to signed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldenVector(Vec<i8>);

impl GoldenVector {
    pub fn new(values: Vec<i8>) -> Self {
        Self(values)
    }

    /// Reinterprets raw tensor bytes (no header) as `int8`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.iter().map(|&b| b as i8).collect())
    }

    /// Loads a golden file whose size must be exactly `expected_len` bytes.
    pub fn load(path: &Path, expected_len: usize) -> Result<Self, SetupError> {
        let bytes = dataset::read_payload(path, Some(expected_len))?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn values(&self) -> &[i8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn compare(&self, actual: &[i8]) -> Comparison {
        compare(&self.0, actual)
    }
}

/// Verdict of an element-wise comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Match {
        len: usize,
    },
    /// Lengths differ; no elements were compared.
    LengthMismatch {
        expected: usize,
        actual: usize,
    },
    Mismatch {
        count: usize,
        first_index: usize,
        expected: i8,
        got: i8,
    },
}

impl Comparison {
    pub fn passed(&self) -> bool {
        matches!(self, Comparison::Match { .. })
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Match { len } => {
                write!(f, "PASSED: all {len} output values match the golden file")
            }
            Comparison::LengthMismatch { expected, actual } => write!(
                f,
                "FAILED: board returned wrong number of values (expected {expected}, got {actual})"
            ),
            Comparison::Mismatch {
                count,
                first_index,
                expected,
                got,
            } => write!(
                f,
                "FAILED: found {count} mismatches; first at index {first_index}: expected (golden) {expected}, got (board) {got}"
            ),
        }
    }
}

pub fn compare(expected: &[i8], actual: &[i8]) -> Comparison {
    if expected.len() != actual.len() {
        return Comparison::LengthMismatch {
            expected: expected.len(),
            actual: actual.len(),
        };
    }
    let mut mismatches = expected
        .iter()
        .zip(actual)
        .enumerate()
        .filter(|(_, (e, a))| e != a);
    match mismatches.next() {
        None => Comparison::Match {
            len: expected.len(),
        },
        Some((first_index, (&expected, &got))) => Comparison::Mismatch {
            count: 1 + mismatches.count(),
            first_index,
            expected,
            got,
        },
    }
}

/// Running totals for an evaluation run. Truths and predictions are kept in
/// case order so they stay paired for the metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    pub total_latency_ms: f64,
    truths: Vec<String>,
    predictions: Vec<String>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, truth: &str, prediction: &str, latency_ms: f64) {
        self.total_latency_ms += latency_ms;
        self.truths.push(truth.to_string());
        self.predictions.push(prediction.to_string());
    }

    pub fn len(&self) -> usize {
        self.truths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.truths.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.truths
            .iter()
            .map(String::as_str)
            .zip(self.predictions.iter().map(String::as_str))
    }

    /// `None` when no case completed.
    pub fn report(&self, metric: &dyn WordErrorRate) -> Option<EvaluationReport> {
        if self.is_empty() {
            return None;
        }
        let wer = metric.wer(&self.truths, &self.predictions);
        Some(EvaluationReport {
            inferences: self.len(),
            average_latency_ms: self.total_latency_ms / self.len() as f64,
            wer,
            accuracy: 1.0 - wer,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationReport {
    pub inferences: usize,
    pub average_latency_ms: f64,
    pub wer: f64,
    pub accuracy: f64,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Evaluation Complete ---")?;
        writeln!(f, "Total Inferences: {}", self.inferences)?;
        writeln!(f, "Average Latency:  {:.2} ms", self.average_latency_ms)?;
        writeln!(f, "Accuracy (WER):   {:.2}%", self.accuracy * 100.0)?;
        write!(f, "(Word Error Rate: {:.2}%)", self.wer * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wer::EditDistanceWer;

    #[test]
    fn single_mismatch_reports_position_and_values() {
        let golden = GoldenVector::new(vec![1, -2, 3]);
        assert_eq!(
            golden.compare(&[1, -2, 4]),
            Comparison::Mismatch {
                count: 1,
                first_index: 2,
                expected: 3,
                got: 4
            }
        );
    }

    #[test]
    fn mismatch_counts_all_differences() {
        let result = compare(&[0, 0, 0, 0], &[0, 5, 0, 7]);
        assert_eq!(
            result,
            Comparison::Mismatch {
                count: 2,
                first_index: 1,
                expected: 0,
                got: 5
            }
        );
        assert!(!result.passed());
    }

    #[test]
    fn length_mismatch_skips_element_comparison() {
        let golden = GoldenVector::new(vec![0; 4292]);
        let result = golden.compare(&vec![0; 4291]);
        assert_eq!(
            result,
            Comparison::LengthMismatch {
                expected: 4292,
                actual: 4291
            }
        );
        assert!(result.to_string().contains("expected 4292, got 4291"));
    }

    #[test]
    fn identical_vectors_pass() {
        let result = compare(&[1, 2, 3], &[1, 2, 3]);
        assert!(result.passed());
        assert_eq!(
            result.to_string(),
            "PASSED: all 3 output values match the golden file"
        );
    }

    #[test]
    fn golden_bytes_are_signed() {
        let golden = GoldenVector::from_bytes(&[0x00, 0x7f, 0x80, 0xff]);
        assert_eq!(golden.values(), &[0, 127, -128, -1]);
    }

    #[test]
    fn golden_file_of_wrong_size_is_rejected() {
        let dir = std::env::temp_dir().join("cfu_bench_golden_size");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("golden.bin");
        std::fs::write(&path, [0u8; 10]).unwrap();
        assert!(matches!(
            GoldenVector::load(&path, 11),
            Err(SetupError::WrongSize {
                expected: 11,
                actual: 10,
                ..
            })
        ));
        assert_eq!(GoldenVector::load(&path, 10).unwrap().len(), 10);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn aggregate_keeps_case_order() {
        let mut agg = AggregateResult::new();
        agg.record("go", "go", 1.0);
        agg.record("stop", "stob", 3.0);
        let pairs: Vec<_> = agg.pairs().collect();
        assert_eq!(pairs, vec![("go", "go"), ("stop", "stob")]);

        let report = agg.report(&EditDistanceWer).unwrap();
        let joined = EditDistanceWer.wer(&["go stop".to_string()], &["go stob".to_string()]);
        assert_eq!(report.inferences, 2);
        assert_eq!(report.average_latency_ms, 2.0);
        assert_eq!(report.accuracy, 1.0 - joined);
        assert!(report.to_string().contains("Accuracy (WER):   50.00%"));
    }

    #[test]
    fn empty_aggregate_has_no_report() {
        assert!(AggregateResult::new().report(&EditDistanceWer).is_none());
    }
}
