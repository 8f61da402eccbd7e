//! Run drivers built on one [`Session`]: the fail-fast functional test and
//! the best-effort dataset evaluation.

use tracing::{error, info, warn};

use crate::config::OUTPUT_CLASSES;
use crate::ctc;
use crate::dataset::TestCase;
use crate::error::{FailureKind, ParseError, SessionError, SetupError};
use crate::markers::{DeviceResponse, Latency};
use crate::session::Session;
use crate::transport::Transport;
use crate::verify::{AggregateResult, Comparison, GoldenVector};
use crate::wer::WordErrorRate;

/// Outcome of a functional test that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionalReport {
    pub device: String,
    /// `None` if the board printed no usable timestamps.
    pub latency: Option<Latency>,
    pub comparison: Comparison,
}

/// Navigates to benchmark mode, runs `payload` once and compares the result
/// tensor with `golden`. Any session error aborts the test.
pub fn run_functional_test<T: Transport>(
    session: &mut Session<T>,
    payload: &[u8],
    golden: &GoldenVector,
) -> Result<FunctionalReport, SessionError> {
    session.enter_benchmark_mode()?;
    let device = session.identify()?;
    session.upload(payload)?;
    let response = session.infer()?;

    let latency = match response.latency() {
        Ok(latency) => {
            info!(latency_us = latency.micros, family = ?latency.family, "latency reported");
            Some(latency)
        }
        Err(e) => {
            warn!("could not parse latency from output: {e}");
            None
        }
    };

    let values = response.result_values().map_err(|reason| SessionError::Parse {
        reason,
        raw: response.text.clone(),
    })?;
    info!(values = values.len(), "board returned result tensor");

    Ok(FunctionalReport {
        device,
        latency,
        comparison: golden.compare(&values),
    })
}

/// Completed cases plus every failure, in case order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub aggregate: AggregateResult,
    pub failures: Vec<CaseFailure>,
}

impl RunSummary {
    pub fn failures_of(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.error.kind() == kind).count()
    }
}

#[derive(Debug)]
pub struct CaseFailure {
    pub case: TestCase,
    pub error: SessionError,
}

/// Result of one evaluated case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub latency_ms: f64,
    pub predicted: String,
}

/// Runs a dataset through one session, skipping cases that fail.
pub struct Evaluation<'a, T: Transport> {
    session: &'a mut Session<T>,
}

impl<'a, T: Transport> Evaluation<'a, T> {
    pub fn new(session: &'a mut Session<T>) -> Self {
        Self { session }
    }

    /// Enters benchmark mode, then evaluates every case in order.
    ///
    /// `load` supplies each case's payload. Navigation failures abort the run;
    /// per-case failures are logged, collected and skipped.
    pub fn run<F>(&mut self, cases: &[TestCase], mut load: F) -> Result<RunSummary, SessionError>
    where
        F: FnMut(&TestCase) -> Result<Vec<u8>, SetupError>,
    {
        self.session.enter_benchmark_mode()?;
        self.session.identify()?;

        let mut summary = RunSummary::default();
        for (index, case) in cases.iter().enumerate() {
            info!(
                case = index + 1,
                total = cases.len(),
                input = %case.input_path.display(),
                "running evaluation case"
            );
            match self.run_case(case, &mut load) {
                Ok(result) => {
                    info!(truth = %case.expected_text, pred = %result.predicted, "case complete");
                    summary
                        .aggregate
                        .record(&case.expected_text, &result.predicted, result.latency_ms);
                }
                Err(e) => {
                    error!(input = %case.input_path.display(), "case skipped: {e}");
                    if let Some(raw) = e.raw_response() {
                        error!("full message from board:\n{raw}");
                    }
                    summary.failures.push(CaseFailure {
                        case: case.clone(),
                        error: e,
                    });
                }
            }
        }
        Ok(summary)
    }

    fn run_case<F>(&mut self, case: &TestCase, load: &mut F) -> Result<CaseResult, SessionError>
    where
        F: FnMut(&TestCase) -> Result<Vec<u8>, SetupError>,
    {
        let payload = load(case)?;
        let expected = self.session.config().payload_len;
        if payload.len() != expected {
            return Err(SetupError::WrongSize {
                path: case.input_path.clone(),
                expected,
                actual: payload.len(),
            }
            .into());
        }
        let response = self.session.run_case(&payload)?;
        evaluate_response(&response)
    }
}

/// Latency plus transcript from an inference response.
///
/// The transcript comes from `m-results-s[...]` when present, otherwise the
/// raw tensor in `m-results-[...]` is CTC-decoded on the host.
pub fn evaluate_response(response: &DeviceResponse) -> Result<CaseResult, SessionError> {
    let parse_failure = |reason: ParseError| SessionError::Parse {
        reason,
        raw: response.text.clone(),
    };
    let latency = response.latency().map_err(parse_failure)?;
    let predicted = match response.result_text() {
        Ok(text) => text,
        Err(ParseError::MissingResultText) => match response.result_values() {
            Ok(values) => ctc::greedy_decode(&values, OUTPUT_CLASSES).trim().to_string(),
            Err(ParseError::MissingResultValues) => {
                return Err(parse_failure(ParseError::MissingResultText))
            }
            Err(reason) => return Err(parse_failure(reason)),
        },
        Err(reason) => return Err(parse_failure(reason)),
    };
    Ok(CaseResult {
        latency_ms: latency.as_millis_f64(),
        predicted,
    })
}

/// Prints the final evaluation report, or a notice when nothing completed.
pub fn render_report(summary: &RunSummary, metric: &dyn WordErrorRate) -> String {
    let mut out = match summary.aggregate.report(metric) {
        Some(report) => report.to_string(),
        None => "--- No tests were successfully run. ---".to_string(),
    };
    if !summary.failures.is_empty() {
        out.push_str(&format!(
            "\nSkipped cases:    {} (timeout {}, transfer {}, parse {}, transport {}, input {})",
            summary.failures.len(),
            summary.failures_of(FailureKind::Timeout),
            summary.failures_of(FailureKind::Transfer),
            summary.failures_of(FailureKind::Parse),
            summary.failures_of(FailureKind::Transport),
            summary.failures_of(FailureKind::Setup),
        ));
    }
    out
}
