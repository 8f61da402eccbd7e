//! Extraction of structured markers from free-form board output.
//!
//! The firmware interleaves its markers with arbitrary diagnostic text, so
//! every function here scans the whole response. None of them perform I/O and
//! none of them panic on malformed input: a missing marker is reported as a
//! [`ParseError`] for the caller to act on.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ParseError;
use crate::transport::Capture;

/// Text captured after one command, up to and including the readiness marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    pub text: String,
    /// False for a timeout response: the marker never arrived and every
    /// derived field is indeterminate.
    pub terminated: bool,
}

impl DeviceResponse {
    pub fn new(text: impl Into<String>, terminated: bool) -> Self {
        Self {
            text: text.into(),
            terminated,
        }
    }

    pub fn is_timeout(&self) -> bool {
        !self.terminated
    }

    pub fn timestamps(&self) -> Timestamps {
        timestamps(&self.text)
    }

    pub fn latency(&self) -> Result<Latency, ParseError> {
        latency(&self.text)
    }

    pub fn result_text(&self) -> Result<String, ParseError> {
        result_text(&self.text)
    }

    pub fn result_values(&self) -> Result<Vec<i8>, ParseError> {
        result_values(&self.text)
    }
}

impl From<Capture> for DeviceResponse {
    fn from(capture: Capture) -> Self {
        Self::new(capture.text(), capture.terminated)
    }
}

/// Which firmware revision's timestamp marker produced a set of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFamily {
    /// `m-lap-us-<digits>`
    LapMicros,
    /// `m-timestamp-<digits>`
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamps {
    pub family: TimestampFamily,
    pub values: Vec<u64>,
}

/// Elapsed device time between the first two timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    pub micros: u64,
    pub family: TimestampFamily,
}

impl Latency {
    pub fn as_millis_f64(&self) -> f64 {
        self.micros as f64 / 1000.0
    }
}

fn lap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"m-lap-us-([0-9]+)").expect("valid regex"))
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"m-timestamp-([0-9]+)").expect("valid regex"))
}

fn text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"m-results-s\[(.*?)\]").expect("valid regex"))
}

fn values_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"m-results-\[((?:-?[0-9]+,?)+)\]").expect("valid regex"))
}

fn collect(re: &Regex, text: &str) -> Vec<u64> {
    re.captures_iter(text)
        .filter_map(|cap| cap[1].parse().ok())
        .collect()
}

/// Timestamps from whichever marker family is present.
///
/// `m-lap-us-` wins when it has at least two values; otherwise the
/// `m-timestamp-` values are returned (possibly empty).
pub fn timestamps(text: &str) -> Timestamps {
    let laps = collect(lap_re(), text);
    if laps.len() >= 2 {
        return Timestamps {
            family: TimestampFamily::LapMicros,
            values: laps,
        };
    }
    let stamps = collect(timestamp_re(), text);
    if stamps.len() >= 2 || laps.is_empty() {
        return Timestamps {
            family: TimestampFamily::Timestamp,
            values: stamps,
        };
    }
    Timestamps {
        family: TimestampFamily::LapMicros,
        values: laps,
    }
}

/// Difference between the first and second timestamp.
pub fn latency(text: &str) -> Result<Latency, ParseError> {
    let stamps = timestamps(text);
    match stamps.values.as_slice() {
        [start, end, ..] => Ok(Latency {
            micros: end.saturating_sub(*start),
            family: stamps.family,
        }),
        other => Err(ParseError::MissingTimestamps { found: other.len() }),
    }
}

/// Decoded transcript from `m-results-s[...]`, lowercased and trimmed.
pub fn result_text(text: &str) -> Result<String, ParseError> {
    text_re()
        .captures(text)
        .map(|cap| cap[1].trim().to_lowercase())
        .ok_or(ParseError::MissingResultText)
}

/// Signed 8-bit tensor from `m-results-[v0,v1,...]`.
pub fn result_values(text: &str) -> Result<Vec<i8>, ParseError> {
    let cap = values_re()
        .captures(text)
        .ok_or(ParseError::MissingResultValues)?;
    cap[1]
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i8>()
                .map_err(|_| ParseError::ValueOutOfRange(s.to_string()))
        })
        .collect()
}
