//! # CFU Bench
//!
//! Host-side driver for the MLPerf-Tiny style benchmark interface exposed by
//! the wav2letter accelerator firmware. It talks to the board over a serial
//! link: navigates the firmware menu into benchmark mode, uploads an input
//! tensor as hex-encoded `db` commands, triggers inference and scrapes the
//! board's text output for timing and result markers.
//!
//! Two runs are built on the same session:
//! - a functional test comparing the output tensor with a golden file, and
//! - a dataset evaluation reporting average latency and word accuracy.

pub mod config;
pub mod ctc;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod markers;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod upload;
pub mod verify;
pub mod wer;

pub use config::{BenchConfig, ProtocolConfig, SerialConfig};
pub use dataset::TestCase;
pub use driver::{run_functional_test, Evaluation, FunctionalReport, RunSummary};
pub use error::{ConfigError, FailureKind, ParseError, SessionError, SetupError, TransportError};
pub use markers::{DeviceResponse, Latency};
pub use session::{Session, SessionState};
pub use transport::{SerialTransport, Transport};
pub use upload::UploadEncoder;
pub use verify::{AggregateResult, Comparison, EvaluationReport, GoldenVector};
pub use wer::{EditDistanceWer, WordErrorRate};
