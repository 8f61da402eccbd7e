//! Run configuration: serial link settings and the immutable protocol constants
//! handed to the session and upload encoder at construction time.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Readiness marker printed by the benchmark firmware after every command.
pub const READY_MARKER: &str = "m-ready\r\n";

/// Prompt printed by the firmware once the project menu is showing.
pub const PROJECT_PROMPT: &str = "project> ";

/// Upper bound on how long a single command may take (inference included).
pub const DEFAULT_TIMEOUT_SECS: u64 = 900;

pub const DEFAULT_BAUD: u32 = 1_843_200;

#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM3";
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// A tensor shape whose element count is the byte length of an int8 buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorShape<const N: usize>(pub [usize; N]);

impl<const N: usize> TensorShape<N> {
    pub fn byte_len(&self) -> usize {
        self.0.iter().product()
    }
}

/// ASR model input, `1 x 296 x 39` int8 features.
pub const INPUT_SHAPE: TensorShape<3> = TensorShape([1, 296, 39]);

/// ASR model output, `1 x 1 x 148 x 29` int8 logits.
pub const OUTPUT_SHAPE: TensorShape<4> = TensorShape([1, 1, 148, 29]);

/// Number of output classes per timestep (last output dimension).
pub const OUTPUT_CLASSES: usize = OUTPUT_SHAPE.0[3];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BenchConfig {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud")]
    pub baud: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Everything the session needs to speak to the firmware.
///
/// Built once (from defaults, a preset or a TOML file) and never mutated while
/// a session is running.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    #[serde(default = "default_ready_marker")]
    pub ready_marker: String,

    #[serde(default = "default_project_prompt")]
    pub project_prompt: String,

    #[serde(default = "default_project_menu_key")]
    pub project_menu_key: String,

    #[serde(default = "default_benchmark_key")]
    pub benchmark_key: String,

    /// Expected input payload length in bytes.
    #[serde(default = "default_payload_len")]
    pub payload_len: usize,

    /// Source bytes carried by each `db <hex>%` command.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Expected number of values in an `m-results-[...]` tensor.
    #[serde(default = "default_result_len")]
    pub result_len: usize,

    #[serde(default = "default_infer_iterations")]
    pub infer_iterations: u32,

    #[serde(default)]
    pub infer_warmup: u32,

    /// Pause after the project prompt before sending the benchmark key.
    #[serde(default = "default_menu_settle_ms")]
    pub menu_settle_ms: u64,

    /// Echo inference output to stdout byte by byte while it streams in.
    #[serde(default = "default_true")]
    pub echo_inference: bool,
}

impl ProtocolConfig {
    /// Settings used by the dataset evaluation run.
    pub fn evaluation() -> Self {
        Self::default()
    }

    /// Settings used by the golden functional test.
    pub fn functional() -> Self {
        Self {
            chunk_size: 32,
            ..Self::default()
        }
    }

    pub fn menu_settle(&self) -> Duration {
        Duration::from_millis(self.menu_settle_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ready_marker.is_empty() {
            return Err(ConfigError::Invalid("ready_marker must not be empty".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.payload_len == 0 {
            return Err(ConfigError::Invalid("payload_len must be positive".into()));
        }
        if self.result_len == 0 {
            return Err(ConfigError::Invalid("result_len must be positive".into()));
        }
        Ok(())
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            ready_marker: default_ready_marker(),
            project_prompt: default_project_prompt(),
            project_menu_key: default_project_menu_key(),
            benchmark_key: default_benchmark_key(),
            payload_len: default_payload_len(),
            chunk_size: default_chunk_size(),
            result_len: default_result_len(),
            infer_iterations: default_infer_iterations(),
            infer_warmup: 0,
            menu_settle_ms: default_menu_settle_ms(),
            echo_inference: default_true(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_ready_marker() -> String {
    READY_MARKER.to_string()
}

fn default_project_prompt() -> String {
    PROJECT_PROMPT.to_string()
}

fn default_project_menu_key() -> String {
    "3".to_string()
}

fn default_benchmark_key() -> String {
    "b".to_string()
}

fn default_payload_len() -> usize {
    INPUT_SHAPE.byte_len()
}

fn default_chunk_size() -> usize {
    128
}

fn default_result_len() -> usize {
    OUTPUT_SHAPE.byte_len()
}

fn default_infer_iterations() -> u32 {
    1
}

fn default_menu_settle_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BenchConfig {
    /// Use `protocol` as-is, unless a TOML file is given; a file replaces the
    /// preset and any key it omits falls back to the evaluation defaults.
    pub fn load(path: Option<&Path>, protocol: ProtocolConfig) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self {
                protocol,
                ..Self::default()
            }),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: BenchConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        self.protocol.validate()
    }
}
