//! In-memory stand-in for the benchmark firmware, driven through the
//! `Transport` trait.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use cfu_bench::config::ProtocolConfig;
use cfu_bench::{Session, Transport, TransportError};

pub const READY: &str = "m-ready\r\n";

/// What the board prints in response to `infer`.
#[derive(Debug, Clone)]
pub enum InferReply {
    /// Two lap markers `start`/`end` and a decoded transcript.
    Text { start: u64, end: u64, text: String },
    /// Two timestamp markers and the raw int8 tensor.
    Values { start: u64, end: u64, values: Vec<i8> },
    /// Arbitrary output, terminated with the readiness marker.
    Raw(String),
    /// Some output, then nothing: the readiness marker never comes.
    Hang(String),
}

#[derive(Debug, PartialEq)]
enum BoardError {
    /// Command text has no known prefix.
    UnknownCommand(String),
    /// `db` payload is not valid hex.
    InvalidHex,
    /// Data arrived without a preceding `db load`.
    NotLoading,
}

#[derive(Debug, Default)]
pub struct FakeBoard {
    pub inbound: String,
    pub outbound: VecDeque<u8>,
    pub benchmark_mode: bool,
    pub expected_len: usize,
    pub is_loading: bool,
    pub chunks_acked: usize,
    /// Every complete command received, in order.
    pub commands: Vec<String>,
    /// Bytes reassembled from `db <hex>%` commands since the last `db load`.
    pub loaded: Vec<u8>,
    /// Queued replies, one per `infer`; the default reply is used when empty.
    pub replies: VecDeque<InferReply>,
    /// Stop acknowledging data chunks once this many have been acked.
    pub ack_limit: Option<usize>,
    /// Never show the project prompt.
    pub mute_menu: bool,
    /// Accept `db load` without acknowledging it.
    pub mute_load: bool,
    /// Make every write fail as if the cable was pulled.
    pub unplugged: bool,
}

impl FakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = InferReply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn data_commands(&self) -> usize {
        self.commands.iter().filter(|c| c.starts_with("db ") && !c.starts_with("db load")).count()
    }

    fn reply(&mut self, text: &str) {
        self.outbound.extend(text.as_bytes());
    }

    fn feed(&mut self) {
        loop {
            let terminator = if self.benchmark_mode { '%' } else { '\n' };
            let Some(end) = self.inbound.find(terminator) else {
                return;
            };
            let frame: String = self.inbound.drain(..=end).collect();
            self.commands.push(frame.clone());
            let body = frame.trim_end_matches(terminator).trim().to_string();
            if self.benchmark_mode {
                if let Err(e) = self.process_command(&body) {
                    self.reply(&format!("e-[{e:?}]\r\n{READY}"));
                }
            } else {
                self.process_menu_key(&body);
            }
        }
    }

    fn process_menu_key(&mut self, key: &str) {
        match key {
            "3" if !self.mute_menu => self.reply("\r\nProject Menu\r\n w: Wav2letter Tests\r\n b: Benchmark\r\nproject> "),
            "b" => {
                self.benchmark_mode = true;
                self.reply(&format!("Initializing\r\n{READY}"));
            }
            _ => {}
        }
    }

    fn process_command(&mut self, body: &str) -> Result<(), BoardError> {
        if body == "name" {
            self.reply(&format!("m-name-[wav2letter]\r\n{READY}"));
        } else if let Some(len) = body.strip_prefix("db load ") {
            self.expected_len = len.trim().parse().map_err(|_| BoardError::UnknownCommand(body.into()))?;
            self.loaded.clear();
            self.is_loading = true;
            if !self.mute_load {
                self.reply(&format!("m-[Expecting {} bytes]\r\n{READY}", self.expected_len));
            }
        } else if let Some(hex) = body.strip_prefix("db ") {
            if !self.is_loading {
                return Err(BoardError::NotLoading);
            }
            let bytes = decode_hex(hex).ok_or(BoardError::InvalidHex)?;
            self.loaded.extend(bytes);
            if self.ack_limit.is_some_and(|limit| self.chunks_acked >= limit) {
                return Ok(());
            }
            self.chunks_acked += 1;
            if self.loaded.len() >= self.expected_len {
                self.is_loading = false;
                self.reply("m-load-done\r\n");
            }
            self.reply(READY);
        } else if body.starts_with("infer") {
            let reply = self.replies.pop_front().unwrap_or(InferReply::Text {
                start: 0,
                end: 1000,
                text: String::new(),
            });
            self.reply(&render(&reply));
        } else {
            return Err(BoardError::UnknownCommand(body.to_string()));
        }
        Ok(())
    }
}

fn render(reply: &InferReply) -> String {
    match reply {
        InferReply::Text { start, end, text } => format!(
            "m-lap-us-{start}\r\n....\r\nm-lap-us-{end}\r\nm-results-s[{text}]\r\n{READY}"
        ),
        InferReply::Values { start, end, values } => {
            let csv: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            format!(
                "m-timestamp-{start}\r\nm-timestamp-{end}\r\nm-results-[{}]\r\n{READY}",
                csv.join(",")
            )
        }
        InferReply::Raw(text) => format!("{text}{READY}"),
        InferReply::Hang(text) => text.clone(),
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

impl Transport for FakeBoard {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected").into());
        }
        self.inbound.push_str(&String::from_utf8_lossy(bytes));
        self.feed();
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>, TransportError> {
        Ok(self.outbound.pop_front())
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.outbound.clear();
        Ok(())
    }
}

/// Protocol settings with no menu pause and no stdout echo.
pub fn test_protocol(payload_len: usize, chunk_size: usize) -> ProtocolConfig {
    ProtocolConfig {
        payload_len,
        chunk_size,
        menu_settle_ms: 0,
        echo_inference: false,
        ..ProtocolConfig::functional()
    }
}

pub fn session(board: FakeBoard, protocol: ProtocolConfig) -> Session<FakeBoard> {
    Session::new(board, protocol, Duration::from_millis(50)).unwrap()
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}
