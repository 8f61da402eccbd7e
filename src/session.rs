//! The host side of one connected session with the benchmark firmware.
//!
//! Every transition sends exactly one command and then blocks on exactly one
//! terminator. Nothing is pipelined and nothing is retried: a missing
//! terminator fails the current operation and the caller decides whether the
//! run continues.

use std::io::Write;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ProtocolConfig;
use crate::error::{ConfigError, SessionError, TransportError};
use crate::markers::DeviceResponse;
use crate::protocol::Command;
use crate::transport::{Capture, Transport};
use crate::upload::UploadEncoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The transport failed; the session must be reopened.
    Disconnected,
    /// Transport open; the firmware is assumed to be at its root menu.
    MenuRoot,
    /// The project submenu prompt has been seen.
    ProjectMenu,
    BenchmarkReady,
    AwaitingUpload,
    AwaitingInference,
    ReportReady,
}

/// States from which a new command may be issued. `ReportReady` becomes
/// `BenchmarkReady` as soon as the next command goes out.
const READY_STATES: &[SessionState] = &[SessionState::BenchmarkReady, SessionState::ReportReady];

/// Counts from a completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub bytes_sent: usize,
    pub chunks: usize,
}

pub struct Session<T: Transport> {
    transport: T,
    config: ProtocolConfig,
    encoder: UploadEncoder,
    timeout: Duration,
    state: SessionState,
}

impl<T: Transport> Session<T> {
    /// Wraps an already opened transport. Fails if `config` is invalid.
    pub fn new(transport: T, config: ProtocolConfig, timeout: Duration) -> Result<Self, ConfigError> {
        config.validate()?;
        let encoder = UploadEncoder::with_chunk_size(config.chunk_size)
            .ok_or_else(|| ConfigError::Invalid("chunk_size must be positive".into()))?;
        Ok(Self {
            transport,
            config,
            encoder,
            timeout,
            state: SessionState::MenuRoot,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Ends the session, releasing the transport.
    pub fn close(self) {
        drop(self.transport);
        info!("session closed");
    }

    fn require(&self, action: &'static str, allowed: &[SessionState]) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    /// A transport failure means the link is gone; only reconnecting resets it.
    fn link<R>(&mut self, result: Result<R, TransportError>) -> Result<R, SessionError> {
        result.map_err(|e| {
            self.state = SessionState::Disconnected;
            SessionError::Transport(e)
        })
    }

    fn send(&mut self, command: &Command) -> Result<(), SessionError> {
        let wire = command.to_wire();
        if !matches!(command, Command::DbData(_)) {
            debug!(command = %wire.trim_end(), "sending");
        }
        let written = self.transport.write_all(wire.as_bytes());
        self.link(written)
    }

    fn await_marker(&mut self, marker: &str) -> Result<Capture, SessionError> {
        let read = self.transport.read_until(marker.as_bytes(), self.timeout);
        self.link(read)
    }

    /// Sends `command`, then waits for `terminator`; a missing terminator is a
    /// [`SessionError::Timeout`].
    fn exchange(&mut self, command: &Command, terminator: &str) -> Result<DeviceResponse, SessionError> {
        self.send(command)?;
        let capture = self.await_marker(terminator)?;
        self.expect_terminated(command, terminator, capture)
    }

    fn expect_terminated(
        &self,
        command: &Command,
        terminator: &str,
        capture: Capture,
    ) -> Result<DeviceResponse, SessionError> {
        let response = DeviceResponse::from(capture);
        if response.is_timeout() {
            return Err(SessionError::Timeout {
                command: command.to_wire().trim_end().to_string(),
                awaiting: terminator.to_string(),
                captured: response.text,
            });
        }
        debug!(board = %response.text.trim(), "received");
        Ok(response)
    }

    /// Project menu, then benchmark mode.
    pub fn enter_benchmark_mode(&mut self) -> Result<(), SessionError> {
        self.require("open the project menu", &[SessionState::MenuRoot])?;
        let prompt = self.config.project_prompt.clone();
        let project_menu = Command::MenuKey(self.config.project_menu_key.clone());
        self.exchange(&project_menu, &prompt)?;
        self.state = SessionState::ProjectMenu;
        std::thread::sleep(self.config.menu_settle());

        let ready = self.config.ready_marker.clone();
        let benchmark = Command::MenuKey(self.config.benchmark_key.clone());
        self.exchange(&benchmark, &ready)?;
        self.state = SessionState::BenchmarkReady;
        info!("benchmark mode entered, device is ready");
        Ok(())
    }

    /// Asks the firmware to identify itself and returns what it printed.
    pub fn identify(&mut self) -> Result<String, SessionError> {
        self.require("identify the device", READY_STATES)?;
        let ready = self.config.ready_marker.clone();
        let response = self.exchange(&Command::Name, &ready)?;
        let name = response
            .text
            .strip_suffix(ready.as_str())
            .unwrap_or(&response.text)
            .trim()
            .to_string();
        info!(device = %name, "device identified");
        Ok(name)
    }

    /// Uploads `payload` with a `db load` announcement followed by data chunks,
    /// each acknowledged by the readiness marker.
    ///
    /// A missing acknowledgment, for the announcement (chunk 0) or any data
    /// chunk, aborts the upload with [`SessionError::Transfer`]; nothing is
    /// resent.
    pub fn upload(&mut self, payload: &[u8]) -> Result<UploadReport, SessionError> {
        self.require("upload", READY_STATES)?;
        let discarded = self.transport.discard_input();
        self.link(discarded)?;

        let ready = self.config.ready_marker.clone();
        let chunks = self.encoder.chunk_count(payload);
        let announce = self.encoder.announce(payload);
        self.send(&announce)?;
        self.state = SessionState::AwaitingUpload;
        let capture = self.await_marker(&ready)?;
        if !capture.terminated {
            self.state = SessionState::BenchmarkReady;
            return Err(SessionError::Transfer {
                chunk: 0,
                total_chunks: chunks,
                bytes_acked: 0,
                total_bytes: payload.len(),
                captured: capture.text(),
            });
        }

        info!(
            bytes = payload.len(),
            chunks,
            chunk_size = self.encoder.chunk_size(),
            "uploading input"
        );
        let bytes_sent = match self.send_chunks(payload, &ready) {
            Ok(bytes) => bytes,
            Err(e) => {
                if self.state != SessionState::Disconnected {
                    self.state = SessionState::BenchmarkReady;
                }
                return Err(e);
            }
        };
        self.state = SessionState::BenchmarkReady;
        info!(bytes = bytes_sent, "finished sending input");
        Ok(UploadReport { bytes_sent, chunks })
    }

    fn send_chunks(&mut self, payload: &[u8], ready: &str) -> Result<usize, SessionError> {
        let encoder = self.encoder;
        let total_chunks = encoder.chunk_count(payload);
        let mut bytes_acked = 0;
        for (index, chunk) in encoder.chunks(payload).enumerate() {
            let len = match &chunk {
                Command::DbData(bytes) => bytes.len(),
                _ => 0,
            };
            self.send(&chunk)?;
            let capture = self.await_marker(ready)?;
            if !capture.terminated {
                return Err(SessionError::Transfer {
                    chunk: index + 1,
                    total_chunks,
                    bytes_acked,
                    total_bytes: payload.len(),
                    captured: capture.text(),
                });
            }
            bytes_acked += len;
        }
        Ok(bytes_acked)
    }

    /// Triggers inference and collects everything the board prints until the
    /// readiness marker, echoing it live when configured to.
    pub fn infer(&mut self) -> Result<DeviceResponse, SessionError> {
        self.require("run inference", READY_STATES)?;
        let command = Command::Infer {
            iterations: self.config.infer_iterations,
            warmup: self.config.infer_warmup,
        };
        self.send(&command)?;
        self.state = SessionState::AwaitingInference;
        info!("inference running");

        let ready = self.config.ready_marker.clone();
        let echo = self.config.echo_inference;
        let mut stdout = std::io::stdout();
        let captured = self.transport.read_until_observed(ready.as_bytes(), self.timeout, &mut |byte| {
            if echo {
                let _ = stdout.write_all(&[byte]);
                let _ = stdout.flush();
            }
        });
        if echo {
            println!();
        }
        let capture = self.link(captured)?;
        if !capture.terminated {
            warn!("read timed out during inference");
            self.state = SessionState::BenchmarkReady;
            return self.expect_terminated(&command, &ready, capture);
        }
        self.state = SessionState::ReportReady;
        info!("inference complete");
        Ok(DeviceResponse::from(capture))
    }

    /// Upload, then infer: one full test case.
    pub fn run_case(&mut self, payload: &[u8]) -> Result<DeviceResponse, SessionError> {
        self.upload(payload)?;
        self.infer()
    }
}
