//! Commands understood by the board, rendered to their exact wire bytes.
//!
//! Menu selections are newline-terminated single keys; benchmark-mode
//! commands are terminated by `%`.

use std::fmt::{self, Write};

/// Every command the host ever sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Menu key, e.g. `3` for the project menu or `b` for benchmark mode.
    MenuKey(String),
    /// Ask the firmware to identify itself.
    Name,
    /// Announce the byte length of the payload that follows.
    DbLoad(usize),
    /// One slice of the payload, hex encoded.
    DbData(Vec<u8>),
    /// Run inference `iterations` times after `warmup` untimed runs.
    Infer { iterations: u32, warmup: u32 },
}

impl Command {
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::MenuKey(key) => writeln!(f, "{key}"),
            Command::Name => f.write_str("name%"),
            Command::DbLoad(len) => write!(f, "db load {len}%"),
            Command::DbData(bytes) => {
                f.write_str("db ")?;
                f.write_str(&to_hex(bytes))?;
                f.write_char('%')
            }
            Command::Infer { iterations, warmup } => write!(f, "infer {iterations} {warmup}%"),
        }
    }
}

/// Lowercase, two digits per byte.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}
