//! Turns a binary payload into the `db load` announcement plus a sequence of
//! `db <hex>%` data commands.

use std::num::NonZeroUsize;

use crate::protocol::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadEncoder {
    chunk_size: NonZeroUsize,
}

impl UploadEncoder {
    pub fn new(chunk_size: NonZeroUsize) -> Self {
        Self { chunk_size }
    }

    /// Returns `None` for a zero chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Option<Self> {
        NonZeroUsize::new(chunk_size).map(Self::new)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    pub fn announce(&self, payload: &[u8]) -> Command {
        Command::DbLoad(payload.len())
    }

    /// Number of data commands `payload` needs: `ceil(len / chunk_size)`.
    pub fn chunk_count(&self, payload: &[u8]) -> usize {
        payload.len().div_ceil(self.chunk_size.get())
    }

    /// Data commands in send order. The last one may carry fewer than
    /// `chunk_size` bytes; an empty payload yields none.
    pub fn chunks<'a>(&self, payload: &'a [u8]) -> impl Iterator<Item = Command> + 'a {
        payload
            .chunks(self.chunk_size.get())
            .map(|chunk| Command::DbData(chunk.to_vec()))
    }
}
