//! Strictly ordered appender for the destination image file.

use crate::error::{ImagingError, Result};
use crate::layout::Block;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const WRITE_BUFFER_SIZE: usize = 131_072;

/// Appends released blocks to the destination file.
///
/// Blocks must arrive in ascending offset order with no gaps; the writer
/// refuses anything else, which turns a scheduler ordering bug into an
/// immediate error instead of a silently corrupted image.
#[derive(Debug)]
pub struct ImageWriter {
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl ImageWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| ImagingError::WriteFailure {
            offset: 0,
            source,
        })?;

        Ok(Self {
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            bytes_written: 0,
        })
    }

    pub fn append(&mut self, block: &Block) -> Result<()> {
        if block.offset != self.bytes_written {
            return Err(ImagingError::WriteFailure {
                offset: block.offset,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "block released out of order (expected offset {})",
                        self.bytes_written
                    ),
                ),
            });
        }

        self.writer
            .write_all(&block.data)
            .map_err(|source| ImagingError::WriteFailure {
                offset: block.offset,
                source,
            })?;

        self.bytes_written += block.data.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes buffered data and syncs the file to disk.
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .map_err(|source| ImagingError::WriteFailure {
                offset: self.bytes_written,
                source,
            })?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|source| ImagingError::WriteFailure {
                offset: self.bytes_written,
                source,
            })?;
        Ok(self.bytes_written)
    }
}
