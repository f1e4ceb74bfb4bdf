//! Core trait defining the interface for raw block sources.
//!
//! The trait follows the Ports & Adapters pattern to keep the imaging
//! engine decoupled from platform-specific device access.

use crate::error::{ImagingError, Result};
use std::io;

/// A source of raw block data, typically a disk or image file.
///
/// Reads are positioned: every call names its own byte offset, so a single
/// handle can serve concurrent reader workers without an implicit cursor
/// racing between them. Implementations must never rely on shared seek
/// state.
///
/// # Example
///
/// ```ignore
/// struct DiskDevice { /* ... */ }
///
/// impl BlockSource for DiskDevice {
///     fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
///         // Positioned read from the device at `offset`
///     }
///
///     fn size(&self) -> u64 {
///         // Total size in bytes
///     }
/// }
/// ```
pub trait BlockSource: Send + Sync {
    /// Reads up to `buffer.len()` bytes starting at `offset`.
    ///
    /// # Returns
    ///
    /// The number of bytes actually read. A short count is only valid at
    /// the end of the source; mid-source errors surface as
    /// [`ImagingError::ReadFailure`].
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize>;

    /// Returns the total size of the source in bytes.
    fn size(&self) -> u64;

    /// Fills `buffer` completely from `offset`, looping over partial reads.
    ///
    /// Device drivers may legally return fewer bytes than requested per
    /// call; this keeps retrying until the range is satisfied. A source
    /// that ends before the requested range is an error, since the engine
    /// only asks for ranges inside `[0, size)`.
    fn read_full_at(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buffer.len() {
            let position = offset + filled as u64;
            let read = self.read_at(position, &mut buffer[filled..])?;
            if read == 0 {
                return Err(ImagingError::ReadFailure {
                    offset: position,
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "source ended before its advertised size",
                    ),
                });
            }
            filled += read;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns at most `step` bytes per call to exercise the refill loop.
    struct TrickleSource {
        data: Vec<u8>,
        step: usize,
    }

    impl BlockSource for TrickleSource {
        fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
            let offset = offset as usize;
            if offset >= self.data.len() {
                return Ok(0);
            }
            let available = self.data.len() - offset;
            let count = buffer.len().min(self.step).min(available);
            buffer[..count].copy_from_slice(&self.data[offset..offset + count]);
            Ok(count)
        }

        fn size(&self) -> u64 {
            self.data.len() as u64
        }
    }

    #[test]
    fn test_read_full_at_assembles_partial_reads() {
        let source = TrickleSource {
            data: (0..64u8).collect(),
            step: 7,
        };

        let mut buffer = vec![0u8; 40];
        source.read_full_at(10, &mut buffer).unwrap();
        assert_eq!(buffer, (10..50u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_read_full_at_fails_past_end() {
        let source = TrickleSource {
            data: vec![0xAB; 32],
            step: 16,
        };

        let mut buffer = vec![0u8; 64];
        let err = source.read_full_at(0, &mut buffer).unwrap_err();
        match err {
            ImagingError::ReadFailure { offset, .. } => assert_eq!(offset, 32),
            other => panic!("unexpected error: {other}"),
        }
    }
}
