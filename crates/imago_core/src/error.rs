use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("Cannot open device {path}: {source}")]
    DeviceUnavailable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot determine the size of {path}")]
    SizeUnknown { path: String },

    #[error("Block size {requested} is not a positive multiple of the native block size {native}")]
    InvalidBlockSize { requested: u64, native: u64 },

    #[error("Read error at offset {offset}: {source}")]
    ReadFailure {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("Write error at offset {offset}: {source}")]
    WriteFailure {
        offset: u64,
        #[source]
        source: io::Error,
    },
}

impl ImagingError {
    /// Byte offset the failure occurred at, for the errors that carry one.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::ReadFailure { offset, .. } | Self::WriteFailure { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImagingError>;
