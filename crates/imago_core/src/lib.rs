//! Core engine for Imago, a raw device imaging tool.
//!
//! Copies a block source into an output file with byte-for-byte fidelity
//! while digesting the stream, reporting progress and honoring cooperative
//! pause, resume and stop. Platform device access lives in `imago_io`;
//! front ends live above both.

pub mod control;
pub mod device;
pub mod digest;
mod error;
pub mod job;
pub mod layout;
pub mod progress;
pub mod scheduler;
mod traits;
pub mod writer;

pub use control::JobControl;
pub use device::Device;
pub use digest::{DigestAccumulator, DigestAlgorithm, DigestReport};
pub use error::{ImagingError, Result};
pub use job::{
    DEFAULT_BLOCK_SIZE, ImagingConfig, ImagingJob, JobHandle, JobRemote, JobResult, JobState,
};
pub use layout::{Block, BlockLayout, BlockRange};
pub use progress::{ProgressSample, ProgressTracker};
pub use scheduler::{BlockScheduler, DispatchOutcome};
pub use traits::BlockSource;
pub use writer::ImageWriter;
