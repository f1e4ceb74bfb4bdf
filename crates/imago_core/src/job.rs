//! End-to-end imaging job: configuration, state machine, result.

use crate::control::JobControl;
use crate::device::Device;
use crate::digest::{DigestAccumulator, DigestAlgorithm, DigestReport};
use crate::error::{ImagingError, Result};
use crate::layout::BlockLayout;
use crate::progress::{ProgressSample, ProgressTracker};
use crate::scheduler::{BlockScheduler, DispatchOutcome};
use crate::traits::BlockSource;
use crate::writer::ImageWriter;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Per-job settings. Construct with [`ImagingConfig::new`] and adjust
/// fields as needed before handing it to [`ImagingJob::new`].
#[derive(Debug, Clone)]
pub struct ImagingConfig {
    pub destination: PathBuf,
    /// Copy unit in bytes; must be a positive multiple of the device's
    /// native block size.
    pub block_size: u64,
    /// Reader count; 1 means sequential dispatch.
    pub parallelism: usize,
    /// Hash the source stream a second time and compare digests at the
    /// end.
    pub verify: bool,
    pub algorithms: Vec<DigestAlgorithm>,
}

impl ImagingConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            parallelism: 1,
            verify: false,
            algorithms: DigestAlgorithm::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
    Failed,
}

impl JobState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Terminal outcome of a job.
///
/// A cooperative stop is not an error and a digest mismatch after a clean
/// copy is not a failure; both carry enough context (byte counts, digests,
/// offsets) to explain themselves without log access.
#[derive(Debug)]
pub enum JobResult {
    Completed {
        bytes_written: u64,
        /// Digests of the write-ordered stream as it went into the image.
        image_digests: DigestReport,
        /// Digests of the same stream as read from the source, when
        /// verification was requested.
        source_digests: Option<DigestReport>,
        verified: Option<bool>,
    },
    Stopped {
        bytes_written: u64,
    },
    Failed {
        error: ImagingError,
        bytes_written: u64,
    },
}

/// A configured job that has not started yet.
#[derive(Debug)]
pub struct ImagingJob {
    device: Device,
    config: ImagingConfig,
    state: JobState,
}

impl ImagingJob {
    /// Validates the configuration against the device. The job starts in
    /// `Idle` and owns no resources until [`start`](Self::start).
    pub fn new(device: Device, config: ImagingConfig) -> Result<Self> {
        if config.block_size == 0 || config.block_size % device.native_block_size != 0 {
            return Err(ImagingError::InvalidBlockSize {
                requested: config.block_size,
                native: device.native_block_size,
            });
        }

        Ok(Self {
            device,
            config,
            state: JobState::Idle,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &ImagingConfig {
        &self.config
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Opens the destination, transitions to `Running` and spawns the
    /// controller thread.
    ///
    /// The source handle must already be open; its size is the amount that
    /// will be copied and must be known and nonzero before the job starts.
    pub fn start<S>(self, source: S) -> Result<JobHandle>
    where
        S: BlockSource + 'static,
    {
        let total_bytes = source.size();
        if total_bytes == 0 {
            return Err(ImagingError::SizeUnknown {
                path: self.device.identity.clone(),
            });
        }

        let writer = ImageWriter::create(&self.config.destination)?;
        let layout = BlockLayout::new(total_bytes, self.config.block_size);

        let control = Arc::new(JobControl::new());
        let state = Arc::new(Mutex::new(JobState::Running));
        let (sample_tx, sample_rx) = unbounded();

        info!(
            device = %self.device.identity,
            destination = %self.config.destination.display(),
            total_bytes,
            block_size = self.config.block_size,
            parallelism = self.config.parallelism,
            verify = self.config.verify,
            "starting imaging job"
        );

        let remote = JobRemote {
            control: Arc::clone(&control),
            state: Arc::clone(&state),
        };
        let config = self.config;
        let thread = thread::Builder::new()
            .name("imago-job".into())
            .spawn(move || run_job(source, layout, config, writer, control, state, sample_tx))
            .expect("failed to spawn job controller thread");

        Ok(JobHandle {
            remote,
            progress: sample_rx,
            thread,
        })
    }
}

/// Clonable control surface for a running job, safe to hand to signal
/// handlers or other threads.
#[derive(Debug, Clone)]
pub struct JobRemote {
    control: Arc<JobControl>,
    state: Arc<Mutex<JobState>>,
}

impl JobRemote {
    /// Running -> Paused. In-flight reads finish and their blocks are
    /// still released in order; no new reads are dispatched. Returns
    /// whether the transition applied.
    pub fn pause(&self) -> bool {
        let mut state = self.state.lock();
        if *state != JobState::Running {
            return false;
        }
        *state = JobState::Paused;
        self.control.pause();
        debug!("job paused");
        true
    }

    /// Paused -> Running; wakes the dispatch gate.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if *state != JobState::Paused {
            return false;
        }
        *state = JobState::Running;
        self.control.resume();
        debug!("job resumed");
        true
    }

    /// Running|Paused -> Stopped. Cooperative: nothing is interrupted
    /// mid-read and no partial block is ever written.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = JobState::Stopped;
        self.control.halt();
        debug!("job stop requested");
        true
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }
}

/// Owner's view of a started job: control, progress subscription and the
/// terminal result.
#[derive(Debug)]
pub struct JobHandle {
    remote: JobRemote,
    progress: Receiver<ProgressSample>,
    thread: JoinHandle<JobResult>,
}

impl JobHandle {
    pub fn remote(&self) -> JobRemote {
        self.remote.clone()
    }

    pub fn pause(&self) -> bool {
        self.remote.pause()
    }

    pub fn resume(&self) -> bool {
        self.remote.resume()
    }

    pub fn stop(&self) -> bool {
        self.remote.stop()
    }

    pub fn state(&self) -> JobState {
        self.remote.state()
    }

    /// One sample per block released to the writer. The channel closes
    /// when the job reaches a terminal state.
    pub fn progress(&self) -> &Receiver<ProgressSample> {
        &self.progress
    }

    /// Blocks until the job is terminal and returns its result.
    pub fn wait(self) -> JobResult {
        self.thread
            .join()
            .expect("imaging controller thread panicked")
    }
}

fn run_job<S: BlockSource>(
    source: S,
    layout: BlockLayout,
    config: ImagingConfig,
    mut writer: ImageWriter,
    control: Arc<JobControl>,
    state: Arc<Mutex<JobState>>,
    sample_tx: Sender<ProgressSample>,
) -> JobResult {
    let scheduler = BlockScheduler::new(layout, config.parallelism);
    let tracker = ProgressTracker::new(layout.total_bytes());
    let mut image_digest = DigestAccumulator::new(&config.algorithms);
    let mut source_digest = config
        .verify
        .then(|| DigestAccumulator::new(&config.algorithms));

    let outcome = scheduler.run(&source, control.as_ref(), |block| {
        if let Some(digest) = source_digest.as_mut() {
            digest.update(&block.data);
        }
        writer.append(&block)?;
        image_digest.update(&block.data);

        let _ = sample_tx.send(tracker.sample(writer.bytes_written()));
        Ok(())
    });

    let bytes_so_far = writer.bytes_written();
    match outcome {
        Ok(DispatchOutcome::Completed) => match writer.finish() {
            Ok(bytes_written) => {
                let image_digests = image_digest.finalize();
                let (source_digests, verified) = match source_digest {
                    Some(digest) => {
                        let report = digest.finalize();
                        let matches = report == image_digests;
                        (Some(report), Some(matches))
                    }
                    None => (None, None),
                };

                set_terminal(&state, JobState::Completed);
                info!(bytes_written, ?verified, "imaging job completed");
                JobResult::Completed {
                    bytes_written,
                    image_digests,
                    source_digests,
                    verified,
                }
            }
            Err(error) => fail(&state, error, bytes_so_far),
        },
        Ok(DispatchOutcome::Interrupted) => match writer.finish() {
            Ok(bytes_written) => {
                set_terminal(&state, JobState::Stopped);
                info!(bytes_written, "imaging job stopped");
                JobResult::Stopped { bytes_written }
            }
            Err(error) => fail(&state, error, bytes_so_far),
        },
        Err(error) => {
            // Leave whatever was already written on disk; the caller
            // decides what to do with a partial image.
            let _ = writer.finish();
            fail(&state, error, bytes_so_far)
        }
    }
}

fn fail(state: &Mutex<JobState>, error: ImagingError, bytes_written: u64) -> JobResult {
    set_terminal(state, JobState::Failed);
    warn!(%error, bytes_written, "imaging job failed");
    JobResult::Failed {
        error,
        bytes_written,
    }
}

fn set_terminal(state: &Mutex<JobState>, terminal: JobState) {
    let mut state = state.lock();
    if !state.is_terminal() {
        *state = terminal;
    }
}
