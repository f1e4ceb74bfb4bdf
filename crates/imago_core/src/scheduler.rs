//! Block dispatch: sequential or pooled reads, strictly ordered release.

use crate::control::JobControl;
use crate::error::Result;
use crate::layout::{Block, BlockLayout, BlockRange};
use crate::traits::BlockSource;
use crossbeam_channel::bounded;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::debug;

/// How a dispatch run ended when no I/O error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every block was read and released.
    Completed,
    /// A halt was requested; dispatch stopped at a block boundary.
    Interrupted,
}

/// Reads the blocks of a [`BlockLayout`] and releases them to a sink in
/// ascending offset order, regardless of read completion order.
///
/// With a parallelism degree of 1 a single loop reads and releases each
/// block in turn. With N > 1, N reader workers claim block indexes from a
/// shared atomic cursor, so a worker that finishes early immediately picks
/// up the next unread block instead of idling behind a static partition.
/// Out-of-order completions park in a reordering buffer until their
/// predecessor has been released.
///
/// Two cooperative checkpoints bound every run: the dispatch gate before a
/// block is claimed (blocks while paused, exits on halt) and a halt check
/// before a released block reaches the sink. In-flight reads finish on
/// their own and are discarded once a halt is seen.
pub struct BlockScheduler {
    layout: BlockLayout,
    parallelism: usize,
}

impl BlockScheduler {
    pub fn new(layout: BlockLayout, parallelism: usize) -> Self {
        Self {
            layout,
            parallelism: parallelism.max(1),
        }
    }

    pub fn run<S, F>(&self, source: &S, control: &JobControl, deliver: F) -> Result<DispatchOutcome>
    where
        S: BlockSource + ?Sized,
        F: FnMut(Block) -> Result<()>,
    {
        if self.parallelism == 1 {
            self.run_sequential(source, control, deliver)
        } else {
            self.run_parallel(source, control, deliver)
        }
    }

    fn run_sequential<S, F>(
        &self,
        source: &S,
        control: &JobControl,
        mut deliver: F,
    ) -> Result<DispatchOutcome>
    where
        S: BlockSource + ?Sized,
        F: FnMut(Block) -> Result<()>,
    {
        for range in self.layout.ranges() {
            if !control.wait_for_dispatch() {
                return Ok(DispatchOutcome::Interrupted);
            }

            let block = read_block(source, range)?;

            if control.halted() {
                return Ok(DispatchOutcome::Interrupted);
            }
            deliver(block)?;
        }

        Ok(DispatchOutcome::Completed)
    }

    fn run_parallel<S, F>(
        &self,
        source: &S,
        control: &JobControl,
        mut deliver: F,
    ) -> Result<DispatchOutcome>
    where
        S: BlockSource + ?Sized,
        F: FnMut(Block) -> Result<()>,
    {
        let layout = self.layout;
        let block_count = layout.block_count();
        let cursor = AtomicU64::new(0);
        let (block_tx, block_rx) = bounded::<Result<Block>>(self.parallelism * 2);

        thread::scope(|scope| {
            for worker in 0..self.parallelism {
                let block_tx = block_tx.clone();
                let cursor = &cursor;
                thread::Builder::new()
                    .name(format!("imago-read-{worker}"))
                    .spawn_scoped(scope, move || {
                        loop {
                            if !control.wait_for_dispatch() {
                                break;
                            }
                            let index = cursor.fetch_add(1, Ordering::SeqCst);
                            let Some(range) = layout.range_at(index) else {
                                break;
                            };

                            let result = read_block(source, range);
                            let failed = result.is_err();
                            if block_tx.send(result).is_err() || failed {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn reader worker");
            }
            drop(block_tx);

            let mut pending: BTreeMap<u64, Block> = BTreeMap::new();
            let mut next_release: u64 = 0;
            let mut outcome: Result<DispatchOutcome> = Ok(DispatchOutcome::Completed);

            'receive: while next_release < block_count {
                let message = match block_rx.recv() {
                    Ok(message) => message,
                    // All workers gone before the last release: a halt
                    // drained the pool.
                    Err(_) => {
                        outcome = Ok(DispatchOutcome::Interrupted);
                        break;
                    }
                };

                match message {
                    Ok(block) => {
                        let displaced = pending.insert(block.index, block);
                        debug_assert!(displaced.is_none());
                    }
                    Err(error) => {
                        outcome = Err(error);
                        break;
                    }
                }

                while let Some(block) = pending.remove(&next_release) {
                    if control.halted() {
                        outcome = Ok(DispatchOutcome::Interrupted);
                        break 'receive;
                    }
                    if let Err(error) = deliver(block) {
                        outcome = Err(error);
                        break 'receive;
                    }
                    next_release += 1;
                }
            }

            // Wake paused workers and unblock senders so the scope can
            // join; a no-op when the run completed normally.
            control.halt();
            drop(block_rx);

            if let Ok(dispatch) = &outcome {
                debug!(
                    released = next_release,
                    total = block_count,
                    ?dispatch,
                    "parallel dispatch finished"
                );
            }
            outcome
        })
    }
}

fn read_block<S: BlockSource + ?Sized>(source: &S, range: BlockRange) -> Result<Block> {
    let mut data = vec![0u8; range.len];
    source.read_full_at(range.offset, &mut data)?;
    Ok(Block {
        index: range.index,
        offset: range.offset,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImagingError;
    use std::io;
    use std::time::Duration;

    struct MemorySource {
        data: Vec<u8>,
    }

    impl BlockSource for MemorySource {
        fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
            let offset = offset as usize;
            if offset >= self.data.len() {
                return Ok(0);
            }
            let count = buffer.len().min(self.data.len() - offset);
            buffer[..count].copy_from_slice(&self.data[offset..offset + count]);
            Ok(count)
        }

        fn size(&self) -> u64 {
            self.data.len() as u64
        }
    }

    /// Sleeps an offset-dependent amount per read to force out-of-order
    /// completions under parallel dispatch.
    struct JitterSource {
        inner: MemorySource,
    }

    impl BlockSource for JitterSource {
        fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
            let delay = (offset / 1024).wrapping_mul(7) % 5;
            std::thread::sleep(Duration::from_millis(delay));
            self.inner.read_at(offset, buffer)
        }

        fn size(&self) -> u64 {
            self.inner.size()
        }
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
    }

    fn collect_released(
        source: &impl BlockSource,
        block_size: u64,
        parallelism: usize,
    ) -> (Vec<u8>, usize) {
        let layout = BlockLayout::new(source.size(), block_size);
        let scheduler = BlockScheduler::new(layout, parallelism);
        let control = JobControl::new();

        let mut released = Vec::new();
        let mut count = 0usize;
        let outcome = scheduler
            .run(source, &control, |block| {
                assert_eq!(block.offset, released.len() as u64);
                released.extend_from_slice(&block.data);
                count += 1;
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Completed);
        (released, count)
    }

    #[test]
    fn test_sequential_releases_everything_in_order() {
        let source = MemorySource {
            data: patterned(10 * 1024 + 100),
        };
        let (released, count) = collect_released(&source, 1024, 1);

        assert_eq!(released, source.data);
        assert_eq!(count, 11);
    }

    #[test]
    fn test_parallel_reorders_to_ascending_offsets() {
        let source = JitterSource {
            inner: MemorySource {
                data: patterned(64 * 1024),
            },
        };
        let (released, count) = collect_released(&source, 1024, 4);

        assert_eq!(released, source.inner.data);
        assert_eq!(count, 64);
    }

    #[test]
    fn test_halt_before_run_releases_nothing() {
        let source = MemorySource {
            data: patterned(4096),
        };
        let layout = BlockLayout::new(source.size(), 1024);
        let scheduler = BlockScheduler::new(layout, 1);
        let control = JobControl::new();
        control.halt();

        let outcome = scheduler
            .run(&source, &control, |_| panic!("nothing should be released"))
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Interrupted);
    }

    #[test]
    fn test_read_error_propagates_from_workers() {
        struct FailingSource {
            inner: MemorySource,
            fail_at: u64,
        }

        impl BlockSource for FailingSource {
            fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
                if offset >= self.fail_at {
                    return Err(ImagingError::ReadFailure {
                        offset,
                        source: io::Error::other("injected"),
                    });
                }
                self.inner.read_at(offset, buffer)
            }

            fn size(&self) -> u64 {
                self.inner.size()
            }
        }

        let source = FailingSource {
            inner: MemorySource {
                data: patterned(16 * 1024),
            },
            fail_at: 8 * 1024,
        };
        let layout = BlockLayout::new(source.size(), 1024);
        let scheduler = BlockScheduler::new(layout, 4);
        let control = JobControl::new();

        let err = scheduler.run(&source, &control, |_| Ok(())).unwrap_err();
        match err {
            ImagingError::ReadFailure { offset, .. } => assert!(offset >= 8 * 1024),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_parallelism_treated_as_sequential() {
        let source = MemorySource {
            data: patterned(2048),
        };
        let (released, count) = collect_released(&source, 1024, 0);

        assert_eq!(released, source.data);
        assert_eq!(count, 2);
    }
}
