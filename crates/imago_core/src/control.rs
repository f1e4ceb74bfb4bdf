//! Cooperative pause/stop gate shared by the dispatch and release paths.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Run,
    Pause,
    Halt,
}

/// Wake-on-resume gate consulted before dispatching a new block and before
/// writing a released one.
///
/// Paused workers sleep on a condvar rather than spinning; `resume` and
/// `halt` wake them. A halt is terminal, whether it came from `stop()` or
/// from the coordinator shutting the pipeline down after an error.
#[derive(Debug, Default)]
pub struct JobControl {
    directive: Mutex<Directive>,
    wakeup: Condvar,
}

impl Default for Directive {
    fn default() -> Self {
        Directive::Run
    }
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        let mut directive = self.directive.lock();
        if *directive == Directive::Run {
            *directive = Directive::Pause;
        }
    }

    pub fn resume(&self) {
        let mut directive = self.directive.lock();
        if *directive == Directive::Pause {
            *directive = Directive::Run;
            self.wakeup.notify_all();
        }
    }

    pub fn halt(&self) {
        let mut directive = self.directive.lock();
        *directive = Directive::Halt;
        self.wakeup.notify_all();
    }

    pub fn halted(&self) -> bool {
        *self.directive.lock() == Directive::Halt
    }

    /// Blocks while paused. Returns `false` once a halt has been
    /// requested, `true` when the caller may dispatch the next block.
    pub fn wait_for_dispatch(&self) -> bool {
        let mut directive = self.directive.lock();
        while *directive == Directive::Pause {
            self.wakeup.wait(&mut directive);
        }
        *directive != Directive::Halt
    }
}
