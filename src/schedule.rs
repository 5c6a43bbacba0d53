//! Single-worker scheduler.
//!
//! Executions run on the calling thread, one after another. In repeating mode
//! firing times are `origin + n * period` (fixed rate): an execution that
//! overruns its period makes the next one fire immediately, and no firing is
//! skipped. There is no timeout around a task, so a task that never returns
//! blocks every later firing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn elapsed(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

pub trait Task {
    fn run(&mut self);
}

/// Cancellation token for the fixed-rate loop. Checked before every firing.
#[derive(Clone, Default, Debug)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Shutdown {
        Shutdown::default()
    }
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("scheduler has been shut down")]
    Terminated,
    #[error("period must be greater than zero")]
    ZeroPeriod,
}

pub struct Scheduler<C: Clock> {
    clock: C,
    shutdown: Option<Shutdown>,
    terminated: bool,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C) -> Scheduler<C> {
        Scheduler {
            clock,
            shutdown: None,
            terminated: false,
        }
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Scheduler<C> {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Stops accepting work. Anything submitted afterwards is rejected.
    pub fn shutdown(&mut self) {
        self.terminated = true;
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().map_or(false, Shutdown::is_triggered)
    }

    pub fn execute<T: Task + ?Sized>(&mut self, task: &mut T) -> Result<(), ScheduleError> {
        if self.terminated {
            return Err(ScheduleError::Terminated);
        }
        task.run();
        Ok(())
    }

    /// Runs `task` now and then every `period`, measured from the first
    /// firing. Returns only if a [`Shutdown`] token is triggered.
    pub fn schedule_at_fixed_rate<T: Task + ?Sized>(
        &mut self,
        task: &mut T,
        period: Duration,
    ) -> Result<(), ScheduleError> {
        if self.terminated {
            return Err(ScheduleError::Terminated);
        }
        if period.is_zero() {
            return Err(ScheduleError::ZeroPeriod);
        }

        let mut fire_at = self.clock.elapsed();
        loop {
            let now = self.clock.elapsed();
            if fire_at > now {
                self.clock.sleep(fire_at - now);
            }
            if self.cancelled() {
                debug!("fixed-rate schedule cancelled");
                self.terminated = true;
                return Ok(());
            }
            trace!("firing at {:?} (due {:?})", self.clock.elapsed(), fire_at);
            task.run();
            fire_at += period;
        }
    }

    /// Runs `task` exactly once and shuts down, or hands it to the fixed-rate
    /// loop.
    pub fn run<T: Task + ?Sized>(
        &mut self,
        task: &mut T,
        run_once: bool,
        interval: Duration,
    ) -> Result<(), ScheduleError> {
        if run_once {
            debug!("running once");
            let result = self.execute(task);
            self.shutdown();
            result
        } else {
            debug!("running every {}s", interval.as_secs());
            self.schedule_at_fixed_rate(task, interval)
        }
    }
}
