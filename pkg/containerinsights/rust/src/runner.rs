// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Self-correcting interval scheduler running a task on a dedicated thread.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, error, info, warn};

/// Wait used when a tick overran its slot, so the next tick starts right
/// away without spinning.
pub const CATCH_UP_WAIT: Duration = Duration::from_secs(1);

/// Work driven by a [`PeriodicRunner`].
pub trait PeriodicTask: Send + 'static {
    fn name(&self) -> &str;

    fn run(&mut self) -> Result<()>;

    /// Interval until the next run. Read again before every wait, so a task
    /// may change it from within `run`.
    fn interval(&self) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleState {
    pub next_run_at: Instant,
    pub interval: Duration,
    pub finished: bool,
}

impl ScheduleState {
    pub fn new(now: Instant, interval: Duration) -> Self {
        ScheduleState {
            next_run_at: now,
            interval,
            finished: false,
        }
    }

    /// Moves the schedule one interval forward and returns how long to wait
    /// before the next run.
    ///
    /// When the schedule has fallen behind, it is pulled up to `now` instead
    /// of accumulating the lag.
    pub fn next_wait(&mut self, now: Instant) -> Duration {
        self.next_run_at += self.interval;
        if self.next_run_at <= now {
            self.next_run_at = now;
            CATCH_UP_WAIT
        } else {
            self.next_run_at - now
        }
    }
}

/// Runs a [`PeriodicTask`] every interval on its own thread. Runs never
/// overlap: the next wait starts only after the previous run returned.
pub struct PeriodicRunner<T: PeriodicTask> {
    task: Option<T>,
    finished: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
    handle: Option<JoinHandle<T>>,
}

impl<T: PeriodicTask> PeriodicRunner<T> {
    pub fn new(task: T) -> Self {
        PeriodicRunner {
            task: Some(task),
            finished: Arc::new(AtomicBool::new(false)),
            wake: None,
            handle: None,
        }
    }

    /// Spawns the runner thread. The first run happens one full interval
    /// later. Calling it again is a no-op.
    pub fn start(&mut self) -> io::Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let (wake_tx, wake_rx) = mpsc::channel();
        let finished = self.finished.clone();
        let thread_name = format!("{}-runner", task.name());
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_loop(task, finished, wake_rx))?;
        self.wake = Some(wake_tx);
        self.handle = Some(handle);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the runner and waits for an in-flight run to complete. Returns
    /// the task once the thread has exited; later calls return `None`.
    pub fn shutdown(&mut self) -> Option<T> {
        let handle = self.handle.take()?;
        self.finished.store(true, Ordering::SeqCst);
        if let Some(wake) = self.wake.take() {
            // The receiver only goes away when the thread has already exited.
            let _ = wake.send(());
        }
        match handle.join() {
            Ok(task) => Some(task),
            Err(_) => {
                error!("periodic runner thread panicked");
                None
            }
        }
    }
}

impl<T: PeriodicTask> Drop for PeriodicRunner<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop<T: PeriodicTask>(mut task: T, finished: Arc<AtomicBool>, wake: Receiver<()>) -> T {
    let mut state = ScheduleState::new(Instant::now(), task.interval());
    info!(
        "{}: running every {}s",
        task.name(),
        state.interval.as_secs_f64()
    );

    while !state.finished {
        state.interval = task.interval();
        let wait = state.next_wait(Instant::now());
        match wake.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => state.finished = true,
        }
        state.finished |= finished.load(Ordering::SeqCst);
        if !state.finished {
            run_once(&mut task);
        }
    }

    info!("{}: stopped", task.name());
    task
}

fn run_once<T: PeriodicTask>(task: &mut T) {
    debug!("{}: run start", task.name());
    match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
        Ok(Ok(())) => debug!("{}: run end", task.name()),
        Ok(Err(e)) => warn!("{}: run failed: {e:#}", task.name()),
        Err(_) => error!("{}: run panicked", task.name()),
    }
}
