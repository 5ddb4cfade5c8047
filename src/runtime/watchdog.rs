//! Deadline timer for interpreter runs
//!
//! A watchdog thread sleeps until the deadline or until it is cancelled.
//! When the deadline wins it raises a flag that the interpreter's interrupt
//! handler polls, so the running script is stopped where it is instead of
//! being abandoned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// Timer that raises a shared flag once its deadline elapses
#[derive(Debug)]
pub struct Watchdog {
    expired: Arc<AtomicBool>,
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start the timer; the deadline clock starts now
    pub fn start(deadline: Duration) -> Result<Self> {
        let expired = Arc::new(AtomicBool::new(false));
        let (cancel, cancelled) = mpsc::channel::<()>();

        let flag = Arc::clone(&expired);
        let thread = thread::Builder::new()
            .name("jsfence-watchdog".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(deadline) {
                    debug!("deadline of {:?} elapsed, interrupting script", deadline);
                    flag.store(true, Ordering::SeqCst);
                }
            })?;

        Ok(Watchdog {
            expired,
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }

    /// Flag shared with the interrupt handler
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.expired)
    }

    /// Whether the deadline has elapsed
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    /// Stop the timer and report whether the deadline elapsed first
    pub fn stop(mut self) -> bool {
        self.disarm();
        self.expired()
    }

    fn disarm(&mut self) {
        // Dropping the sender wakes the timer thread
        self.cancel.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
