//! Cooperative cancellation of a running search

use anyhow::{anyhow, Result};
use log::{debug, info};
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit status used when Ctrl-C arrives while no search is running
pub const SIGINT_EXIT_CODE: i32 = 130;

/// The search was stopped on request before it could finish
#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
#[error("search interrupted")]
pub struct Interrupted;

#[derive(Debug, Default)]
struct Flags {
    triggered: AtomicBool,
    // a top-level search is in progress
    armed: AtomicBool,
}

/// A shared flag asking a running search to stop
///
/// Cloning yields a handle to the same flag, so a signal handler or another
/// thread can trigger it while the search polls it.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<Flags>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.triggered.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.triggered.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.0.triggered.load(Ordering::Relaxed)
    }

    pub fn is_armed(&self) -> bool {
        self.0.armed.load(Ordering::SeqCst)
    }

    /// Marks the start of a top-level search, dropping any stale request
    ///
    /// The flag stays armed until the returned guard is dropped.
    pub fn arm(&self) -> Armed {
        self.reset();
        self.0.armed.store(true, Ordering::SeqCst);
        Armed(self.clone())
    }

    /// Routes Ctrl-C to this flag, can only be installed once per process
    ///
    /// Outside of a search Ctrl-C terminates the process as usual.
    pub fn install_ctrlc(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            if flag.is_armed() {
                debug!("signal interrupt, stopping");
                flag.trigger();
            } else {
                info!("signal interrupt, exiting");
                std::process::exit(SIGINT_EXIT_CODE);
            }
        })
        .map_err(|err| anyhow!("failed to set Ctrl-C handler: {}", err))
    }
}

/// Keeps an [`Interrupt`] armed for the duration of a top-level search
#[derive(Debug)]
pub struct Armed(Interrupt);

impl Drop for Armed {
    fn drop(&mut self) {
        self.0 .0.armed.store(false, Ordering::SeqCst);
    }
}
