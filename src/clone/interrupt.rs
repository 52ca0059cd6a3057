//! SIGINT/SIGTERM handling for the clone pipeline.
//!
//! Outside a run a signal exits immediately. While a run is active it only
//! raises a flag; the pipeline checks it between stages and tears down.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::Signal;

use crate::ui::prelude::*;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static PIPELINE_ACTIVE: AtomicBool = AtomicBool::new(false);

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn request_interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Marks a pipeline as running for as long as the guard lives.
pub struct PipelineGuard {
    _private: (),
}

impl PipelineGuard {
    pub fn enter() -> Self {
        INTERRUPTED.store(false, Ordering::SeqCst);
        PIPELINE_ACTIVE.store(true, Ordering::SeqCst);
        Self { _private: () }
    }
}

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        PIPELINE_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Shell convention for a process ended by `signal`.
pub fn exit_code_for(signal: Signal) -> i32 {
    128 + signal as i32
}

/// Spawn the signal listener on the current tokio runtime.
pub fn spawn_listener() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = sigint.recv() => Signal::SIGINT,
                _ = sigterm.recv() => Signal::SIGTERM,
            };

            if !PIPELINE_ACTIVE.load(Ordering::SeqCst) {
                crate::ui::detach_run_log();
                std::process::exit(exit_code_for(received));
            }

            request_interrupt();
            emit(
                Level::Warn,
                "clone.interrupt",
                &format!(
                    "{} Received {received}; stopping after the current command and cleaning up...",
                    char::from(NerdFont::Warning)
                ),
                None,
            );
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn entering_a_pipeline_clears_stale_interrupts() {
        request_interrupt();
        let guard = PipelineGuard::enter();
        assert!(!interrupted());
        assert!(PIPELINE_ACTIVE.load(Ordering::SeqCst));
        drop(guard);
        assert!(!PIPELINE_ACTIVE.load(Ordering::SeqCst));
    }

    #[test]
    fn exit_code_depends_on_the_signal() {
        assert_eq!(exit_code_for(Signal::SIGINT), 130);
        assert_eq!(exit_code_for(Signal::SIGTERM), 143);
    }
}
