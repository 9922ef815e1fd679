use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use log::{debug, error, info, warn};

use super::backend::MediaBackend;
use super::config::ReopenMode;
use super::engine::Shared;
use super::error::EngineError;
use super::state::Phase;

const WORKER_NAME: &str = "stream-reopen";

impl<B: MediaBackend> Shared<B> {
    /// Claims the reopen slot and runs the reopen loop inline or on the
    /// worker thread. At most one loop runs per engine.
    pub(crate) fn reopen(self: &Arc<Self>) -> Result<(), EngineError> {
        self.ensure_running()?;
        if !self.state.try_begin_reopen() {
            warn!("Reopen of {} already in flight", self.source.address());
            return Err(EngineError::ReopenInFlight);
        }
        self.state.clear_ready();
        self.state.set_phase(Phase::Reopening);

        match self.config.reopen_mode {
            ReopenMode::Inline => {
                let result = self.reopen_loop();
                self.state.end_reopen();
                result
            }
            ReopenMode::Detached => {
                // Held across the spawn so a fast worker cannot be reconciled
                // before its handle is stored.
                let mut worker = self.worker.lock();
                let shared = Arc::clone(self);
                let spawned = thread::Builder::new()
                    .name(WORKER_NAME.to_string())
                    .spawn(move || {
                        if let Err(e) = shared.reopen_loop() {
                            warn!("Reopen worker for {} stopped: {}", shared.source.address(), e);
                        }
                    });
                match spawned {
                    Ok(handle) => {
                        debug!("Started reopen worker for {}", self.source.address());
                        *worker = Some(handle);
                        Ok(())
                    }
                    Err(e) => {
                        self.state.end_reopen();
                        error!("Unable to create reopen thread: {}", e);
                        Err(EngineError::Failed(format!("unable to create reopen thread: {}", e)))
                    }
                }
            }
        }
    }

    /// close, wait out the rest of the open interval, open; until an open
    /// succeeds, a fatal error shows up, or the engine shuts down.
    pub(crate) fn reopen_loop(&self) -> Result<(), EngineError> {
        let mut attempt: u64 = 0;
        loop {
            self.close();
            if self.state.is_shutting_down() {
                return Err(EngineError::ShutDown);
            }

            let wait = self.state.clock().reconnect_wait();
            if !wait.is_zero() {
                debug!("Sleeping {:?} before reopening stream", wait);
                if self.sleep(wait) {
                    return Err(EngineError::ShutDown);
                }
            }

            attempt += 1;
            match self.open() {
                Ok(()) => {
                    info!(
                        "Reopened {} after {} attempt(s)",
                        self.source.address(),
                        attempt
                    );
                    return Ok(());
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => warn!("Reopen attempt {} failed: {}", attempt, e),
            }
        }
    }

    /// Sleeps for `wait` unless shutdown interrupts. Returns true when woken
    /// by shutdown.
    fn sleep(&self, wait: Duration) -> bool {
        match self.wake_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => self.state.is_shutting_down(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}
