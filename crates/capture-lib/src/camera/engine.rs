use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;

use super::backend::{DecodedFrame, MediaBackend, MediaInput, Packet, VideoDecoding};
use super::config::CameraConfig;
use super::delivery::{self, OutputFormat};
use super::error::EngineError;
use super::negotiate::{self, DecoderCandidate};
use super::selection::{self, StreamSelection};
use super::session::Session;
use super::source::SourceDescriptor;
use super::state::{EngineState, Phase, Readiness};

/// Captures one source and keeps it open.
///
/// The engine owns at most one session at a time. [`CaptureEngine::capture`]
/// returns [`EngineError::NotReady`] while a session is being rebuilt.
pub struct CaptureEngine<B: MediaBackend> {
    shared: Arc<Shared<B>>,
}

pub(crate) struct Shared<B: MediaBackend> {
    pub(crate) backend: B,
    pub(crate) source: SourceDescriptor,
    pub(crate) config: CameraConfig,
    pub(crate) output: OutputFormat,
    pub(crate) frame_size: usize,
    pub(crate) state: Arc<EngineState>,
    pub(crate) session: Mutex<Option<Session<B::Input>>>,
    pub(crate) worker: Mutex<Option<JoinHandle<()>>>,
    // Dropping the sender wakes a worker sleeping between attempts.
    pub(crate) wake_tx: Mutex<Option<Sender<()>>>,
    pub(crate) wake_rx: Receiver<()>,
    pub(crate) failure: Mutex<Option<String>>,
}

impl<B: MediaBackend> CaptureEngine<B> {
    pub fn new(
        backend: B,
        source: SourceDescriptor,
        config: CameraConfig,
    ) -> Result<Self, EngineError> {
        let output = config.output_format();
        let frame_size = delivery::validate_buffer_size(&output, None)?;
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        debug!(
            "Capture engine for {} via {} at {}x{} {:?}",
            source.address(),
            source.method(),
            output.width,
            output.height,
            output.layout
        );
        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                state: Arc::new(EngineState::new(config.open_timeout_secs)),
                source,
                config,
                output,
                frame_size,
                session: Mutex::new(None),
                worker: Mutex::new(None),
                wake_tx: Mutex::new(Some(wake_tx)),
                wake_rx,
                failure: Mutex::new(None),
            }),
        })
    }

    /// Opens the source for the first time. A recoverable failure starts the
    /// reopen loop instead of being returned.
    pub fn prime(&self) -> Result<(), EngineError> {
        info!("Priming capture from {}", self.shared.source.address());
        self.shared.open_or_reopen()
    }

    /// Makes sure a session exists before a capture. Returns `NotReady`
    /// while a background reopen is still working.
    pub fn pre_capture(&self) -> Result<(), EngineError> {
        self.shared.ensure_running()?;
        if self.shared.state.is_ready() {
            return Ok(());
        }
        if self.shared.state.reopen_in_flight() {
            return Err(EngineError::NotReady);
        }
        self.shared.open_or_reopen()?;
        if self.shared.state.is_ready() {
            Ok(())
        } else {
            Err(EngineError::NotReady)
        }
    }

    /// Reads the next coded packet from the current session.
    pub fn capture(&self) -> Result<Packet, EngineError> {
        self.shared.capture()
    }

    /// Decodes a captured packet. Video packets that produce a picture
    /// write it into `dst` in the configured layout.
    pub fn decode_frame(
        &self,
        packet: &Packet,
        dst: &mut [u8],
    ) -> Result<Option<DecodedFrame>, EngineError> {
        self.shared.ensure_running()?;
        let needed = self.shared.frame_size;
        if dst.len() != needed {
            return Err(EngineError::configuration(format!(
                "destination holds {} bytes, frames need {}",
                dst.len(),
                needed
            )));
        }
        if !self.shared.state.is_ready() {
            return Err(EngineError::NotReady);
        }
        let mut guard = self.shared.session.lock();
        let session = guard.as_mut().ok_or(EngineError::NotReady)?;
        session.decode(packet, &self.shared.output, dst)
    }

    pub fn post_capture(&self) -> Result<(), EngineError> {
        self.shared.ensure_running()
    }

    /// Starts the close/backoff/open loop.
    pub fn reopen(&self) -> Result<(), EngineError> {
        self.shared.reopen()
    }

    /// Releases the current session, if any.
    pub fn close(&self) {
        self.shared.close()
    }

    /// Stops any reopen in progress and releases everything. Final.
    pub fn shutdown(&self) {
        self.shared.shutdown()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.state.is_ready()
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.phase()
    }

    pub fn readiness(&self) -> Readiness {
        Readiness(Arc::clone(&self.shared.state))
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.shared.source
    }

    pub fn config(&self) -> &CameraConfig {
        &self.shared.config
    }

    pub fn output_format(&self) -> OutputFormat {
        self.shared.output
    }

    /// Bytes `decode_frame` writes per picture.
    pub fn frame_size(&self) -> usize {
        self.shared.frame_size
    }

    pub fn stream_selection(&self) -> Option<StreamSelection> {
        self.shared
            .session
            .lock()
            .as_ref()
            .map(|s| s.selection().clone())
    }

    pub fn decoder(&self) -> Option<DecoderCandidate> {
        self.shared.session.lock().as_ref().map(|s| s.candidate())
    }
}

impl<B: MediaBackend> Drop for CaptureEngine<B> {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl<B: MediaBackend> Shared<B> {
    pub(crate) fn ensure_running(&self) -> Result<(), EngineError> {
        if self.state.is_shutting_down() {
            return Err(EngineError::ShutDown);
        }
        if self.state.phase() == Phase::Failed {
            let reason = self
                .failure
                .lock()
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            return Err(EngineError::Failed(reason));
        }
        Ok(())
    }

    fn fail(&self, err: &EngineError) {
        error!("Capture from {} failed: {}", self.source.address(), err);
        *self.failure.lock() = Some(err.to_string());
        self.state.set_phase(Phase::Failed);
    }

    fn open_or_reopen(self: &Arc<Self>) -> Result<(), EngineError> {
        match self.open() {
            Ok(()) => Ok(()),
            Err(e) if e.is_terminal() => Err(e),
            Err(e) => {
                warn!("Unable to open {}: {}", self.source.address(), e);
                self.reopen()
            }
        }
    }

    /// Builds a new session and publishes it. Readiness is set last.
    pub(crate) fn open(&self) -> Result<(), EngineError> {
        self.ensure_running()?;
        let mut slot = self.session.lock();
        if slot.is_some() && self.state.is_ready() {
            return Ok(());
        }
        self.state.clear_ready();
        if let Some(mut stale) = slot.take() {
            stale.release();
        }
        self.state.set_phase(Phase::Opening);

        let clock = self.state.clock();
        clock.begin();
        let built = self.build_session();
        clock.finish();

        match built {
            Ok(session) => {
                info!(
                    "Stream open {} (session {})",
                    self.source.address(),
                    session.generation()
                );
                *slot = Some(session);
                self.state.mark_ready();
                Ok(())
            }
            Err(e) => {
                if e.is_fatal() {
                    self.fail(&e);
                } else {
                    self.state.set_phase(Phase::Closed);
                    if clock.timed_out() {
                        error!(
                            "Open of {} took more than {} seconds",
                            self.source.address(),
                            clock.timeout_secs()
                        );
                    }
                }
                Err(e)
            }
        }
    }

    fn build_session(&self) -> Result<Session<B::Input>, EngineError> {
        let mut options = self.source.open_options();
        debug!("Calling open for {}", self.source.address());
        let mut input = self
            .backend
            .open_input(&self.source, &mut options, self.state.clock())?;

        input.find_stream_info()?;
        let streams = input.streams();
        debug!("Got stream info, {} streams", streams.len());
        let selection = selection::select_streams(&streams)?;

        let negotiated = negotiate::negotiate(
            &mut input,
            &selection.video,
            &mut options,
            self.config.hardware_acceleration,
        )?;
        for key in options.keys() {
            warn!("Option {} not recognized", key);
        }

        let audio = match (&selection.audio, self.config.capture_audio) {
            (Some(stream), true) => match input.open_audio_decoder(stream) {
                Ok(decoder) => Some(decoder),
                Err(e) => {
                    warn!("Continuing without audio: {}", e);
                    None
                }
            },
            _ => None,
        };

        let frame_size = delivery::validate_buffer_size(&self.output, self.config.frame_buffer_size)?;
        let (width, height) = negotiated.decoder.coded_size();
        if (width, height) != (self.output.width, self.output.height) {
            warn!(
                "Requested dimensions are {}x{} but source is sending {}x{}",
                self.output.width, self.output.height, width, height
            );
        }
        let conversion = negotiated.decoder.build_conversion(&self.output)?;
        trace!("Conversion ready, {} bytes per frame", frame_size);

        Ok(Session::new(
            self.state.next_generation(),
            selection,
            negotiated.candidate,
            conversion,
            audio,
            negotiated.decoder,
            input,
        ))
    }

    /// Clears readiness and releases the session. Idempotent.
    pub(crate) fn close(&self) {
        let mut slot = self.session.lock();
        self.state.clear_ready();
        if let Some(mut session) = slot.take() {
            debug!("Closing session {}", session.generation());
            session.release();
        }
        self.state.set_phase(Phase::Closed);
    }

    pub(crate) fn capture(self: &Arc<Self>) -> Result<Packet, EngineError> {
        self.ensure_running()?;
        if !self.state.is_ready() {
            return Err(EngineError::NotReady);
        }
        self.reconcile_worker();

        let result = {
            let mut slot = self.session.lock();
            let session = match slot.as_mut() {
                Some(session) if self.state.is_ready() => session,
                _ => return Err(EngineError::NotReady),
            };
            self.state.set_phase(Phase::Reading);
            let result = session.read_packet();
            self.state.set_phase(Phase::Ready);
            result
        };

        match result {
            Ok(packet) => {
                trace!(
                    "Packet stream {} pts {:?} {} bytes",
                    packet.stream_index,
                    packet.pts,
                    packet.data.len()
                );
                Ok(packet)
            }
            Err(failure) => {
                let reopening = failure.triggers_reopen(self.config.read_error_policy);
                if reopening {
                    info!("Read returned \"{}\". Reopening stream.", failure);
                    match self.reopen() {
                        Ok(()) | Err(EngineError::ReopenInFlight) => {}
                        Err(e) => return Err(e),
                    }
                } else {
                    error!("Unable to read packet from stream: {}", failure);
                }
                Err(EngineError::Read { failure, reopening })
            }
        }
    }

    /// Joins a finished reopen worker once its session is live.
    fn reconcile_worker(&self) {
        if !self.state.reopen_in_flight() {
            return;
        }
        let handle = {
            let mut worker = self.worker.lock();
            if !self.state.is_ready() {
                return;
            }
            worker.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Could not join reopen thread.");
            }
            info!("Successfully reopened stream {}", self.source.address());
            self.state.end_reopen();
        }
    }

    pub(crate) fn shutdown(&self) {
        if !self.state.begin_shutdown() {
            info!("Shutting down capture from {}", self.source.address());
        }
        self.state.clock().cancel();
        self.wake_tx.lock().take();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Could not join reopen thread.");
            }
        }
        self.state.end_reopen();
        self.close();
        self.state.set_phase(Phase::ShutDown);
    }
}
