use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Closed = 0,
    Opening = 1,
    Ready = 2,
    Reading = 3,
    Reopening = 4,
    Failed = 5,
    ShutDown = 6,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Opening,
            2 => Phase::Ready,
            3 => Phase::Reading,
            4 => Phase::Reopening,
            5 => Phase::Failed,
            6 => Phase::ShutDown,
            _ => Phase::Closed,
        }
    }
}

pub fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// How long to sleep before the next open attempt so that consecutive
/// attempts start roughly `timeout` apart.
pub fn reconnect_wait(timeout: Duration, elapsed: Duration) -> Duration {
    timeout.saturating_sub(elapsed)
}

/// Start time of the current open attempt, shared with the native interrupt
/// callback. Milliseconds since the UNIX epoch.
#[derive(Debug)]
pub struct OpenClock {
    opening: AtomicBool,
    started_at: AtomicU64,
    cancelled: AtomicBool,
    timeout_secs: u64,
}

impl OpenClock {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            opening: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            timeout_secs,
        }
    }

    pub fn begin(&self) {
        self.started_at.store(unix_now_millis(), Ordering::SeqCst);
        self.opening.store(true, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        self.opening.store(false, Ordering::SeqCst);
    }

    pub fn is_opening(&self) -> bool {
        self.opening.load(Ordering::SeqCst)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Start of the last open attempt in UNIX milliseconds, 0 before any.
    pub fn started_at(&self) -> u64 {
        self.started_at.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(unix_now_millis().saturating_sub(self.started_at()))
    }

    pub fn timed_out(&self) -> bool {
        self.elapsed() > self.timeout()
    }

    pub fn reconnect_wait(&self) -> Duration {
        reconnect_wait(self.timeout(), self.elapsed())
    }

    pub fn should_interrupt(&self) -> bool {
        self.should_interrupt_at(unix_now_millis())
    }

    /// True once an in-progress open has run past the timeout, or the engine
    /// is shutting down.
    pub fn should_interrupt_at(&self, now_millis: u64) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        self.is_opening()
            && Duration::from_millis(now_millis.saturating_sub(self.started_at())) > self.timeout()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Flags shared between the capture caller and the reopen worker.
#[derive(Debug)]
pub struct EngineState {
    ready: AtomicBool,
    phase: AtomicU8,
    reopen_in_flight: AtomicBool,
    shutting_down: AtomicBool,
    generation: AtomicU64,
    clock: Arc<OpenClock>,
}

impl EngineState {
    pub fn new(open_timeout_secs: u64) -> Self {
        Self {
            ready: AtomicBool::new(false),
            phase: AtomicU8::new(Phase::Closed as u8),
            reopen_in_flight: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            clock: Arc::new(OpenClock::new(open_timeout_secs)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Publishes a fully built session. Nothing may be touched after this
    /// that a reader depends on.
    pub(crate) fn mark_ready(&self) {
        self.set_phase(Phase::Ready);
        self.ready.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Records a phase change. `Failed` and `ShutDown` are final.
    pub(crate) fn set_phase(&self, phase: Phase) {
        let _ = self
            .phase
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                match Phase::from_u8(current) {
                    Phase::ShutDown => None,
                    Phase::Failed if phase != Phase::ShutDown => None,
                    _ => Some(phase as u8),
                }
            });
    }

    pub fn reopen_in_flight(&self) -> bool {
        self.reopen_in_flight.load(Ordering::SeqCst)
    }

    /// Claims the single reopen slot. False if another reopen holds it.
    pub(crate) fn try_begin_reopen(&self) -> bool {
        self.reopen_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn end_reopen(&self) {
        self.reopen_in_flight.store(false, Ordering::SeqCst);
    }

    /// Returns true if shutdown had already begun.
    pub(crate) fn begin_shutdown(&self) -> bool {
        self.shutting_down.swap(true, Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn clock(&self) -> &Arc<OpenClock> {
        &self.clock
    }
}

/// Cheap read-only view of an engine's state, usable from any thread.
#[derive(Debug, Clone)]
pub struct Readiness(pub(crate) Arc<EngineState>);

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.0.is_ready()
    }

    pub fn phase(&self) -> Phase {
        self.0.phase()
    }

    pub fn reopen_in_flight(&self) -> bool {
        self.0.reopen_in_flight()
    }

    pub fn generation(&self) -> u64 {
        self.0.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_wait_paces_attempts() {
        let secs = Duration::from_secs;
        assert_eq!(reconnect_wait(secs(30), secs(5)), secs(25));
        assert_eq!(reconnect_wait(secs(30), secs(30)), Duration::ZERO);
        assert_eq!(reconnect_wait(secs(30), secs(40)), Duration::ZERO);
        assert_eq!(reconnect_wait(Duration::ZERO, Duration::ZERO), Duration::ZERO);
        assert_eq!(
            reconnect_wait(secs(1), Duration::from_millis(250)),
            Duration::from_millis(750)
        );
    }

    #[test]
    fn interrupt_only_fires_while_opening() {
        let clock = OpenClock::new(10);
        let now = unix_now_millis();
        assert!(!clock.should_interrupt_at(now + 100_000));

        clock.begin();
        let started = clock.started_at();
        assert!(!clock.should_interrupt_at(started + 10_000));
        assert!(clock.should_interrupt_at(started + 10_001));

        clock.finish();
        assert!(!clock.should_interrupt_at(started + 100_000));
    }

    #[test]
    fn cancel_interrupts_immediately() {
        let clock = OpenClock::new(60);
        clock.begin();
        assert!(!clock.should_interrupt());
        clock.cancel();
        assert!(clock.should_interrupt());
        assert!(clock.is_cancelled());
    }

    #[test]
    fn wait_is_zero_without_a_previous_attempt() {
        let clock = OpenClock::new(10);
        assert_eq!(clock.reconnect_wait(), Duration::ZERO);
    }

    #[test]
    fn single_reopen_slot() {
        let state = EngineState::new(10);
        assert!(state.try_begin_reopen());
        assert!(!state.try_begin_reopen());
        state.end_reopen();
        assert!(state.try_begin_reopen());
    }

    #[test]
    fn final_phases_stick() {
        let state = EngineState::new(10);
        state.set_phase(Phase::Failed);
        state.set_phase(Phase::Ready);
        assert_eq!(state.phase(), Phase::Failed);
        state.set_phase(Phase::ShutDown);
        state.set_phase(Phase::Closed);
        assert_eq!(state.phase(), Phase::ShutDown);
    }

    #[test]
    fn readiness_is_published_last() {
        let state = Arc::new(EngineState::new(10));
        let readiness = Readiness(Arc::clone(&state));
        assert!(!readiness.is_ready());
        state.mark_ready();
        assert!(readiness.is_ready());
        assert_eq!(readiness.phase(), Phase::Ready);
        assert_eq!(state.next_generation(), 1);
        assert_eq!(readiness.generation(), 1);
    }
}
