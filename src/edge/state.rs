use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::transport::Command;

/// Edge-side turn-taking states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Passive wake-word listening; no conversation in progress
    WakeIdle,
    /// Actively capturing an utterance under a conversation id
    CapturingSpeech,
    /// Capture finished; waiting for the orchestrator's verdict
    AwaitingOrchestrator,
    /// Reply played; expecting the user's next turn imminently
    AwaitingUserTurn,
}

#[derive(Debug)]
struct Inner {
    state: DeviceState,
    conversation_id: Option<String>,
    state_entered_at: Instant,
    shutdown: bool,
}

/// The single guarded home of the device state and conversation id.
///
/// The capture thread and the control-message listener both read and mutate
/// this. Every transition goes through one of the methods below, so state
/// and id can never be observed mid-change, and command application is
/// idempotent: re-delivering a command the device has already honored leaves
/// everything unchanged.
#[derive(Debug)]
pub struct SharedDeviceState {
    inner: Mutex<Inner>,
}

impl SharedDeviceState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: DeviceState::WakeIdle,
                conversation_id: None,
                state_entered_at: Instant::now(),
                shutdown: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-transition; propagating the
        // panic is the only sound option.
        self.inner.lock().expect("device state lock poisoned")
    }

    pub fn state(&self) -> DeviceState {
        self.lock().state
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.lock().conversation_id.clone()
    }

    pub fn snapshot(&self) -> (DeviceState, Option<String>) {
        let inner = self.lock();
        (inner.state, inner.conversation_id.clone())
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    pub fn request_shutdown(&self) {
        self.lock().shutdown = true;
    }

    /// How long the device has been in its current state
    pub fn time_in_state(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.lock().state_entered_at)
    }

    /// Wake-word detection: allocate a fresh conversation id and begin
    /// capture. Returns the new id.
    pub fn begin_capture_on_wake(&self, now: Instant) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut inner = self.lock();
        inner.state = DeviceState::CapturingSpeech;
        inner.conversation_id = Some(id.clone());
        inner.state_entered_at = now;
        id
    }

    /// Capture attempt over; hold for the orchestrator's next command
    pub fn await_orchestrator(&self, now: Instant) {
        let mut inner = self.lock();
        inner.state = DeviceState::AwaitingOrchestrator;
        inner.state_entered_at = now;
    }

    /// Reply playback finished; wait for the user's next turn. Returns false
    /// when the device already fell back to idle (stale reply).
    pub fn begin_user_turn(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        if inner.state == DeviceState::WakeIdle {
            return false;
        }
        inner.state = DeviceState::AwaitingUserTurn;
        inner.state_entered_at = now;
        true
    }

    /// The user spoke during `AwaitingUserTurn`; capture the next utterance
    /// under the existing conversation id.
    pub fn begin_capture_for_turn(&self, now: Instant) -> Option<String> {
        let mut inner = self.lock();
        if inner.state != DeviceState::AwaitingUserTurn {
            return None;
        }
        let id = inner.conversation_id.clone()?;
        inner.state = DeviceState::CapturingSpeech;
        inner.state_entered_at = now;
        Some(id)
    }

    /// Timeout- or error-driven fallback to idle; clears the conversation id
    pub fn revert_to_wake_idle(&self, now: Instant) {
        let mut inner = self.lock();
        if inner.state != DeviceState::WakeIdle || inner.conversation_id.is_some() {
            info!("Reverting to wake-word listening; conversation id cleared");
        }
        inner.state = DeviceState::WakeIdle;
        inner.conversation_id = None;
        inner.state_entered_at = now;
    }

    /// Apply one orchestrator control command
    pub fn apply_command(&self, command: &Command, now: Instant) {
        let mut inner = self.lock();
        match command {
            Command::StartListeningSpeech { conversation_id } => {
                // Adopt the orchestrator's id even when capture is already
                // running under a provisional one; outbound audio is tagged
                // with whatever id is current at flush time.
                if inner.conversation_id.as_deref() != Some(conversation_id.as_str()) {
                    info!("Adopting conversation id {} from orchestrator", conversation_id);
                    inner.conversation_id = Some(conversation_id.clone());
                }
                if inner.state != DeviceState::CapturingSpeech {
                    inner.state = DeviceState::CapturingSpeech;
                    inner.state_entered_at = now;
                }
            }
            Command::StartListeningWakeWord { .. } => {
                if inner.state != DeviceState::WakeIdle {
                    info!("Orchestrator ended the conversation; back to wake-word listening");
                    inner.state = DeviceState::WakeIdle;
                    inner.state_entered_at = now;
                }
                inner.conversation_id = None;
            }
            Command::AgentShutdown => {
                warn!("Shutdown commanded; abandoning current activity");
                inner.shutdown = true;
            }
            Command::WakeEvent { .. } | Command::ReplyReady { .. } => {
                // WAKE_EVENT flows edge → orchestrator; REPLY_READY is
                // handled by the reply listener, not as a state transition.
            }
        }
    }
}

impl Default for SharedDeviceState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_allocates_id_and_starts_capture() {
        let shared = SharedDeviceState::new();
        let id = shared.begin_capture_on_wake(Instant::now());
        assert_eq!(shared.state(), DeviceState::CapturingSpeech);
        assert_eq!(shared.conversation_id(), Some(id));
    }

    #[test]
    fn start_listening_speech_adopts_the_carried_id() {
        let shared = SharedDeviceState::new();
        shared.begin_capture_on_wake(Instant::now());

        let command = Command::StartListeningSpeech {
            conversation_id: "authoritative".to_string(),
        };
        shared.apply_command(&command, Instant::now());
        assert_eq!(shared.state(), DeviceState::CapturingSpeech);
        assert_eq!(shared.conversation_id(), Some("authoritative".to_string()));
    }

    #[test]
    fn commands_are_idempotent() {
        let shared = SharedDeviceState::new();
        shared.begin_capture_on_wake(Instant::now());

        let command = Command::StartListeningWakeWord {
            conversation_id: None,
        };
        shared.apply_command(&command, Instant::now());
        let after_first = shared.snapshot();

        shared.apply_command(&command, Instant::now());
        assert_eq!(shared.snapshot(), after_first);
        assert_eq!(shared.state(), DeviceState::WakeIdle);
        assert_eq!(shared.conversation_id(), None);
    }

    #[test]
    fn revert_clears_the_conversation_id() {
        let shared = SharedDeviceState::new();
        shared.begin_capture_on_wake(Instant::now());
        shared.await_orchestrator(Instant::now());

        shared.revert_to_wake_idle(Instant::now());
        assert_eq!(shared.state(), DeviceState::WakeIdle);
        assert_eq!(shared.conversation_id(), None);
    }

    #[test]
    fn stale_reply_does_not_leave_idle() {
        let shared = SharedDeviceState::new();
        assert!(!shared.begin_user_turn(Instant::now()));
        assert_eq!(shared.state(), DeviceState::WakeIdle);
    }

    #[test]
    fn user_turn_keeps_the_conversation_id() {
        let shared = SharedDeviceState::new();
        let id = shared.begin_capture_on_wake(Instant::now());
        shared.await_orchestrator(Instant::now());
        assert!(shared.begin_user_turn(Instant::now()));

        let resumed = shared.begin_capture_for_turn(Instant::now());
        assert_eq!(resumed, Some(id));
        assert_eq!(shared.state(), DeviceState::CapturingSpeech);
    }

    #[test]
    fn shutdown_preempts_everything() {
        let shared = SharedDeviceState::new();
        shared.begin_capture_on_wake(Instant::now());
        shared.apply_command(&Command::AgentShutdown, Instant::now());
        assert!(shared.is_shutdown());
    }
}
