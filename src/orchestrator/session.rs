use chrono::{DateTime, Utc};

/// Orchestrator-side lifecycle of one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but no turn started yet
    AwaitingWake,
    /// Feeding inbound audio to the transcription service
    Transcribing,
    /// Generating and synthesizing the reply
    Responding,
    /// Reply delivered; the next turn runs under the same conversation id
    Continuing,
    /// Conversation over; the edge is being sent back to wake-word listening
    Ending,
}

/// The orchestrator-owned record spanning one or more turns
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: SessionState::AwaitingWake,
            started_at: now,
            last_activity_at: now,
        }
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.last_activity_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_changes_touch_last_activity() {
        let mut session = ConversationSession::new("c-1".to_string());
        assert_eq!(session.state, SessionState::AwaitingWake);

        let before = session.last_activity_at;
        session.set_state(SessionState::Transcribing);
        assert_eq!(session.state, SessionState::Transcribing);
        assert!(session.last_activity_at >= before);
    }
}
