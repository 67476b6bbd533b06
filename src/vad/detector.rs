use std::time::{Duration, Instant};

/// Tunable parameters for the activity detector
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// RMS at or below which a frame counts as silent
    pub silence_threshold_rms: f64,
    /// Consecutive loud frames required to confirm speech onset
    pub onset_frames: u32,
    /// Minimum speech frames before an utterance counts as valid
    pub min_utterance_frames: u32,
    /// Consecutive silent frames after speech that end the utterance
    pub end_silence_frames: u32,
    /// Silent frames tolerated before any speech has started
    pub abandon_silence_frames: u32,
    /// Hard ceiling on one capture attempt, independent of frame counts
    pub max_capture_duration: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            silence_threshold_rms: 350.0,
            onset_frames: 1,
            min_utterance_frames: 30,
            end_silence_frames: 125,
            abandon_silence_frames: 150,
            max_capture_duration: Duration::from_secs(10),
        }
    }
}

/// Classification of one observed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Nothing decided yet: pre-onset audio, or a pause within the utterance
    Silence,
    /// Speech onset confirmed on this frame
    SpeechOnset,
    /// Confirmed speech continuing
    SpeechContinuing,
    /// End of a valid utterance
    SpeechEnd,
    /// Gave up: no speech within the abandon window, or the overall
    /// capture ceiling was reached
    Timeout,
}

/// Per-attempt counters. Reset at the start of every capture attempt and
/// mutated only by [`SpeechDetector::observe`].
#[derive(Debug, Clone, Default)]
pub struct VadState {
    /// Consecutive loud frames seen while onset is not yet confirmed
    pub potential_speech_frames: u32,
    /// Loud frames accumulated since onset
    pub speech_frames: u32,
    /// Current run of silent frames since the last loud frame
    pub consecutive_silent_frames: u32,
    /// Silent frames seen before onset. A false start carries its trailing
    /// silent run into this counter so the abandon timeout keeps progressing.
    pub initial_silent_frames: u32,
    /// Whether onset has been confirmed for the current utterance
    pub speech_confirmed: bool,
    /// Latched once `SpeechEnd` or `Timeout` has been emitted
    ended: bool,
}

/// Two-phase debounced speech detector.
///
/// Phase one waits for `onset_frames` consecutive loud frames before
/// confirming speech; phase two waits for `end_silence_frames` consecutive
/// silent frames before ending it, demoting too-short utterances back to
/// phase one. The only time source is the caller-supplied `now`, so the
/// overall capture ceiling is a plain monotonic deadline and the detector
/// is fully deterministic under test.
#[derive(Debug)]
pub struct SpeechDetector {
    config: VadConfig,
    state: VadState,
    deadline: Instant,
}

impl SpeechDetector {
    pub fn new(config: VadConfig, now: Instant) -> Self {
        let deadline = now + config.max_capture_duration;
        Self {
            config,
            state: VadState::default(),
            deadline,
        }
    }

    /// Re-arm for a new capture attempt starting at `now`
    pub fn reset(&mut self, now: Instant) {
        self.state = VadState::default();
        self.deadline = now + self.config.max_capture_duration;
    }

    pub fn speech_confirmed(&self) -> bool {
        self.state.speech_confirmed
    }

    /// Whether the attempt has accumulated enough speech to count
    pub fn has_valid_utterance(&self) -> bool {
        self.state.speech_frames >= self.config.min_utterance_frames
    }

    pub fn state(&self) -> &VadState {
        &self.state
    }

    /// Classify one frame by its RMS amplitude.
    ///
    /// Emits at most one `SpeechEnd` or `Timeout` per capture attempt;
    /// afterwards the detector stays quiet until `reset`.
    pub fn observe(&mut self, rms: f64, now: Instant) -> SpeechEvent {
        if self.state.ended {
            return SpeechEvent::Silence;
        }

        if now >= self.deadline {
            self.state.ended = true;
            return SpeechEvent::Timeout;
        }

        let loud = rms > self.config.silence_threshold_rms;

        if !self.state.speech_confirmed {
            self.observe_pre_onset(loud)
        } else {
            self.observe_in_utterance(loud)
        }
    }

    fn observe_pre_onset(&mut self, loud: bool) -> SpeechEvent {
        if loud {
            self.state.potential_speech_frames += 1;
            if self.state.potential_speech_frames >= self.config.onset_frames {
                self.state.speech_confirmed = true;
                self.state.speech_frames = self.state.potential_speech_frames;
                self.state.consecutive_silent_frames = 0;
                self.state.initial_silent_frames = 0;
                return SpeechEvent::SpeechOnset;
            }
            SpeechEvent::Silence
        } else {
            self.state.potential_speech_frames = 0;
            self.state.initial_silent_frames += 1;
            if self.state.initial_silent_frames > self.config.abandon_silence_frames {
                self.state.ended = true;
                return SpeechEvent::Timeout;
            }
            SpeechEvent::Silence
        }
    }

    fn observe_in_utterance(&mut self, loud: bool) -> SpeechEvent {
        if loud {
            self.state.speech_frames += 1;
            self.state.consecutive_silent_frames = 0;
            return SpeechEvent::SpeechContinuing;
        }

        self.state.consecutive_silent_frames += 1;
        if self.state.consecutive_silent_frames < self.config.end_silence_frames {
            return SpeechEvent::Silence;
        }

        if self.state.speech_frames >= self.config.min_utterance_frames {
            self.state.ended = true;
            return SpeechEvent::SpeechEnd;
        }

        // False start: too little speech to count as an utterance. Return to
        // onset detection, carrying the elapsed silent run into the initial
        // silence counter so the abandon timeout keeps progressing.
        let carried = self.state.consecutive_silent_frames;
        self.state.speech_confirmed = false;
        self.state.speech_frames = 0;
        self.state.potential_speech_frames = 0;
        self.state.consecutive_silent_frames = 0;
        self.state.initial_silent_frames = carried;
        if self.state.initial_silent_frames > self.config.abandon_silence_frames {
            self.state.ended = true;
            return SpeechEvent::Timeout;
        }
        SpeechEvent::Silence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOUD: f64 = 1200.0;
    const QUIET: f64 = 10.0;

    fn config() -> VadConfig {
        VadConfig {
            silence_threshold_rms: 350.0,
            onset_frames: 3,
            min_utterance_frames: 5,
            end_silence_frames: 4,
            abandon_silence_frames: 10,
            max_capture_duration: Duration::from_secs(60),
        }
    }

    fn detector(config: VadConfig) -> (SpeechDetector, Instant) {
        let now = Instant::now();
        (SpeechDetector::new(config, now), now)
    }

    #[test]
    fn short_transient_never_confirms_onset() {
        let (mut det, now) = detector(config());

        // Two loud frames, one short of the debounce count, then silence
        assert_eq!(det.observe(LOUD, now), SpeechEvent::Silence);
        assert_eq!(det.observe(LOUD, now), SpeechEvent::Silence);
        assert_eq!(det.observe(QUIET, now), SpeechEvent::Silence);
        assert!(!det.speech_confirmed());
        assert_eq!(det.state().potential_speech_frames, 0);

        // A later sustained run still confirms normally
        det.observe(LOUD, now);
        det.observe(LOUD, now);
        assert_eq!(det.observe(LOUD, now), SpeechEvent::SpeechOnset);
    }

    #[test]
    fn onset_resets_silence_counters() {
        let (mut det, now) = detector(config());

        det.observe(QUIET, now);
        det.observe(QUIET, now);
        det.observe(LOUD, now);
        det.observe(LOUD, now);
        assert_eq!(det.observe(LOUD, now), SpeechEvent::SpeechOnset);
        assert_eq!(det.state().initial_silent_frames, 0);
        assert_eq!(det.state().consecutive_silent_frames, 0);
        assert_eq!(det.state().speech_frames, 3);
    }

    #[test]
    fn short_gap_does_not_end_utterance() {
        let (mut det, now) = detector(config());

        for _ in 0..3 {
            det.observe(LOUD, now);
        }
        for _ in 0..3 {
            det.observe(LOUD, now);
        }
        // Gap shorter than the end-of-utterance threshold
        for _ in 0..3 {
            assert_eq!(det.observe(QUIET, now), SpeechEvent::Silence);
        }
        // Speech resumes and keeps accumulating
        assert_eq!(det.observe(LOUD, now), SpeechEvent::SpeechContinuing);
        assert_eq!(det.state().speech_frames, 7);
        assert_eq!(det.state().consecutive_silent_frames, 0);
    }

    #[test]
    fn at_most_one_speech_end_per_attempt() {
        let (mut det, now) = detector(config());

        for _ in 0..8 {
            det.observe(LOUD, now);
        }
        let mut ends = 0;
        for _ in 0..20 {
            if det.observe(QUIET, now) == SpeechEvent::SpeechEnd {
                ends += 1;
            }
        }
        assert_eq!(ends, 1);
    }

    #[test]
    fn speech_end_requires_min_utterance() {
        let (mut det, now) = detector(config());

        // Only 3 speech frames, below the 5-frame minimum
        for _ in 0..3 {
            det.observe(LOUD, now);
        }
        for _ in 0..4 {
            let event = det.observe(QUIET, now);
            assert_ne!(event, SpeechEvent::SpeechEnd);
        }
        // Demoted back to onset detection with the silent run carried over
        assert!(!det.speech_confirmed());
        assert_eq!(det.state().initial_silent_frames, 4);
        assert_eq!(det.state().speech_frames, 0);
    }

    #[test]
    fn false_start_silence_carries_into_abandon_timeout() {
        let (mut det, now) = detector(config());

        // False start consumes 4 silent frames of the 10-frame abandon budget
        for _ in 0..3 {
            det.observe(LOUD, now);
        }
        for _ in 0..4 {
            det.observe(QUIET, now);
        }
        assert_eq!(det.state().initial_silent_frames, 4);

        // 6 more silent frames exhaust the budget; the 7th trips the timeout
        for _ in 0..6 {
            assert_eq!(det.observe(QUIET, now), SpeechEvent::Silence);
        }
        assert_eq!(det.observe(QUIET, now), SpeechEvent::Timeout);
    }

    #[test]
    fn abandon_timeout_without_any_speech() {
        let (mut det, now) = detector(config());

        for _ in 0..10 {
            assert_eq!(det.observe(QUIET, now), SpeechEvent::Silence);
        }
        assert_eq!(det.observe(QUIET, now), SpeechEvent::Timeout);
        // Latched: no further events from this attempt
        assert_eq!(det.observe(LOUD, now), SpeechEvent::Silence);
    }

    #[test]
    fn overall_deadline_fires_regardless_of_phase() {
        let cfg = VadConfig {
            max_capture_duration: Duration::from_secs(5),
            ..config()
        };
        let (mut det, now) = detector(cfg);

        det.observe(LOUD, now);
        det.observe(LOUD, now);
        assert_eq!(det.observe(LOUD, now), SpeechEvent::SpeechOnset);
        assert_eq!(det.observe(LOUD, now), SpeechEvent::SpeechContinuing);
        let late = now + Duration::from_secs(6);
        assert_eq!(det.observe(LOUD, late), SpeechEvent::Timeout);
    }

    #[test]
    fn reset_rearms_after_end() {
        let (mut det, now) = detector(config());

        for _ in 0..6 {
            det.observe(LOUD, now);
        }
        for _ in 0..4 {
            det.observe(QUIET, now);
        }
        det.reset(now);
        assert!(!det.speech_confirmed());
        det.observe(LOUD, now);
        det.observe(LOUD, now);
        assert_eq!(det.observe(LOUD, now), SpeechEvent::SpeechOnset);
    }
}
