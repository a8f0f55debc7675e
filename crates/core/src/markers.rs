//! Inline marker scanning over streamed transcript deltas.
//!
//! Some endpoint configurations signal stage changes with inline text markers
//! instead of function calls. Markers can be split across delta boundaries at
//! any byte, so the scanner buffers a potential partial marker between pushes
//! and guarantees each complete marker fires exactly once.

use tracing::debug;

pub const NEXT_STAGE: &str = "[NEXT_STAGE]";
pub const FEEDBACK_START: &str = "[FEEDBACK_START]";
pub const FEEDBACK_END: &str = "[FEEDBACK_END]";
pub const INTERVIEW_COMPLETE: &str = "[INTERVIEW_COMPLETE]";

const OPENING_MARKERS: [&str; 3] = [NEXT_STAGE, FEEDBACK_START, INTERVIEW_COMPLETE];

/// A marker recognized in the delta stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerEvent {
    /// Advance one stage in the fixed order.
    NextStage,
    /// The payload enclosed between the feedback markers (plain text or
    /// embedded JSON), trimmed.
    Feedback(String),
    /// The conversation reached its terminal marker.
    Complete,
}

/// Scans deltas for markers, carrying partial-marker state across pushes.
#[derive(Debug, Default)]
pub struct MarkerScanner {
    buf: String,
    in_feedback: bool,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one delta and returns every marker completed by it, in order.
    pub fn push(&mut self, delta: &str) -> Vec<MarkerEvent> {
        self.buf.push_str(delta);
        let mut events = Vec::new();

        loop {
            if self.in_feedback {
                // Everything up to the end marker is payload; keep buffering
                // until the end marker fully arrives.
                let Some(idx) = self.buf.find(FEEDBACK_END) else {
                    break;
                };
                let payload = self.buf[..idx].trim().to_string();
                self.buf.drain(..idx + FEEDBACK_END.len());
                self.in_feedback = false;
                debug!("Feedback block closed ({} bytes)", payload.len());
                events.push(MarkerEvent::Feedback(payload));
                continue;
            }

            let earliest = OPENING_MARKERS
                .iter()
                .filter_map(|token| self.buf.find(token).map(|idx| (idx, *token)))
                .min_by_key(|(idx, _)| *idx);

            match earliest {
                Some((idx, token)) => {
                    self.buf.drain(..idx + token.len());
                    match token {
                        NEXT_STAGE => events.push(MarkerEvent::NextStage),
                        INTERVIEW_COMPLETE => events.push(MarkerEvent::Complete),
                        FEEDBACK_START => self.in_feedback = true,
                        _ => unreachable!(),
                    }
                }
                None => {
                    // Retain only a tail that could still become a marker.
                    let keep_from = match self.buf.rfind('[') {
                        Some(idx)
                            if OPENING_MARKERS
                                .iter()
                                .any(|token| token.starts_with(&self.buf[idx..])) =>
                        {
                            idx
                        }
                        _ => self.buf.len(),
                    };
                    self.buf.drain(..keep_from);
                    break;
                }
            }
        }
        events
    }

    /// Clears all buffered state. Called when the conversation restarts.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_feedback = false;
    }
}
