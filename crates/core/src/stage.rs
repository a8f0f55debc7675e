//! Conversation stages and the progress model they drive.
//!
//! Each conversation policy owns a fixed, ordered stage sequence. The model
//! only ever moves forward through it: explicit stage updates are ignored if
//! they point backwards, marker-driven advances step exactly one position,
//! and progress is monotonically non-decreasing within one session.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A fixed, ordered sequence of conversation stages.
pub trait StageSequence: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    /// The full ordering, first to terminal.
    const ORDER: &'static [Self];

    /// The name used on the wire (function-call arguments, stage tags).
    fn wire_name(self) -> &'static str;

    /// The display label for this stage.
    fn title(self) -> &'static str;

    fn index(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).unwrap_or(0)
    }

    fn first() -> Self {
        Self::ORDER[0]
    }

    fn terminal() -> Self {
        Self::ORDER[Self::ORDER.len() - 1]
    }

    /// The following stage, clamped at the terminal stage.
    fn next(self) -> Self {
        let idx = self.index();
        if idx + 1 < Self::ORDER.len() {
            Self::ORDER[idx + 1]
        } else {
            self
        }
    }

    fn from_wire(name: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|s| s.wire_name() == name)
    }

    fn is_terminal(self) -> bool {
        self == Self::terminal()
    }

    /// Progress attributed to reaching this stage, 0–100.
    fn default_progress(self) -> u8 {
        let last = Self::ORDER.len() - 1;
        ((self.index() * 100) / last.max(1)) as u8
    }
}

/// Stages of a mock job interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStage {
    Introduction,
    Experience,
    Technical,
    Preferences,
    Expectations,
    WrapUp,
    Completed,
}

impl StageSequence for InterviewStage {
    const ORDER: &'static [Self] = &[
        Self::Introduction,
        Self::Experience,
        Self::Technical,
        Self::Preferences,
        Self::Expectations,
        Self::WrapUp,
        Self::Completed,
    ];

    fn wire_name(self) -> &'static str {
        match self {
            Self::Introduction => "introduction",
            Self::Experience => "experience",
            Self::Technical => "technical",
            Self::Preferences => "preferences",
            Self::Expectations => "expectations",
            Self::WrapUp => "wrap_up",
            Self::Completed => "completed",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Introduction => "Introduction",
            Self::Experience => "Experience Review",
            Self::Technical => "Technical Skills",
            Self::Preferences => "Work Preferences",
            Self::Expectations => "Salary Expectations",
            Self::WrapUp => "Wrap Up",
            Self::Completed => "Interview Complete",
        }
    }
}

/// Stages of the new-user onboarding conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStage {
    Welcome,
    Background,
    Preferences,
    Goals,
    WrapUp,
    Completed,
}

impl StageSequence for OnboardingStage {
    const ORDER: &'static [Self] = &[
        Self::Welcome,
        Self::Background,
        Self::Preferences,
        Self::Goals,
        Self::WrapUp,
        Self::Completed,
    ];

    fn wire_name(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Background => "background",
            Self::Preferences => "preferences",
            Self::Goals => "goals",
            Self::WrapUp => "wrap_up",
            Self::Completed => "completed",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Welcome => "Welcome",
            Self::Background => "Your Background",
            Self::Preferences => "Job Preferences",
            Self::Goals => "Career Goals",
            Self::WrapUp => "Wrap Up",
            Self::Completed => "Onboarding Complete",
        }
    }
}

/// Kind of a structured evaluation shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Improvement,
    Neutral,
}

/// Structured evaluation attached to the current stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub message: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl Feedback {
    /// Plain-text feedback with no itemized strengths or improvements.
    pub fn neutral(message: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Neutral,
            message: message.into(),
            strengths: Vec::new(),
            improvements: Vec::new(),
        }
    }
}

/// The live progress model for one conversation.
#[derive(Debug, Clone)]
pub struct StageModel<S: StageSequence> {
    current_stage: S,
    progress: u8,
    stage_title: String,
    feedback: Option<Feedback>,
    preferences: Vec<String>,
    key_insights: Vec<String>,
}

impl<S: StageSequence> Default for StageModel<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StageSequence> StageModel<S> {
    pub fn new() -> Self {
        let first = S::first();
        Self {
            current_stage: first,
            progress: 0,
            stage_title: first.title().to_string(),
            feedback: None,
            preferences: Vec::new(),
            key_insights: Vec::new(),
        }
    }

    pub fn current_stage(&self) -> S {
        self.current_stage
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn stage_title(&self) -> &str {
        &self.stage_title
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn preferences(&self) -> &[String] {
        &self.preferences
    }

    pub fn key_insights(&self) -> &[String] {
        &self.key_insights
    }

    pub fn is_completed(&self) -> bool {
        self.current_stage.is_terminal()
    }

    /// Steps one position forward in the fixed order, clamped at the
    /// terminal stage. Returns the stage now current.
    pub fn advance_stage(&mut self) -> S {
        let next = self.current_stage.next();
        self.current_stage = next;
        self.stage_title = next.title().to_string();
        self.progress = self.progress.max(next.default_progress());
        next
    }

    /// Applies an explicit stage update from a function call.
    ///
    /// Unknown stage names and backwards moves are ignored; progress never
    /// decreases.
    pub fn apply_stage_update(
        &mut self,
        stage_name: Option<&str>,
        progress: Option<u8>,
        stage_title: Option<&str>,
    ) {
        if let Some(name) = stage_name {
            match S::from_wire(name) {
                Some(stage) if stage.index() >= self.current_stage.index() => {
                    self.current_stage = stage;
                    self.stage_title = stage.title().to_string();
                }
                Some(stage) => {
                    warn!(?stage, current = ?self.current_stage, "Ignoring backwards stage update");
                }
                None => warn!(%name, "Ignoring unknown stage name"),
            }
        }
        if let Some(p) = progress {
            self.progress = self.progress.max(p.min(100));
        }
        if let Some(title) = stage_title {
            self.stage_title = title.to_string();
        }
    }

    pub fn set_feedback(&mut self, feedback: Feedback) {
        self.feedback = Some(feedback);
    }

    pub fn record_preference(&mut self, preference: String) {
        self.preferences.push(preference);
    }

    pub fn record_insight(&mut self, insight: String) {
        self.key_insights.push(insight);
    }

    /// Moves straight to the terminal stage with full progress.
    pub fn complete(&mut self) {
        let terminal = S::terminal();
        self.current_stage = terminal;
        self.stage_title = terminal.title().to_string();
        self.progress = 100;
    }

    /// Returns the model to its initial stage with zero progress. Only the
    /// explicit stop path calls this.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
