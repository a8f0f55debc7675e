//! Conversation policy layer for the realtime voice sessions.
//!
//! Three policies share the session controller in `voximate-realtime`: the
//! interview coach, the onboarding coach, and a generic chat. Each supplies
//! its own session configuration and interprets server function calls and
//! inline transcript markers to drive a stage/progress model.

pub mod chat;
pub mod coach;
pub mod collab;
pub mod interview;
pub mod markers;
pub mod onboarding;
pub mod profile;
pub mod stage;

pub use chat::RealtimeChat;
pub use coach::{COMPLETION_GRACE, CoachHooks, CompleteFn, StageHandler};
pub use collab::{
    BlobStore, ChangeHandler, CurrentUserProvider, DocumentParser, DocumentStore, ProgressFn,
    Subscription, UserAccount,
};
pub use interview::{InterviewCoach, InterviewContext, InterviewOutcome};
pub use markers::{MarkerEvent, MarkerScanner};
pub use onboarding::{OnboardingCoach, OnboardingContext};
pub use profile::{ExperienceEntry, JobPosting, OnboardingProfile, ResumeProfile};
pub use stage::{
    Feedback, FeedbackKind, InterviewStage, OnboardingStage, StageModel, StageSequence,
};
