//! The onboarding coach: walks a new user through a spoken setup
//! conversation, recording job preferences and key insights along the way.
//!
//! Structurally a sibling of the interview coach with two extra recording
//! tools; the assembled [`OnboardingProfile`] can be persisted to the
//! document store once the conversation completes.

use crate::coach::{
    CoachHooks, InsightArgs, PreferenceArgs, ProgressUpdateArgs, parse_args,
    parse_feedback_payload, schedule_completion,
};
use crate::collab::{DocumentStore, UserAccount};
use crate::markers::{MarkerEvent, MarkerScanner};
use crate::profile::OnboardingProfile;
use crate::stage::{Feedback, OnboardingStage, StageModel, StageSequence};
use anyhow::Context;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use voximate_realtime::{
    RealtimeSession, SessionDeps, SessionError, SessionEvent, SessionHooks, SessionStatus,
};
use voximate_realtime_types::{SessionConfig, ToolDefinition};

/// Caller-supplied data for the onboarding conversation.
#[derive(Debug, Clone, Default)]
pub struct OnboardingContext {
    pub user_name: Option<String>,
    pub voice: Option<String>,
}

struct OnboardingPolicy {
    model: Mutex<StageModel<OnboardingStage>>,
    scanner: Mutex<MarkerScanner>,
    hooks: CoachHooks<OnboardingStage>,
    completion_scheduled: AtomicBool,
}

impl OnboardingPolicy {
    fn new(hooks: CoachHooks<OnboardingStage>) -> Self {
        Self {
            model: Mutex::new(StageModel::new()),
            scanner: Mutex::new(MarkerScanner::new()),
            hooks,
            completion_scheduled: AtomicBool::new(false),
        }
    }

    fn handle_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::FunctionCall { name, arguments } => match name.as_str() {
                "updateOnboardingProgress" => {
                    let Some(args) = parse_args::<ProgressUpdateArgs>(name, arguments) else {
                        return;
                    };
                    let (stage, progress) = {
                        let mut model = self.model.lock();
                        model.apply_stage_update(
                            args.current_stage.as_deref(),
                            args.progress_value(),
                            args.stage_title.as_deref(),
                        );
                        (model.current_stage(), model.progress())
                    };
                    self.notify_stage(stage, progress);
                    if stage.is_terminal() {
                        self.complete();
                    }
                }
                "recordPreference" => {
                    if let Some(args) = parse_args::<PreferenceArgs>(name, arguments) {
                        let entry = match args.category {
                            Some(category) => format!("{}: {}", category, args.preference),
                            None => args.preference,
                        };
                        info!(preference = %entry, "Preference recorded");
                        self.model.lock().record_preference(entry);
                    }
                }
                "recordInsight" => {
                    if let Some(args) = parse_args::<InsightArgs>(name, arguments) {
                        info!("Insight recorded");
                        self.model.lock().record_insight(args.insight);
                    }
                }
                "showFeedback" => {
                    if let Some(feedback) = parse_args::<Feedback>(name, arguments) {
                        self.model.lock().set_feedback(feedback);
                    }
                }
                other => debug!(name = %other, "Ignoring unhandled function call"),
            },
            SessionEvent::TextDelta { delta } => {
                let markers = self.scanner.lock().push(delta);
                for marker in markers {
                    self.handle_marker(marker);
                }
            }
            _ => {}
        }
    }

    fn handle_marker(&self, marker: MarkerEvent) {
        match marker {
            MarkerEvent::NextStage => {
                let (stage, progress) = {
                    let mut model = self.model.lock();
                    let stage = model.advance_stage();
                    (stage, model.progress())
                };
                self.notify_stage(stage, progress);
                if stage.is_terminal() {
                    self.complete();
                }
            }
            MarkerEvent::Feedback(payload) => {
                self.model.lock().set_feedback(parse_feedback_payload(&payload));
            }
            MarkerEvent::Complete => {
                self.model.lock().complete();
                self.notify_stage(OnboardingStage::Completed, 100);
                self.complete();
            }
        }
    }

    fn notify_stage(&self, stage: OnboardingStage, progress: u8) {
        if let Some(on_stage) = &self.hooks.on_stage {
            on_stage(stage, progress);
        }
    }

    fn complete(&self) {
        if self.completion_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Onboarding complete; scheduling close after grace delay");
        schedule_completion(self.hooks.on_complete.clone());
    }

    fn reset(&self) {
        self.model.lock().reset();
        self.scanner.lock().reset();
        self.completion_scheduled.store(false, Ordering::SeqCst);
    }
}

/// The onboarding coach.
pub struct OnboardingCoach {
    session: RealtimeSession,
    policy: Arc<OnboardingPolicy>,
}

impl OnboardingCoach {
    pub fn new(
        deps: SessionDeps,
        context: OnboardingContext,
        hooks: CoachHooks<OnboardingStage>,
    ) -> Self {
        let policy = Arc::new(OnboardingPolicy::new(hooks.clone()));

        let configure = {
            let context = context.clone();
            Arc::new(move || onboarding_session_config(&context))
        };
        let mut session_hooks = SessionHooks::new(configure)
            .with_event_handler({
                let policy = policy.clone();
                Arc::new(move |event| policy.handle_event(event))
            })
            .with_stage_tag({
                let policy = policy.clone();
                Arc::new(move || Some(policy.model.lock().current_stage().wire_name().to_string()))
            });
        if let Some(on_message) = hooks.on_message {
            session_hooks = session_hooks.with_message_handler(on_message);
        }

        Self {
            session: RealtimeSession::new(deps, session_hooks),
            policy,
        }
    }

    /// Connects and begins onboarding; a no-op while a session is active.
    pub async fn start_onboarding(&self) -> Result<(), SessionError> {
        if self.session.status() != SessionStatus::Disconnected {
            warn!("start_onboarding ignored: session already active");
            return Ok(());
        }
        self.session.connect().await
    }

    /// Disconnects and resets the stage model.
    pub async fn stop_onboarding(&self) {
        self.policy.reset();
        self.session.disconnect().await;
    }

    pub async fn send_text(&self, text: &str) {
        self.session.send_message(text).await;
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn last_error(&self) -> Option<String> {
        self.session.last_error()
    }

    pub fn messages(&self) -> Vec<voximate_realtime::ChatMessage> {
        self.session.messages()
    }

    pub fn stage_model(&self) -> StageModel<OnboardingStage> {
        self.policy.model.lock().clone()
    }

    /// The profile assembled so far, stamped when onboarding completed.
    pub fn profile(&self) -> OnboardingProfile {
        let model = self.policy.model.lock();
        OnboardingProfile {
            preferences: model.preferences().to_vec(),
            key_insights: model.key_insights().to_vec(),
            completed_at: model.is_completed().then(Utc::now),
        }
    }

    /// Persists the assembled profile onto the user's document.
    pub async fn persist_profile(
        &self,
        store: &dyn DocumentStore,
        user: &UserAccount,
    ) -> anyhow::Result<()> {
        let profile = self.profile();
        let path = format!("users/{}", user.id);
        store
            .update(
                &path,
                json!({ "onboarding": serde_json::to_value(&profile)? }),
            )
            .await
            .with_context(|| format!("Failed to persist onboarding profile to {}", path))
    }
}

fn onboarding_session_config(context: &OnboardingContext) -> SessionConfig {
    SessionConfig {
        instructions: build_onboarding_instructions(context),
        voice: context.voice.clone().unwrap_or_else(|| "alloy".to_string()),
        tools: onboarding_tools(),
        tool_choice: Some("auto".to_string()),
        ..Default::default()
    }
}

fn onboarding_tools() -> Vec<ToolDefinition> {
    let stage_names: Vec<&str> = OnboardingStage::ORDER.iter().map(|s| s.wire_name()).collect();
    vec![
        ToolDefinition::function(
            "updateOnboardingProgress",
            "Report that onboarding moved to a new stage, with overall progress.",
            json!({
                "type": "object",
                "properties": {
                    "currentStage": { "type": "string", "enum": stage_names },
                    "progress": { "type": "number", "minimum": 0, "maximum": 100 },
                    "stageTitle": { "type": "string" }
                },
                "required": ["currentStage"]
            }),
        ),
        ToolDefinition::function(
            "recordPreference",
            "Record a job preference the user expressed (role, location, schedule, pay).",
            json!({
                "type": "object",
                "properties": {
                    "preference": { "type": "string" },
                    "category": { "type": "string" }
                },
                "required": ["preference"]
            }),
        ),
        ToolDefinition::function(
            "recordInsight",
            "Record a key insight about the user's background or motivation.",
            json!({
                "type": "object",
                "properties": { "insight": { "type": "string" } },
                "required": ["insight"]
            }),
        ),
        ToolDefinition::function(
            "showFeedback",
            "Show the user an encouraging note about their answers so far.",
            json!({
                "type": "object",
                "properties": {
                    "type": { "type": "string", "enum": ["positive", "improvement", "neutral"] },
                    "message": { "type": "string" },
                    "strengths": { "type": "array", "items": { "type": "string" } },
                    "improvements": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["type", "message"]
            }),
        ),
    ]
}

fn build_onboarding_instructions(context: &OnboardingContext) -> String {
    let mut instructions = String::from(
        "You are a warm onboarding guide for a video job-application app. Have \
         a short spoken conversation to learn who the user is and what work \
         they are looking for.\n\nWork through these stages in order: ",
    );
    let stages: Vec<String> = OnboardingStage::ORDER
        .iter()
        .filter(|s| !s.is_terminal())
        .map(|s| format!("{} ({})", s.title(), s.wire_name()))
        .collect();
    instructions.push_str(&stages.join(", "));
    instructions.push_str(
        ".\n\nCall updateOnboardingProgress when moving between stages. Every \
         time the user states a concrete preference call recordPreference; \
         record anything notable about their background with recordInsight.",
    );
    if let Some(name) = &context.user_name {
        instructions.push_str(&format!("\n\nThe user's name is {}.", name));
    }
    instructions
}
