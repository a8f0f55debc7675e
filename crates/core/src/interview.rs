//! The interview coach: a mock-interview policy over the realtime session.
//!
//! The coach supplies the session configuration (instructions parameterized
//! by the candidate's resume and the job posting, plus the declared tools)
//! and drives the [`StageModel`] from both stage-advance channels: explicit
//! function calls and inline text markers. Both channels stay active at once
//! because different endpoint configurations use one or the other.

use crate::coach::{
    CoachHooks, ProgressUpdateArgs, parse_args, parse_feedback_payload, schedule_completion,
};
use crate::markers::{MarkerEvent, MarkerScanner};
use crate::profile::{JobPosting, ResumeProfile};
use crate::stage::{Feedback, InterviewStage, StageModel, StageSequence};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use voximate_realtime::{
    RealtimeSession, SessionDeps, SessionError, SessionEvent, SessionHooks, SessionStatus,
};
use voximate_realtime_types::{SessionConfig, ToolDefinition};

/// Caller-supplied data the interview is conducted against.
#[derive(Debug, Clone, Default)]
pub struct InterviewContext {
    pub resume: Option<ResumeProfile>,
    pub job: Option<JobPosting>,
    pub voice: Option<String>,
}

/// Summary of a finished (or abandoned) interview for the application layer.
#[derive(Debug, Clone)]
pub struct InterviewOutcome {
    pub final_stage: InterviewStage,
    pub progress: u8,
    pub feedback: Option<Feedback>,
    pub exchanged_messages: usize,
}

struct InterviewPolicy {
    model: Mutex<StageModel<InterviewStage>>,
    scanner: Mutex<MarkerScanner>,
    hooks: CoachHooks<InterviewStage>,
    completion_scheduled: AtomicBool,
}

impl InterviewPolicy {
    fn new(hooks: CoachHooks<InterviewStage>) -> Self {
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
                "updateInterviewProgress" => {
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
                "showFeedback" => {
                    if let Some(feedback) = parse_args::<Feedback>(name, arguments) {
                        info!("Interview feedback received");
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
                info!(?stage, "Stage advanced by inline marker");
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
                self.notify_stage(InterviewStage::Completed, 100);
                self.complete();
            }
        }
    }

    fn notify_stage(&self, stage: InterviewStage, progress: u8) {
        if let Some(on_stage) = &self.hooks.on_stage {
            on_stage(stage, progress);
        }
    }

    fn complete(&self) {
        if self.completion_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Interview complete; scheduling close after grace delay");
        schedule_completion(self.hooks.on_complete.clone());
    }

    fn reset(&self) {
        self.model.lock().reset();
        self.scanner.lock().reset();
        self.completion_scheduled.store(false, Ordering::SeqCst);
    }
}

/// The interview coach. Thin stage-aware wrapper over [`RealtimeSession`].
pub struct InterviewCoach {
    session: RealtimeSession,
    policy: Arc<InterviewPolicy>,
}

impl InterviewCoach {
    pub fn new(
        deps: SessionDeps,
        context: InterviewContext,
        hooks: CoachHooks<InterviewStage>,
    ) -> Self {
        let policy = Arc::new(InterviewPolicy::new(hooks.clone()));

        let configure = {
            let context = context.clone();
            Arc::new(move || interview_session_config(&context))
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

    /// Connects and begins the interview. A no-op if a session is already
    /// negotiating or live, so rapid repeated triggers cannot double-connect.
    pub async fn start_interview(&self) -> Result<(), SessionError> {
        if self.session.status() != SessionStatus::Disconnected {
            warn!("start_interview ignored: session already active");
            return Ok(());
        }
        self.session.connect().await
    }

    /// Disconnects and resets the stage model to its initial state.
    pub async fn stop_interview(&self) {
        self.policy.reset();
        self.session.disconnect().await;
    }

    /// Sends a typed answer into the conversation.
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

    /// Snapshot of the live stage model.
    pub fn stage_model(&self) -> StageModel<InterviewStage> {
        self.policy.model.lock().clone()
    }

    /// Summary the application layer can attach to a job application record.
    pub fn outcome(&self) -> InterviewOutcome {
        let model = self.policy.model.lock();
        InterviewOutcome {
            final_stage: model.current_stage(),
            progress: model.progress(),
            feedback: model.feedback().cloned(),
            exchanged_messages: self.session.messages().len(),
        }
    }
}

/// Builds the session configuration for an interview.
fn interview_session_config(context: &InterviewContext) -> SessionConfig {
    SessionConfig {
        instructions: build_interview_instructions(context),
        voice: context.voice.clone().unwrap_or_else(|| "alloy".to_string()),
        tools: interview_tools(),
        tool_choice: Some("auto".to_string()),
        ..Default::default()
    }
}

fn interview_tools() -> Vec<ToolDefinition> {
    let stage_names: Vec<&str> = InterviewStage::ORDER.iter().map(|s| s.wire_name()).collect();
    vec![
        ToolDefinition::function(
            "updateInterviewProgress",
            "Report that the interview moved to a new stage, with overall progress.",
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
            "showFeedback",
            "Show the candidate structured feedback on their last answer.",
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

fn build_interview_instructions(context: &InterviewContext) -> String {
    let mut instructions = String::from(
        "You are an experienced, friendly interviewer conducting a spoken mock \
         job interview. Keep answers conversational and concise; ask one \
         question at a time.\n\nWork through these stages in order: ",
    );
    let stages: Vec<String> = InterviewStage::ORDER
        .iter()
        .filter(|s| !s.is_terminal())
        .map(|s| format!("{} ({})", s.title(), s.wire_name()))
        .collect();
    instructions.push_str(&stages.join(", "));
    instructions.push_str(
        ".\n\nWhenever you move to a new stage call updateInterviewProgress. \
         After each substantial answer call showFeedback with concrete \
         strengths and improvements. When the interview is over, say goodbye \
         and mark it complete.",
    );

    if let Some(resume) = &context.resume {
        instructions.push_str("\n\nCandidate resume:\n");
        instructions.push_str(&render_resume(resume));
    }
    if let Some(job) = &context.job {
        instructions.push_str("\n\nJob posting:\n");
        instructions.push_str(&render_job(job));
    }
    instructions
}

fn render_resume(resume: &ResumeProfile) -> String {
    let mut out = format!("- Name: {}\n", resume.name);
    if let Some(headline) = &resume.headline {
        out.push_str(&format!("- Headline: {}\n", headline));
    }
    if !resume.skills.is_empty() {
        out.push_str(&format!("- Skills: {}\n", resume.skills.join(", ")));
    }
    for entry in &resume.experience {
        out.push_str(&format!("- {} at {}", entry.role, entry.company));
        if let Some(duration) = &entry.duration {
            out.push_str(&format!(" ({})", duration));
        }
        out.push('\n');
        for highlight in &entry.highlights {
            out.push_str(&format!("  - {}\n", highlight));
        }
    }
    out
}

fn render_job(job: &JobPosting) -> String {
    let mut out = format!("- {} at {}\n", job.title, job.company);
    if let Some(location) = &job.location {
        out.push_str(&format!("- Location: {}\n", location));
    }
    if !job.description.is_empty() {
        out.push_str(&format!("- Description: {}\n", job.description));
    }
    if !job.requirements.is_empty() {
        out.push_str(&format!("- Requirements: {}\n", job.requirements.join("; ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};
    use std::sync::atomic::AtomicU32;

    fn function_call(name: &str, args: Value) -> SessionEvent {
        let Value::Object(arguments) = args else {
            panic!("args must be an object");
        };
        SessionEvent::FunctionCall {
            name: name.to_string(),
            arguments,
        }
    }

    fn delta(text: &str) -> SessionEvent {
        SessionEvent::TextDelta {
            delta: text.to_string(),
        }
    }

    #[test]
    fn test_progress_function_call_updates_model() {
        let policy = InterviewPolicy::new(CoachHooks::default());
        policy.handle_event(&function_call(
            "updateInterviewProgress",
            serde_json::json!({
                "currentStage": "technical",
                "progress": 25,
                "stageTitle": "Technical Skills"
            }),
        ));

        let model = policy.model.lock();
        assert_eq!(model.current_stage(), InterviewStage::Technical);
        assert_eq!(model.progress(), 25);
        assert_eq!(model.stage_title(), "Technical Skills");
    }

    #[test]
    fn test_marker_split_across_deltas_advances_once() {
        let policy = InterviewPolicy::new(CoachHooks::default());
        policy.handle_event(&delta("...progress report [NEXT_"));
        policy.handle_event(&delta("STAGE] moving on..."));

        let model = policy.model.lock();
        assert_eq!(model.current_stage(), InterviewStage::Experience);
    }

    #[test]
    fn test_both_channels_fire_independently() {
        // A function call and a marker in the same turn each advance: the two
        // trigger channels are intentionally not de-duplicated.
        let policy = InterviewPolicy::new(CoachHooks::default());
        policy.handle_event(&function_call(
            "updateInterviewProgress",
            serde_json::json!({"currentStage": "experience"}),
        ));
        policy.handle_event(&delta("[NEXT_STAGE]"));

        let model = policy.model.lock();
        assert_eq!(model.current_stage(), InterviewStage::Technical);
    }

    #[test]
    fn test_feedback_function_call() {
        let policy = InterviewPolicy::new(CoachHooks::default());
        policy.handle_event(&function_call(
            "showFeedback",
            serde_json::json!({
                "type": "positive",
                "message": "Clear structure",
                "strengths": ["specific metrics"]
            }),
        ));

        let model = policy.model.lock();
        let feedback = model.feedback().unwrap();
        assert_eq!(feedback.message, "Clear structure");
        assert_eq!(feedback.strengths, vec!["specific metrics"]);
    }

    #[test]
    fn test_inline_feedback_marker() {
        let policy = InterviewPolicy::new(CoachHooks::default());
        policy.handle_event(&delta("[FEEDBACK_START]Slow down a little.[FEEDBACK_END]"));

        let model = policy.model.lock();
        assert_eq!(model.feedback().unwrap().message, "Slow down a little.");
    }

    #[test]
    fn test_malformed_arguments_are_ignored() {
        let policy = InterviewPolicy::new(CoachHooks::default());
        let mut arguments = Map::new();
        arguments.insert("progress".to_string(), Value::String("a lot".to_string()));
        policy.handle_event(&SessionEvent::FunctionCall {
            name: "updateInterviewProgress".to_string(),
            arguments,
        });

        let model = policy.model.lock();
        assert_eq!(model.current_stage(), InterviewStage::Introduction);
        assert_eq!(model.progress(), 0);
    }

    #[test]
    fn test_stage_handler_notified() {
        let calls = Arc::new(AtomicU32::new(0));
        let hooks = CoachHooks::default().with_stage_handler({
            let calls = calls.clone();
            Arc::new(move |stage, progress| {
                assert_eq!(stage, InterviewStage::Experience);
                assert!(progress > 0);
                calls.fetch_add(1, Ordering::SeqCst);
            })
        });
        let policy = InterviewPolicy::new(hooks);
        policy.handle_event(&delta("[NEXT_STAGE]"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_marker_schedules_close_after_grace() {
        let closed = Arc::new(AtomicBool::new(false));
        let hooks = CoachHooks::default().with_complete_handler({
            let closed = closed.clone();
            Arc::new(move || closed.store(true, Ordering::SeqCst))
        });
        let policy = InterviewPolicy::new(hooks);
        policy.handle_event(&delta("That's everything. [INTERVIEW_COMPLETE] Goodbye!"));

        assert_eq!(
            policy.model.lock().current_stage(),
            InterviewStage::Completed
        );
        // Close runs only after the grace delay elapses.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!closed.load(Ordering::SeqCst));
        tokio::time::sleep(crate::coach::COMPLETION_GRACE).await;
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_completion_schedules_close_once() {
        let closes = Arc::new(AtomicU32::new(0));
        let hooks = CoachHooks::default().with_complete_handler({
            let closes = closes.clone();
            Arc::new(move || {
                closes.fetch_add(1, Ordering::SeqCst);
            })
        });
        let policy = InterviewPolicy::new(hooks);
        policy.handle_event(&delta("[INTERVIEW_COMPLETE]"));
        policy.handle_event(&function_call(
            "updateInterviewProgress",
            serde_json::json!({"currentStage": "completed"}),
        ));

        tokio::time::sleep(crate::coach::COMPLETION_GRACE * 2).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_reset_restores_initial_state() {
        let policy = InterviewPolicy::new(CoachHooks::default());
        policy.handle_event(&delta("[NEXT_STAGE] and a dangling [NEXT_"));
        policy.handle_event(&function_call(
            "showFeedback",
            serde_json::json!({"type": "neutral", "message": "ok"}),
        ));
        policy.reset();

        let model = policy.model.lock();
        assert_eq!(model.current_stage(), InterviewStage::Introduction);
        assert_eq!(model.progress(), 0);
        assert!(model.feedback().is_none());
    }

    #[test]
    fn test_session_config_declares_tools_and_context() {
        let context = InterviewContext {
            resume: Some(ResumeProfile {
                name: "Dana Smith".to_string(),
                headline: Some("Backend engineer".to_string()),
                skills: vec!["rust".to_string()],
                experience: vec![],
            }),
            job: Some(JobPosting {
                title: "Senior Rust Engineer".to_string(),
                company: "Nexus".to_string(),
                ..Default::default()
            }),
            voice: Some("verse".to_string()),
        };
        let config = interview_session_config(&context);

        assert_eq!(config.voice, "verse");
        assert_eq!(config.tools.len(), 2);
        assert_eq!(config.tools[0].name, "updateInterviewProgress");
        assert!(config.instructions.contains("Dana Smith"));
        assert!(config.instructions.contains("Senior Rust Engineer"));
        assert!(config.instructions.contains("technical"));
    }
}
