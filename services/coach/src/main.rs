//! Terminal runtime for the voice coaches.
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Wiring up the credential provider and microphone source.
//! 4. Running the selected conversation (interview, onboarding, or chat)
//!    until it completes, the user quits, or Ctrl+C arrives.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use voximate_core::{
    CoachHooks, InterviewCoach, InterviewContext, JobPosting, OnboardingCoach, OnboardingContext,
    RealtimeChat, ResumeProfile, StageSequence,
};
use voximate_realtime::{
    ChatMessage, CpalMediaSource, CredentialProvider, HttpCredentialProvider, SessionDeps,
    StaticCredentialProvider, TransportConfig,
};

#[derive(Parser)]
#[command(name = "coach", about = "Voice interview and onboarding coach")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run a spoken mock job interview.
    Interview {
        /// Path to a parsed resume JSON file.
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Path to a parsed job posting JSON file.
        #[arg(long)]
        job: Option<PathBuf>,
    },
    /// Run the new-user onboarding conversation.
    Onboarding {
        /// Name to address the user by.
        #[arg(long)]
        name: Option<String>,
    },
    /// Free-form voice chat.
    Chat {
        /// System instructions for the conversation.
        #[arg(long, default_value = "You are a helpful voice assistant.")]
        instructions: String,
    },
}

fn session_deps(config: &Config) -> SessionDeps {
    let credential: Arc<dyn CredentialProvider> = match (&config.mint_url, &config.api_key) {
        (Some(mint_url), _) => Arc::new(HttpCredentialProvider::new(mint_url.clone())),
        (None, Some(api_key)) => Arc::new(StaticCredentialProvider::new(api_key.clone())),
        (None, None) => unreachable!("Config::from_env validates credentials"),
    };
    SessionDeps {
        transport: TransportConfig {
            signaling_url: config.signaling_url.clone(),
            model: config.model.clone(),
            guard_timeout: config.guard_timeout,
        },
        credential,
        media: Arc::new(CpalMediaSource),
    }
}

fn print_message(message: &ChatMessage) {
    let speaker = if message.is_user { "you" } else { "coach" };
    println!("[{}] {}", speaker, message.text);
}

fn coach_hooks<S: StageSequence>(complete_tx: mpsc::Sender<()>) -> CoachHooks<S> {
    CoachHooks::default()
        .with_message_handler(Arc::new(print_message))
        .with_stage_handler(Arc::new(|stage: S, progress| {
            println!("── stage: {} ({}%)", stage.title(), progress);
        }))
        .with_complete_handler(Arc::new(move || {
            let _ = complete_tx.try_send(());
        }))
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!(model = %config.model, "Configuration loaded");

    let deps = session_deps(&config);
    let (complete_tx, mut complete_rx) = mpsc::channel::<()>(1);

    match cli.mode {
        Mode::Interview { resume, job } => {
            let context = InterviewContext {
                resume: resume.as_ref().map(load_json::<ResumeProfile>).transpose()?,
                job: job.as_ref().map(load_json::<JobPosting>).transpose()?,
                voice: Some(config.voice.clone()),
            };
            let coach = InterviewCoach::new(deps, context, coach_hooks(complete_tx));

            println!("Connecting... speak once the session is live, or type an answer.");
            coach.start_interview().await?;
            let coach_ref = &coach;
            run_input_loop(&mut complete_rx, |line| async move {
                coach_ref.send_text(&line).await;
            })
            .await;
            coach.stop_interview().await;

            let outcome = coach.outcome();
            println!(
                "Interview ended at {} with {}% progress after {} messages.",
                outcome.final_stage.title(),
                outcome.progress,
                outcome.exchanged_messages
            );
        }
        Mode::Onboarding { name } => {
            let context = OnboardingContext {
                user_name: name,
                voice: Some(config.voice.clone()),
            };
            let coach = OnboardingCoach::new(deps, context, coach_hooks(complete_tx));

            println!("Connecting... say hello to get started.");
            coach.start_onboarding().await?;
            let coach_ref = &coach;
            run_input_loop(&mut complete_rx, |line| async move {
                coach_ref.send_text(&line).await;
            })
            .await;

            let profile = coach.profile();
            coach.stop_onboarding().await;
            println!(
                "Recorded {} preferences and {} insights.",
                profile.preferences.len(),
                profile.key_insights.len()
            );
        }
        Mode::Chat { instructions } => {
            let chat = RealtimeChat::new(
                deps,
                instructions,
                Some(config.voice.clone()),
                Some(Arc::new(print_message)),
            );

            println!("Connecting...");
            chat.connect().await?;
            let chat_ref = &chat;
            run_input_loop(&mut complete_rx, |line| async move {
                chat_ref.send_message(&line).await;
            })
            .await;
            chat.disconnect().await;
        }
    }

    info!("Session closed. Goodbye.");
    Ok(())
}

/// Reads stdin lines into the conversation until EOF, `/quit`, Ctrl+C, or
/// conversation completion.
async fn run_input_loop<F, Fut>(complete_rx: &mut mpsc::Receiver<()>, send: F)
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted. Closing the session...");
                break;
            }
            _ = complete_rx.recv() => {
                println!("Conversation complete.");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line == "/quit" {
                            break;
                        }
                        if !line.is_empty() {
                            send(line).await;
                        }
                    }
                    _ => break,
                }
            }
        }
    }
}
