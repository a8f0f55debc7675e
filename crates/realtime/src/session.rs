//! The session controller: connection lifecycle and event fan-out.
//!
//! One [`RealtimeSession`] owns at most one live transport at a time and is
//! the single place where decoded events and finalized messages are
//! dispatched to the policy layer. Collaborators (credential minting, media
//! acquisition) are injected at construction; the controller never reaches
//! into ambient globals.

use crate::credential::CredentialProvider;
use crate::decoder::{ChatMessage, EventDecoder, SessionEvent};
use crate::error::SessionError;
use crate::media::MediaSource;
use crate::transport::{RealtimeTransport, TransportConfig, TransportEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use voximate_realtime_types::{ClientEvent, ConversationItem, ResponseSpec, SessionConfig};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Produces the session configuration sent as the first control frame.
pub type ConfigureFn = Arc<dyn Fn() -> SessionConfig + Send + Sync>;
/// Receives every decoded server event.
pub type EventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;
/// Receives every finalized message.
pub type MessageHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;
/// Supplies the stage tag attached to finalized assistant messages.
pub type StageTagFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Policy supplied per use case: configuration plus optional fan-out hooks.
///
/// Event and message delivery are independent so a policy that only cares
/// about stage transitions does not have to duplicate message bookkeeping.
#[derive(Clone)]
pub struct SessionHooks {
    pub configure: ConfigureFn,
    pub on_event: Option<EventHandler>,
    pub on_message: Option<MessageHandler>,
    pub stage_tag: Option<StageTagFn>,
}

impl SessionHooks {
    pub fn new(configure: ConfigureFn) -> Self {
        Self {
            configure,
            on_event: None,
            on_message: None,
            stage_tag: None,
        }
    }

    pub fn with_event_handler(mut self, handler: EventHandler) -> Self {
        self.on_event = Some(handler);
        self
    }

    pub fn with_message_handler(mut self, handler: MessageHandler) -> Self {
        self.on_message = Some(handler);
        self
    }

    pub fn with_stage_tag(mut self, tag: StageTagFn) -> Self {
        self.stage_tag = Some(tag);
        self
    }
}

/// Injected collaborators for one session.
pub struct SessionDeps {
    pub transport: TransportConfig,
    pub credential: Arc<dyn CredentialProvider>,
    pub media: Arc<dyn MediaSource>,
}

struct SharedState {
    status: Mutex<SessionStatus>,
    last_error: Mutex<Option<String>>,
    messages: Mutex<Vec<ChatMessage>>,
    transport: AsyncMutex<Option<Arc<RealtimeTransport>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every disconnect so an in-flight connect can detect that it
    /// was cancelled and must not complete into a connected state.
    generation: AtomicU64,
}

impl SharedState {
    fn set_status(&self, status: SessionStatus) {
        *self.status.lock() = status;
    }

    fn set_error(&self, error: Option<String>) {
        *self.last_error.lock() = error;
    }

    fn push_message(&self, message: ChatMessage) {
        self.messages.lock().push(message);
    }
}

/// The realtime session controller.
pub struct RealtimeSession {
    deps: SessionDeps,
    hooks: SessionHooks,
    state: Arc<SharedState>,
}

impl RealtimeSession {
    pub fn new(deps: SessionDeps, hooks: SessionHooks) -> Self {
        Self {
            deps,
            hooks,
            state: Arc::new(SharedState {
                status: Mutex::new(SessionStatus::Disconnected),
                last_error: Mutex::new(None),
                messages: Mutex::new(Vec::new()),
                transport: AsyncMutex::new(None),
                pump: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.state.status.lock()
    }

    /// The current user-facing error, replaced (not accumulated) on each new
    /// failure and cleared when a connect attempt starts.
    pub fn last_error(&self) -> Option<String> {
        self.state.last_error.lock().clone()
    }

    /// Snapshot of the append-only message log. Survives disconnects.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.messages.lock().clone()
    }

    /// Establishes the transport and drives the session to Connected.
    ///
    /// A no-op when already Connecting or Connected. Every failure path
    /// settles this future and leaves the session Disconnected with no
    /// partial transport open.
    pub async fn connect(&self) -> Result<(), SessionError> {
        {
            let mut status = self.state.status.lock();
            if *status != SessionStatus::Disconnected {
                warn!(status = ?*status, "connect() ignored: session is not disconnected");
                return Ok(());
            }
            *status = SessionStatus::Connecting;
        }
        self.state.set_error(None);
        let generation = self.state.generation.load(Ordering::SeqCst);

        match self.connect_inner(generation).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if !matches!(e, SessionError::Cancelled) {
                    self.state.set_error(Some(e.to_string()));
                }
                self.state.set_status(SessionStatus::Disconnected);
                Err(e)
            }
        }
    }

    async fn connect_inner(&self, generation: u64) -> Result<(), SessionError> {
        let guard_timeout = self.deps.transport.guard_timeout;

        let credential = tokio::time::timeout(guard_timeout, self.deps.credential.mint())
            .await
            .map_err(|_| SessionError::Credential("credential minting timed out".to_string()))??;
        self.ensure_live(generation)?;

        let (transport, mut events) = RealtimeTransport::connect(
            &self.deps.transport,
            &credential,
            self.deps.media.as_ref(),
        )
        .await?;
        let transport = Arc::new(transport);

        if self.ensure_live(generation).is_err() {
            transport.teardown().await;
            return Err(SessionError::Cancelled);
        }

        // The session is Connected only once the control channel opens.
        let opened = tokio::time::timeout(guard_timeout, async {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::ChannelOpen => return Ok(()),
                    TransportEvent::Failed(reason) => {
                        return Err(SessionError::TransportFailed(reason));
                    }
                    TransportEvent::ChannelClosed => {
                        return Err(SessionError::TransportFailed(
                            "control channel closed during negotiation".to_string(),
                        ));
                    }
                    TransportEvent::Frame(_) => {}
                }
            }
            Err(SessionError::TransportFailed(
                "transport closed during negotiation".to_string(),
            ))
        })
        .await
        .map_err(|_| SessionError::NegotiationTimeout)
        .and_then(|r| r);

        if let Err(e) = opened {
            transport.teardown().await;
            return Err(e);
        }
        if self.ensure_live(generation).is_err() {
            transport.teardown().await;
            return Err(SessionError::Cancelled);
        }

        // Configuration goes out before any other traffic so the endpoint's
        // voice, instructions, and tools are fixed for the whole session.
        let config = (self.hooks.configure)();
        let frame = serde_json::to_string(&ClientEvent::SessionUpdate { session: config })
            .map_err(|e| SessionError::TransportFailed(e.to_string()))?;
        if let Err(e) = transport.send_frame(frame).await {
            transport.teardown().await;
            return Err(e);
        }

        *self.state.transport.lock().await = Some(transport.clone());
        self.state.set_status(SessionStatus::Connected);
        info!("Session connected");

        let pump = tokio::spawn(pump_events(
            self.state.clone(),
            self.hooks.clone(),
            transport,
            events,
        ));
        *self.state.pump.lock() = Some(pump);
        Ok(())
    }

    fn ensure_live(&self, generation: u64) -> Result<(), SessionError> {
        if self.state.generation.load(Ordering::SeqCst) != generation {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Tears down the transport and returns the session to Disconnected.
    ///
    /// Idempotent; safe while a connect is still pending (the pending connect
    /// settles as cancelled). The message log is caller-facing state and is
    /// deliberately left intact.
    pub async fn disconnect(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        let pump = self.state.pump.lock().take();
        if let Some(pump) = pump {
            pump.abort();
        }
        let transport = self.state.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.teardown().await;
        }
        self.state.set_status(SessionStatus::Disconnected);
        info!("Session disconnected");
    }

    /// Sends a typed user message and requests a response.
    ///
    /// Requires a Connected session with an open control channel; otherwise
    /// the call is a logged no-op: nothing is appended and nothing is
    /// thrown. On success the message is appended to the local log before
    /// transmission (optimistic echo).
    pub async fn send_message(&self, text: &str) {
        if self.status() != SessionStatus::Connected {
            warn!("send_message ignored: session is not connected");
            return;
        }
        let transport = self.state.transport.lock().await.clone();
        let Some(transport) = transport else {
            warn!("send_message ignored: no transport");
            return;
        };
        if !transport.channel_open() {
            warn!("send_message ignored: control channel is not open");
            return;
        }

        let message = ChatMessage::user(text.to_string());
        self.state.push_message(message.clone());
        if let Some(handler) = &self.hooks.on_message {
            handler(&message);
        }

        let frames = [
            ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_text(text),
            },
            ClientEvent::ResponseCreate {
                response: ResponseSpec::default(),
            },
        ];
        for event in frames {
            match serde_json::to_string(&event) {
                Ok(frame) => {
                    if let Err(e) = transport.send_frame(frame).await {
                        warn!("Failed to send control frame: {}", e);
                        return;
                    }
                }
                Err(e) => warn!("Failed to encode control frame: {}", e),
            }
        }
    }
}

/// Consumes transport events for one connection: decodes frames, fans out
/// events and messages, and tears the session down when the transport ends.
async fn pump_events(
    state: Arc<SharedState>,
    hooks: SessionHooks,
    transport: Arc<RealtimeTransport>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut decoder = EventDecoder::new();
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Frame(frame) => {
                let outcome = decoder.decode(&frame);
                for event in &outcome.events {
                    if let SessionEvent::Error { message, .. } = event {
                        warn!("Remote error event: {}", message);
                        state.set_error(Some(message.clone()));
                    }
                    if let Some(handler) = &hooks.on_event {
                        handler(event);
                    }
                }
                for mut message in outcome.messages {
                    if !message.is_user {
                        if let Some(tag) = &hooks.stage_tag {
                            message.stage = tag();
                        }
                    }
                    state.push_message(message.clone());
                    if let Some(handler) = &hooks.on_message {
                        handler(&message);
                    }
                }
            }
            TransportEvent::ChannelClosed => {
                info!("Control channel closed by peer");
                break;
            }
            TransportEvent::Failed(reason) => {
                error!("Transport failed: {}", reason);
                state.set_error(Some(reason));
                break;
            }
            TransportEvent::ChannelOpen => {}
        }
    }
    transport.teardown().await;
    *state.transport.lock().await = None;
    state.pump.lock().take();
    state.set_status(SessionStatus::Disconnected);
}
