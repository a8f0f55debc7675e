//! Realtime voice-session client: WebRTC transport, control-channel event
//! decoding, and the session controller that ties them together.
//!
//! The conversation policy layers (interview coach, onboarding coach, chat)
//! live in `voximate-core` and drive this crate through [`SessionHooks`].

pub mod audio;
pub mod credential;
pub mod decoder;
pub mod error;
pub mod media;
pub mod session;
pub mod transport;

pub use credential::{
    CredentialProvider, HttpCredentialProvider, RealtimeCredential, StaticCredentialProvider,
};
pub use decoder::{ChatMessage, DecodeOutcome, EventDecoder, PendingResponse, SessionEvent};
pub use error::SessionError;
pub use media::{CpalMediaSource, MediaSource, MicrophoneHandle, NullMediaSource};
pub use session::{
    ConfigureFn, EventHandler, MessageHandler, RealtimeSession, SessionDeps, SessionHooks,
    SessionStatus, StageTagFn,
};
pub use transport::{RealtimeTransport, TransportConfig, TransportEvent};
