//! Wire-protocol types for the realtime voice control channel.
//!
//! Every frame exchanged over the data channel is a single JSON object with a
//! `type` discriminator. Outbound frames are [`ClientEvent`]s, inbound frames
//! are [`ServerEvent`]s. Unrecognized inbound types deserialize into
//! [`ServerEvent::Unknown`] instead of failing, so a protocol addition on the
//! server side never breaks the decoder.

pub mod client;
pub mod server;
pub mod session;

pub use client::{ClientEvent, ContentBlock, ConversationItem, ResponseSpec};
pub use server::{ContentPart, ErrorDetail, OutputItem, ResponseSummary, ServerEvent};
pub use session::{AudioTranscription, SessionConfig, ToolDefinition, TurnDetection};
