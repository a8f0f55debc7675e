//! Error taxonomy for the realtime session.
//!
//! Every failure mode maps to one variant with a human-readable message.
//! Connect-time failures reject the `connect()` future and leave the session
//! Disconnected; decode failures never reach this type (they are logged and
//! dropped at the decoder boundary).

/// Errors surfaced by the session controller and transport layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The microphone was denied or no capture device exists. Fatal to the
    /// connect attempt; no automatic retry.
    #[error("Microphone unavailable: {0}")]
    MediaAcquisition(String),

    /// Minting the ephemeral bearer credential failed. Retryable by calling
    /// `connect()` again.
    #[error("Credential minting failed: {0}")]
    Credential(String),

    /// The signaling exchange failed (non-2xx response or malformed answer).
    #[error("Signaling failed: {0}")]
    Signaling(String),

    /// The offer/answer exchange did not complete within the guard timeout.
    #[error("Connection negotiation timed out")]
    NegotiationTimeout,

    /// The established transport failed (ICE/connectivity). The session tears
    /// itself down; reconnection is the caller's decision.
    #[error("Transport failed: {0}")]
    TransportFailed(String),

    /// The remote endpoint sent an error event.
    #[error("Remote error: {0}")]
    Remote(String),

    /// `disconnect()` was invoked while the connect attempt was still in
    /// flight; the attempt settles here instead of completing.
    #[error("Connect attempt cancelled by disconnect")]
    Cancelled,
}
