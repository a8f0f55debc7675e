//! WebRTC transport to the conversational endpoint.
//!
//! One connect attempt performs a single HTTP offer/answer exchange: acquire
//! the microphone, create a local description carrying one audio track and
//! one ordered reliable data channel, POST the offer SDP to the signaling
//! endpoint with a bearer credential, and apply the returned answer. There is
//! no renegotiation; any later connectivity failure surfaces as an
//! asynchronous [`TransportEvent::Failed`] and the session tears down.

use crate::credential::RealtimeCredential;
use crate::error::SessionError;
use crate::media::{MediaSource, MicrophoneHandle};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::media_engine::{MIME_TYPE_PCMU, MediaEngine};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Endpoint parameters for the signaling exchange.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base signaling URL; the model is appended as a query parameter.
    pub signaling_url: String,
    /// Model identifier for the conversational endpoint.
    pub model: String,
    /// Bounds the signaling round trip and answer application.
    pub guard_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            signaling_url: "https://api.openai.com/v1/realtime".to_string(),
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
            guard_timeout: Duration::from_secs(10),
        }
    }
}

/// Asynchronous notifications from the live transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// The control channel is open; structured traffic may begin.
    ChannelOpen,
    /// One inbound control-channel frame (JSON text).
    Frame(String),
    /// The control channel closed.
    ChannelClosed,
    /// The peer connection failed; the transport is unusable.
    Failed(String),
}

/// A negotiated peer connection plus its control channel and microphone.
pub struct RealtimeTransport {
    pc: Arc<RTCPeerConnection>,
    channel: Arc<RTCDataChannel>,
    mic: MicrophoneHandle,
    closed: AtomicBool,
}

impl RealtimeTransport {
    /// Establishes the transport. On any failure no partial transport is
    /// left open: the microphone is released and the peer connection closed
    /// before the error is returned.
    pub async fn connect(
        config: &TransportConfig,
        credential: &RealtimeCredential,
        media: &dyn MediaSource,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), SessionError> {
        // Microphone first: a denied permission must fail the attempt before
        // any peer connection exists.
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_PCMU.to_owned(),
                clock_rate: 8000,
                channels: 1,
                ..Default::default()
            },
            "audio".to_owned(),
            "voximate-mic".to_owned(),
        ));
        let mic = media.open(track.clone()).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        match Self::negotiate(config, credential, track, events_tx).await {
            Ok((pc, channel)) => Ok((
                Self {
                    pc,
                    channel,
                    mic,
                    closed: AtomicBool::new(false),
                },
                events_rx,
            )),
            Err(e) => {
                mic.stop();
                Err(e)
            }
        }
    }

    async fn negotiate(
        config: &TransportConfig,
        credential: &RealtimeCredential,
        track: Arc<TrackLocalStaticSample>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(Arc<RTCPeerConnection>, Arc<RTCDataChannel>), SessionError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| SessionError::TransportFailed(e.to_string()))?;
        let api = APIBuilder::new().with_media_engine(media_engine).build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| SessionError::TransportFailed(e.to_string()))?,
        );

        match Self::negotiate_on(&pc, config, credential, track, events_tx).await {
            Ok(channel) => Ok((pc, channel)),
            Err(e) => {
                let _ = pc.close().await;
                Err(e)
            }
        }
    }

    async fn negotiate_on(
        pc: &Arc<RTCPeerConnection>,
        config: &TransportConfig,
        credential: &RealtimeCredential,
        track: Arc<TrackLocalStaticSample>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<RTCDataChannel>, SessionError> {
        let rtp_sender = pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| SessionError::TransportFailed(e.to_string()))?;
        // Drain RTCP so the sender's feedback loop does not stall.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        // Data channels are ordered and reliable by default, which is exactly
        // what the control protocol requires.
        let channel = pc
            .create_data_channel("events", None)
            .await
            .map_err(|e| SessionError::TransportFailed(e.to_string()))?;

        let open_tx = events_tx.clone();
        channel.on_open(Box::new(move || {
            debug!("Control channel open");
            let _ = open_tx.send(TransportEvent::ChannelOpen);
            Box::pin(async {})
        }));

        let frame_tx = events_tx.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let frame = String::from_utf8_lossy(&msg.data).to_string();
            let _ = frame_tx.send(TransportEvent::Frame(frame));
            Box::pin(async {})
        }));

        let close_tx = events_tx.clone();
        channel.on_close(Box::new(move || {
            let _ = close_tx.send(TransportEvent::ChannelClosed);
            Box::pin(async {})
        }));

        let state_tx = events_tx;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(?state, "Peer connection state changed");
            if state == RTCPeerConnectionState::Failed {
                let _ = state_tx.send(TransportEvent::Failed(
                    "peer connection entered failed state".to_string(),
                ));
            }
            Box::pin(async {})
        }));

        let offer = pc
            .create_offer(None)
            .await
            .map_err(|e| SessionError::TransportFailed(e.to_string()))?;
        let mut gather_complete = pc.gathering_complete_promise().await;
        pc.set_local_description(offer)
            .await
            .map_err(|e| SessionError::TransportFailed(e.to_string()))?;
        let _ = gather_complete.recv().await;

        let offer_sdp = pc
            .local_description()
            .await
            .ok_or_else(|| {
                SessionError::TransportFailed("local description missing after gathering".into())
            })?
            .sdp;

        // The signaling round trip and answer application are bounded by the
        // guard timeout so connect() can never hang indefinitely.
        tokio::time::timeout(config.guard_timeout, async {
            let answer_sdp = post_offer(config, credential, offer_sdp).await?;
            let answer = RTCSessionDescription::answer(answer_sdp)
                .map_err(|e| SessionError::Signaling(format!("malformed answer: {}", e)))?;
            pc.set_remote_description(answer)
                .await
                .map_err(|e| SessionError::Signaling(format!("answer rejected: {}", e)))
        })
        .await
        .map_err(|_| SessionError::NegotiationTimeout)??;

        info!(model = %config.model, "Transport negotiated");
        Ok(channel)
    }

    /// Sends one JSON frame over the control channel.
    pub async fn send_frame(&self, frame: String) -> Result<(), SessionError> {
        if self.channel.ready_state() != RTCDataChannelState::Open {
            return Err(SessionError::TransportFailed(
                "control channel is not open".to_string(),
            ));
        }
        self.channel
            .send_text(frame)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::TransportFailed(e.to_string()))
    }

    /// Whether the control channel is currently open.
    pub fn channel_open(&self) -> bool {
        self.channel.ready_state() == RTCDataChannelState::Open
    }

    /// Releases the microphone and closes the channel and peer connection.
    /// Idempotent and safe from any state.
    pub async fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.mic.stop();
        if let Err(e) = self.channel.close().await {
            debug!("Control channel close: {}", e);
        }
        if let Err(e) = self.pc.close().await {
            warn!("Peer connection close: {}", e);
        }
        info!("Transport torn down");
    }
}

/// POSTs the offer SDP to `{signaling_url}?model={model}` and returns the
/// answer SDP.
async fn post_offer(
    config: &TransportConfig,
    credential: &RealtimeCredential,
    offer_sdp: String,
) -> Result<String, SessionError> {
    let url = format!("{}?model={}", config.signaling_url, config.model);
    let response = reqwest::Client::new()
        .post(&url)
        .bearer_auth(credential.token.expose_secret())
        .header(reqwest::header::CONTENT_TYPE, "application/sdp")
        .body(offer_sdp)
        .send()
        .await
        .map_err(|e| SessionError::Signaling(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SessionError::Signaling(format!(
            "signaling endpoint returned {}",
            status
        )));
    }
    response
        .text()
        .await
        .map_err(|e| SessionError::Signaling(format!("unreadable answer body: {}", e)))
}
