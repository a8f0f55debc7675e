//! Microphone acquisition and the capture-to-track pipeline.
//!
//! The session owns exactly one microphone per connection. Acquisition is
//! behind the [`MediaSource`] trait so the session controller can be driven
//! with a real capture device, a silent source in headless environments, or a
//! failing source in tests.

use crate::audio;
use crate::error::SessionError;
use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Acquires the local microphone and feeds encoded frames into the given
/// audio track until stopped.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn open(
        &self,
        track: Arc<TrackLocalStaticSample>,
    ) -> Result<MicrophoneHandle, SessionError>;
}

/// Handle to a live capture pipeline. Stopping is idempotent; dropping the
/// handle stops capture as well, so an aborted connect can never leak a live
/// microphone.
pub struct MicrophoneHandle {
    stop: Arc<AtomicBool>,
    feeder: Option<tokio::task::JoinHandle<()>>,
}

impl MicrophoneHandle {
    /// A handle with no backing pipeline (used by [`NullMediaSource`]).
    pub fn detached() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            feeder: None,
        }
    }

    /// Stops capture and the frame feeder. Safe to call repeatedly.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(feeder) = &self.feeder {
            feeder.abort();
        }
    }
}

impl Drop for MicrophoneHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Captures from the default input device via `cpal`, resamples to the track
/// rate, and writes G.711 µ-law frames to the peer's audio track.
#[derive(Default)]
pub struct CpalMediaSource;

#[async_trait]
impl MediaSource for CpalMediaSource {
    async fn open(
        &self,
        track: Arc<TrackLocalStaticSample>,
    ) -> Result<MicrophoneHandle, SessionError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<u32, SessionError>>();

        // The cpal stream is !Send, so a dedicated thread owns it for the
        // lifetime of the capture.
        let capture_stop = stop.clone();
        std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_capture(frame_tx, ready_tx, capture_stop))
            .map_err(|e| SessionError::MediaAcquisition(e.to_string()))?;

        let device_rate = ready_rx
            .await
            .map_err(|_| {
                SessionError::MediaAcquisition("capture thread exited during setup".to_string())
            })??;

        info!(device_rate, "Microphone acquired");
        let feeder = tokio::spawn(feed_track(track, frame_rx, device_rate));

        Ok(MicrophoneHandle {
            stop,
            feeder: Some(feeder),
        })
    }
}

/// Runs on the capture thread: opens the default input device, streams
/// samples into `frame_tx`, and holds the stream open until stopped.
fn run_capture(
    frame_tx: mpsc::UnboundedSender<Vec<f32>>,
    ready_tx: oneshot::Sender<Result<u32, SessionError>>,
    stop: Arc<AtomicBool>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err(SessionError::MediaAcquisition(
            "no audio input device available".to_string(),
        )));
        return;
    };

    let supported = match device.default_input_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            let _ = ready_tx.send(Err(SessionError::MediaAcquisition(format!(
                "could not read input configuration: {}",
                e
            ))));
            return;
        }
    };

    let device_rate = supported.sample_rate().0;
    let channels = supported.config().channels as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let err_fn = |e| error!("Microphone stream error: {}", e);
    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _| {
                    let _ = tx.send(audio::downmix_to_mono(data, channels));
                },
                err_fn,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _| {
                    let mono =
                        audio::downmix_to_mono(&audio::convert_i16_to_f32(data), channels);
                    let _ = tx.send(mono);
                },
                err_fn,
                None,
            )
        }
        other => {
            let _ = ready_tx.send(Err(SessionError::MediaAcquisition(format!(
                "unsupported input sample format: {:?}",
                other
            ))));
            return;
        }
    };

    // A denied microphone permission surfaces here as a build/play failure.
    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(SessionError::MediaAcquisition(e.to_string())));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(SessionError::MediaAcquisition(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(device_rate));
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }
    drop(stream);
    debug!("Microphone capture thread stopped");
}

/// Consumes captured samples, resamples to the track rate, and writes 20 ms
/// µ-law frames to the audio track.
async fn feed_track(
    track: Arc<TrackLocalStaticSample>,
    mut frame_rx: mpsc::UnboundedReceiver<Vec<f32>>,
    device_rate: u32,
) {
    let mut resampler =
        match audio::create_resampler(device_rate as f64, audio::TRACK_SAMPLE_RATE, 512) {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to create capture resampler: {}", e);
                return;
            }
        };

    let mut pending: Vec<f32> = Vec::new();
    let mut resampled: Vec<f32> = Vec::new();

    while let Some(chunk) = frame_rx.recv().await {
        pending.extend_from_slice(&chunk);

        let chunk_size = rubato::Resampler::input_frames_next(&mut resampler);
        while pending.len() >= chunk_size {
            let input: Vec<f32> = pending.drain(..chunk_size).collect();
            match rubato::Resampler::process(&mut resampler, &[input], None) {
                Ok(out) => resampled.extend_from_slice(&out[0]),
                Err(e) => warn!("Resampling failed, dropping chunk: {}", e),
            }
        }

        while resampled.len() >= audio::FRAME_SAMPLES {
            let frame: Vec<f32> = resampled.drain(..audio::FRAME_SAMPLES).collect();
            let encoded = audio::encode_ulaw(&audio::convert_f32_to_i16(&frame));
            let sample = Sample {
                data: Bytes::from(encoded),
                duration: Duration::from_millis(audio::FRAME_DURATION_MS),
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                debug!("Audio track closed, stopping feeder: {}", e);
                return;
            }
        }
    }
    debug!("Capture channel closed, feeder exiting");
}

/// A media source that acquires nothing and feeds silence-free frames. Used
/// for headless runs and tests where a capture device is unavailable.
#[derive(Default)]
pub struct NullMediaSource;

#[async_trait]
impl MediaSource for NullMediaSource {
    async fn open(
        &self,
        _track: Arc<TrackLocalStaticSample>,
    ) -> Result<MicrophoneHandle, SessionError> {
        Ok(MicrophoneHandle::detached())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microphone_handle_stop_is_idempotent() {
        let handle = MicrophoneHandle::detached();
        handle.stop();
        handle.stop();
        assert!(handle.stop.load(Ordering::SeqCst));
    }
}
