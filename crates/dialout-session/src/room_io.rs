//! Audio bridge between the agent and the media room.
//!
//! In a production deployment this wraps a `livekit::Room` connection
//! and its local audio track; here the transport is a pair of broadcast
//! channels with the same shape, which the worker's room bridge (and
//! tests) feed directly. Frames are raw s16le PCM.

use crate::error::SessionError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the inbound/outbound audio frame channels.
const AUDIO_CHANNEL_CAPACITY: usize = 256;

/// Playout sample rate for synthesized speech (s16le mono).
const PLAYOUT_SAMPLE_RATE: u32 = 22_050;

/// Estimated wall-clock playout time of an s16le PCM buffer.
pub fn playout_duration(pcm_len: usize) -> Duration {
    // 2 bytes per sample at the playout rate.
    Duration::from_secs_f64(pcm_len as f64 / (PLAYOUT_SAMPLE_RATE as f64 * 2.0))
}

/// The agent's audio connection to one call's media room.
#[derive(Debug)]
pub struct RoomAudioClient {
    room_name: String,
    agent_identity: String,
    connected: AtomicBool,
    inbound_tx: broadcast::Sender<Vec<u8>>,
    outbound_tx: broadcast::Sender<Vec<u8>>,
}

impl RoomAudioClient {
    /// Connects the agent to the room.
    pub fn connect(room_name: impl Into<String>, agent_identity: impl Into<String>) -> Self {
        let (inbound_tx, _) = broadcast::channel(AUDIO_CHANNEL_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(AUDIO_CHANNEL_CAPACITY);
        let client = Self {
            room_name: room_name.into(),
            agent_identity: agent_identity.into(),
            connected: AtomicBool::new(true),
            inbound_tx,
            outbound_tx,
        };
        tracing::info!(
            room = %client.room_name,
            identity = %client.agent_identity,
            "agent connected to room"
        );
        client
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn agent_identity(&self) -> &str {
        &self.agent_identity
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Publishes synthesized agent speech into the room.
    pub fn publish_audio(&self, pcm: &[u8]) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::Room(
                "agent is not connected to a room".to_string(),
            ));
        }
        tracing::debug!(
            room = %self.room_name,
            bytes = pcm.len(),
            "publishing agent audio"
        );
        // No subscribers just means nobody is recording the outbound
        // side; playout still proceeds.
        let _ = self.outbound_tx.send(pcm.to_vec());
        Ok(())
    }

    /// Feeds one frame of callee audio into the session pipeline. Called
    /// by the room bridge as remote frames arrive.
    pub fn push_inbound(&self, pcm: &[u8]) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::Room(
                "agent is not connected to a room".to_string(),
            ));
        }
        let _ = self.inbound_tx.send(pcm.to_vec());
        Ok(())
    }

    /// Subscribes to inbound callee audio frames.
    pub fn subscribe_inbound(&self) -> broadcast::Receiver<Vec<u8>> {
        self.inbound_tx.subscribe()
    }

    /// Subscribes to published agent audio frames.
    pub fn subscribe_outbound(&self) -> broadcast::Receiver<Vec<u8>> {
        self.outbound_tx.subscribe()
    }

    /// Disconnects the agent from the room. Further publishes fail.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::info!(room = %self.room_name, "agent disconnected from room");
        }
    }
}
