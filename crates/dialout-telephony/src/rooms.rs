//! Room lifecycle and participant management over the LiveKit room
//! service.

use crate::config::LiveKitConfig;
use crate::error::TelephonyError;
use livekit_api::services::room::{CreateRoomOptions, RoomClient};
use livekit_protocol::ParticipantInfo;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Server-side room operations for one call's media room.
#[derive(Debug)]
pub struct RoomService {
    room_client: RoomClient,
}

impl RoomService {
    pub fn new(config: &LiveKitConfig) -> Self {
        let room_client =
            RoomClient::with_api_key(&config.http_url(), &config.api_key, &config.api_secret);
        Self { room_client }
    }

    /// Creates the media room for a call.
    pub async fn create_room(&self, name: &str) -> Result<(), TelephonyError> {
        self.room_client
            .create_room(name, CreateRoomOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| TelephonyError::RoomService(e.to_string()))
    }

    /// Deletes the media room, disconnecting every remaining participant.
    ///
    /// Idempotent: deleting a room that is already gone is not an error,
    /// so teardown paths can run without first checking whether another
    /// path got there first.
    pub async fn delete_room(&self, name: &str) -> Result<(), TelephonyError> {
        match self.room_client.delete_room(name).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                let lower = msg.to_lowercase();
                if lower.contains("not found") || lower.contains("does not exist") {
                    tracing::debug!(room = name, "room already deleted");
                    Ok(())
                } else {
                    Err(TelephonyError::RoomService(msg))
                }
            }
        }
    }

    /// Removes a single participant from the room.
    pub async fn remove_participant(
        &self,
        room: &str,
        identity: &str,
    ) -> Result<(), TelephonyError> {
        self.room_client
            .remove_participant(room, identity)
            .await
            .map_err(|e| TelephonyError::RoomService(e.to_string()))
    }

    /// Lists the participants currently in the room. An unknown room
    /// reports no participants rather than an error, matching the
    /// behavior while a call is being torn down.
    pub async fn list_participants(
        &self,
        room: &str,
    ) -> Result<Vec<ParticipantInfo>, TelephonyError> {
        match self.room_client.list_participants(room).await {
            Ok(participants) => Ok(participants),
            Err(_) => Ok(Vec::new()),
        }
    }

    /// Returns the attribute bag of one participant, or `None` while the
    /// participant is not (yet) visible in the room.
    pub async fn participant_attributes(
        &self,
        room: &str,
        identity: &str,
    ) -> Result<Option<HashMap<String, String>>, TelephonyError> {
        let participants = self.list_participants(room).await?;
        Ok(participants
            .into_iter()
            .find(|p| p.identity == identity)
            .map(|p| p.attributes))
    }

    /// Waits for a participant to become visible in the room, polling at
    /// `poll_interval` up to `budget`.
    pub async fn wait_for_participant(
        &self,
        room: &str,
        identity: &str,
        poll_interval: Duration,
        budget: Duration,
    ) -> Result<ParticipantInfo, TelephonyError> {
        let started = Instant::now();
        loop {
            let participants = self.list_participants(room).await?;
            if let Some(participant) = participants.into_iter().find(|p| p.identity == identity) {
                return Ok(participant);
            }
            if started.elapsed() >= budget {
                return Err(TelephonyError::JoinTimeout {
                    room: room.to_string(),
                    identity: identity.to_string(),
                    waited_ms: budget.as_millis() as u64,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
