//! The dialing API seam consumed by the orchestrator.

use crate::config::LiveKitConfig;
use crate::error::TelephonyError;
use crate::rooms::RoomService;
use crate::sip::{DialRequest, SipDialer, SipParticipant};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Everything the call orchestrator needs from the telephony layer.
///
/// Production uses [`LiveKitTelephony`]; tests substitute in-memory
/// fakes. The trait is deliberately narrow — it is the boundary at which
/// raw transport errors stop propagating upward.
#[async_trait]
pub trait DialingApi: Send + Sync {
    /// Creates the media room for a call.
    async fn create_room(&self, name: &str) -> Result<(), TelephonyError>;

    /// Places an outbound SIP leg. With `wait_until_answered` set, the
    /// future suspends until the callee answers or the attempt fails.
    async fn dial(&self, request: &DialRequest) -> Result<SipParticipant, TelephonyError>;

    /// Returns a participant's attribute bag, or `None` while the
    /// participant is not visible in the room.
    async fn participant_attributes(
        &self,
        room: &str,
        identity: &str,
    ) -> Result<Option<HashMap<String, String>>, TelephonyError>;

    /// Waits for a participant to become visible in the room.
    async fn wait_for_participant(
        &self,
        room: &str,
        identity: &str,
        poll_interval: Duration,
        budget: Duration,
    ) -> Result<(), TelephonyError> {
        let started = tokio::time::Instant::now();
        loop {
            if self.participant_attributes(room, identity).await?.is_some() {
                return Ok(());
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

    /// Removes a single participant from the room.
    async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), TelephonyError>;

    /// Deletes the media room. Must be idempotent: a second delete of
    /// the same room is not a hard failure.
    async fn delete_room(&self, room: &str) -> Result<(), TelephonyError>;
}

/// Production dialing API over the LiveKit server: room operations via
/// the room client, SIP legs via the Twirp SIP service.
#[derive(Debug)]
pub struct LiveKitTelephony {
    rooms: RoomService,
    dialer: SipDialer,
}

impl LiveKitTelephony {
    pub fn new(config: LiveKitConfig) -> Self {
        let rooms = RoomService::new(&config);
        let dialer = SipDialer::new(config);
        Self { rooms, dialer }
    }
}

#[async_trait]
impl DialingApi for LiveKitTelephony {
    async fn create_room(&self, name: &str) -> Result<(), TelephonyError> {
        self.rooms.create_room(name).await
    }

    async fn dial(&self, request: &DialRequest) -> Result<SipParticipant, TelephonyError> {
        self.dialer.create_sip_participant(request).await
    }

    async fn participant_attributes(
        &self,
        room: &str,
        identity: &str,
    ) -> Result<Option<HashMap<String, String>>, TelephonyError> {
        self.rooms.participant_attributes(room, identity).await
    }

    async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), TelephonyError> {
        self.rooms.remove_participant(room, identity).await
    }

    async fn delete_room(&self, room: &str) -> Result<(), TelephonyError> {
        self.rooms.delete_room(room).await
    }
}
