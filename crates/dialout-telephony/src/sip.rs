//! Outbound SIP dialing through the LiveKit Twirp SIP service.
//!
//! The room client used elsewhere in this crate does not cover the SIP
//! service, so the dial call goes over the same Twirp HTTP surface
//! directly: a `CreateSIPParticipant` request authorized by an access
//! token carrying SIP grants. A rejected dial comes back as a Twirp
//! error whose metadata carries the SIP status of the far end; that
//! structure is preserved in [`TelephonyError::Dial`].

use crate::config::LiveKitConfig;
use crate::error::TelephonyError;
use livekit_api::access_token::{AccessToken, SIPGrants};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const CREATE_SIP_PARTICIPANT_PATH: &str = "/twirp/livekit.SIP/CreateSIPParticipant";

/// Token lifetime for a single dial request.
const DIAL_TOKEN_TTL: Duration = Duration::from_secs(600);

/// One outbound SIP leg request.
#[derive(Debug, Clone, Serialize)]
pub struct DialRequest {
    /// Media room the new leg joins.
    pub room_name: String,
    /// Phone number to dial.
    pub sip_call_to: String,
    /// Participant identity assigned to the leg.
    pub participant_identity: String,
    /// Display name for the leg, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    /// DTMF digits to send once the call connects (extension dialing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtmf: Option<String>,
    /// Suspend the request until the callee answers or the attempt
    /// fails, instead of returning as soon as dialing starts.
    pub wait_until_answered: bool,
    /// Play a dial tone into the room while the far end rings.
    pub play_dialtone: bool,
}

impl DialRequest {
    pub fn new(
        room_name: impl Into<String>,
        number: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            room_name: room_name.into(),
            sip_call_to: number.into(),
            participant_identity: identity.into(),
            participant_name: None,
            dtmf: None,
            wait_until_answered: true,
            play_dialtone: false,
        }
    }
}

/// Wire form of the request, including the trunk the dialer fills in.
#[derive(Debug, Serialize)]
struct CreateSipParticipantBody<'a> {
    sip_trunk_id: &'a str,
    #[serde(flatten)]
    request: &'a DialRequest,
}

/// The SIP leg as reported by the gateway once the dial request
/// resolves.
#[derive(Debug, Clone, Deserialize)]
pub struct SipParticipant {
    #[serde(default, alias = "participantId")]
    pub participant_id: String,
    #[serde(default, alias = "participantIdentity")]
    pub participant_identity: String,
    #[serde(default, alias = "roomName")]
    pub room_name: String,
    #[serde(default, alias = "sipCallId")]
    pub sip_call_id: String,
}

/// Twirp error body returned on a failed dial.
#[derive(Debug, Deserialize)]
struct TwirpErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    meta: HashMap<String, String>,
}

/// Places outbound SIP legs.
#[derive(Debug)]
pub struct SipDialer {
    config: LiveKitConfig,
    client: reqwest::Client,
}

impl SipDialer {
    pub fn new(config: LiveKitConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Dials `request` through the configured trunk.
    ///
    /// With `wait_until_answered` set the future resolves only once the
    /// callee answers or the gateway gives up; this is the single
    /// synchronization point that decides whether a call proceeds.
    pub async fn create_sip_participant(
        &self,
        request: &DialRequest,
    ) -> Result<SipParticipant, TelephonyError> {
        if self.config.sip_trunk_id.is_empty() {
            return Err(TelephonyError::Config(
                "sip_trunk_id is required for outbound dialing".to_string(),
            ));
        }

        let token = self.dial_token()?;
        let url = format!("{}{}", self.config.http_url(), CREATE_SIP_PARTICIPANT_PATH);
        let body = CreateSipParticipantBody {
            sip_trunk_id: &self.config.sip_trunk_id,
            request,
        };

        tracing::debug!(
            room = %request.room_name,
            identity = %request.participant_identity,
            wait_until_answered = request.wait_until_answered,
            "issuing CreateSIPParticipant"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(parse_dial_error(status.as_u16(), &text));
        }

        let participant: SipParticipant = serde_json::from_str(&text).map_err(|e| {
            TelephonyError::RoomService(format!("malformed CreateSIPParticipant response: {e}"))
        })?;
        Ok(participant)
    }

    fn dial_token(&self) -> Result<String, TelephonyError> {
        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity("dialout-worker")
            .with_ttl(DIAL_TOKEN_TTL)
            .with_sip_grants(SIPGrants {
                admin: true,
                call: true,
            });
        Ok(token.to_jwt()?)
    }
}

/// Converts a Twirp error response into a structured dial error.
///
/// The gateway reports the far end's SIP status in the error metadata
/// (`sip_status_code`, `sip_status`); both are optional because
/// transport-level rejections carry neither.
fn parse_dial_error(http_status: u16, body: &str) -> TelephonyError {
    match serde_json::from_str::<TwirpErrorBody>(body) {
        Ok(twirp) => {
            let sip_status_code = twirp
                .meta
                .get("sip_status_code")
                .and_then(|v| v.parse::<u16>().ok());
            let sip_status = twirp.meta.get("sip_status").cloned();
            let message = if twirp.msg.is_empty() {
                format!("gateway returned http {http_status} ({})", twirp.code)
            } else {
                twirp.msg
            };
            TelephonyError::Dial {
                sip_status_code,
                sip_status,
                message,
            }
        }
        Err(_) => TelephonyError::Dial {
            sip_status_code: None,
            sip_status: None,
            message: format!("gateway returned http {http_status}: {body}"),
        },
    }
}
