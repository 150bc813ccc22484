//! LiveKit gateway configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

fn default_callee_identity() -> String {
    dialout_types::DEFAULT_CALLEE_IDENTITY.to_string()
}

fn default_transfer_identity() -> String {
    dialout_types::DEFAULT_TRANSFER_IDENTITY.to_string()
}

/// Connection settings for the LiveKit server and its SIP gateway.
#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    /// Server URL (`http(s)://` or `ws(s)://`).
    pub url: String,
    /// API key for server-side calls.
    pub api_key: String,
    /// API secret for server-side calls.
    #[serde(skip_serializing)]
    pub api_secret: String,
    /// SIP trunk to place outbound calls through.
    pub sip_trunk_id: String,
    /// Participant identity assigned to the dialed callee.
    #[serde(default = "default_callee_identity")]
    pub callee_identity: String,
    /// Participant identity assigned to a transfer leg.
    #[serde(default = "default_transfer_identity")]
    pub transfer_identity: String,
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        sip_trunk_id: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            sip_trunk_id: sip_trunk_id.into(),
            callee_identity: default_callee_identity(),
            transfer_identity: default_transfer_identity(),
        }
    }

    /// Returns the server URL with an `http(s)` scheme, as required by
    /// the Twirp endpoints. WebSocket URLs are rewritten.
    pub fn http_url(&self) -> String {
        if let Some(rest) = self.url.strip_prefix("ws://") {
            format!("http://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("wss://") {
            format!("https://{rest}")
        } else {
            self.url.clone()
        }
    }
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            sip_trunk_id: String::new(),
            callee_identity: default_callee_identity(),
            transfer_identity: default_transfer_identity(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("sip_trunk_id", &self.sip_trunk_id)
            .field("callee_identity", &self.callee_identity)
            .field("transfer_identity", &self.transfer_identity)
            .finish()
    }
}
