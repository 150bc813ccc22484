//! Shared fakes for worker integration tests: an in-memory dialing API
//! with scriptable callee behavior, and scripted pipeline services.
#![allow(dead_code)] // each test binary uses a different subset

use async_trait::async_trait;
use dialout_session::{
    AgentReply, ChatMessage, EnergyVad, LanguageModel, PipelineServices, SessionError,
    SpeechToText, TextToSpeech,
};
use dialout_telephony::{DialRequest, DialingApi, SipParticipant, TelephonyError};
use dialout_types::SIP_CALL_STATUS_ATTRIBUTE;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a scripted dial attempt behaves.
#[derive(Debug, Clone)]
pub enum DialBehavior {
    /// Resolves successfully after the delay.
    Answer { after: Duration },
    /// Rejected with a structured SIP status after a short delay.
    Reject {
        sip_status_code: u16,
        sip_status: &'static str,
    },
    /// Never resolves (the far end rings forever).
    Never,
}

struct FakeState {
    rooms: Vec<String>,
    deleted_rooms: Vec<String>,
    removed_participants: Vec<(String, String)>,
    dials: Vec<DialRequest>,
    callee_dial: DialBehavior,
    transfer_dial: DialBehavior,
    /// Status attribute snapshots returned for the callee, one per
    /// poll; the last entry repeats. `None` = participant not visible.
    callee_statuses: VecDeque<Option<&'static str>>,
    callee_visible: bool,
    transfer_joins: bool,
    transfer_visible: bool,
    remove_fails: bool,
}

/// In-memory dialing API with scriptable behavior per leg.
pub struct FakeTelephony {
    callee_identity: String,
    transfer_identity: String,
    state: Mutex<FakeState>,
}

impl FakeTelephony {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            callee_identity: "phone_user".to_string(),
            transfer_identity: "transfer_user".to_string(),
            state: Mutex::new(FakeState {
                rooms: Vec::new(),
                deleted_rooms: Vec::new(),
                removed_participants: Vec::new(),
                dials: Vec::new(),
                callee_dial: DialBehavior::Answer {
                    after: Duration::from_millis(50),
                },
                transfer_dial: DialBehavior::Answer {
                    after: Duration::from_millis(20),
                },
                callee_statuses: VecDeque::new(),
                callee_visible: false,
                transfer_joins: true,
                transfer_visible: false,
                remove_fails: false,
            }),
        })
    }

    pub fn set_callee_dial(&self, behavior: DialBehavior) {
        self.state.lock().unwrap().callee_dial = behavior;
    }

    pub fn set_transfer_dial(&self, behavior: DialBehavior) {
        self.state.lock().unwrap().transfer_dial = behavior;
    }

    /// Scripts the callee's `sip.callStatus` attribute per poll; the
    /// last entry repeats forever.
    pub fn script_callee_statuses(&self, statuses: Vec<Option<&'static str>>) {
        self.state.lock().unwrap().callee_statuses = statuses.into();
    }

    pub fn set_transfer_joins(&self, joins: bool) {
        self.state.lock().unwrap().transfer_joins = joins;
    }

    pub fn set_remove_fails(&self, fails: bool) {
        self.state.lock().unwrap().remove_fails = fails;
    }

    pub fn deleted_rooms(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_rooms.clone()
    }

    pub fn removed_participants(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().removed_participants.clone()
    }

    pub fn dials(&self) -> Vec<DialRequest> {
        self.state.lock().unwrap().dials.clone()
    }

    fn status_attrs(value: &str) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert(SIP_CALL_STATUS_ATTRIBUTE.to_string(), value.to_string());
        attrs
    }
}

#[async_trait]
impl DialingApi for FakeTelephony {
    async fn create_room(&self, name: &str) -> Result<(), TelephonyError> {
        self.state.lock().unwrap().rooms.push(name.to_string());
        Ok(())
    }

    async fn dial(&self, request: &DialRequest) -> Result<SipParticipant, TelephonyError> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.dials.push(request.clone());
            if request.participant_identity == self.transfer_identity {
                state.transfer_dial.clone()
            } else {
                state.callee_dial.clone()
            }
        };

        match behavior {
            DialBehavior::Answer { after } => {
                tokio::time::sleep(after).await;
                let mut state = self.state.lock().unwrap();
                if request.participant_identity == self.transfer_identity {
                    state.transfer_visible = state.transfer_joins;
                } else {
                    state.callee_visible = true;
                }
                Ok(SipParticipant {
                    participant_id: format!("PA_{}", request.participant_identity),
                    participant_identity: request.participant_identity.clone(),
                    room_name: request.room_name.clone(),
                    sip_call_id: "SCL_fake".to_string(),
                })
            }
            DialBehavior::Reject {
                sip_status_code,
                sip_status,
            } => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(TelephonyError::Dial {
                    sip_status_code: Some(sip_status_code),
                    sip_status: Some(sip_status.to_string()),
                    message: "call rejected".to_string(),
                })
            }
            DialBehavior::Never => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("never-answering dial should have been cancelled")
            }
        }
    }

    async fn participant_attributes(
        &self,
        _room: &str,
        identity: &str,
    ) -> Result<Option<HashMap<String, String>>, TelephonyError> {
        let mut state = self.state.lock().unwrap();
        if identity == self.transfer_identity {
            return Ok(state.transfer_visible.then(HashMap::new));
        }

        // Callee: consume the scripted status progression.
        let scripted = if state.callee_statuses.len() > 1 {
            state.callee_statuses.pop_front().unwrap_or(None)
        } else {
            state.callee_statuses.front().copied().flatten()
        };
        match scripted {
            Some(value) => Ok(Some(Self::status_attrs(value))),
            None => {
                if state.callee_visible {
                    Ok(Some(Self::status_attrs("active")))
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), TelephonyError> {
        let mut state = self.state.lock().unwrap();
        if state.remove_fails {
            return Err(TelephonyError::RoomService(
                "remove_participant failed".to_string(),
            ));
        }
        state
            .removed_participants
            .push((room.to_string(), identity.to_string()));
        Ok(())
    }

    async fn delete_room(&self, room: &str) -> Result<(), TelephonyError> {
        self.state
            .lock()
            .unwrap()
            .deleted_rooms
            .push(room.to_string());
        Ok(())
    }
}

// ── pipeline fakes ───────────────────────────────────────────────────

/// Returns each scripted transcript once; silent afterwards.
pub struct ScriptedStt {
    transcripts: Mutex<VecDeque<String>>,
}

impl ScriptedStt {
    pub fn new(transcripts: Vec<&str>) -> Self {
        Self {
            transcripts: Mutex::new(transcripts.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl SpeechToText for ScriptedStt {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, SessionError> {
        Ok(self
            .transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

/// Produces fixed-size PCM for every line.
pub struct FixedTts {
    pub pcm_len: usize,
}

#[async_trait]
impl TextToSpeech for FixedTts {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SessionError> {
        Ok(vec![0u8; self.pcm_len])
    }
}

/// Returns each scripted reply once; empty replies afterwards.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<AgentReply>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<AgentReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn respond(&self, _history: &[ChatMessage]) -> Result<AgentReply, SessionError> {
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Builds pipeline services from scripted transcripts and replies.
pub fn scripted_pipeline(transcripts: Vec<&str>, replies: Vec<AgentReply>) -> PipelineServices {
    PipelineServices {
        stt: Arc::new(ScriptedStt::new(transcripts)),
        tts: Arc::new(FixedTts { pcm_len: 441 }),
        llm: Arc::new(ScriptedLlm::new(replies)),
        vad: Arc::new(EnergyVad::default()),
    }
}

/// A frame of loud (speech-classified) s16le audio.
pub fn speech_frame() -> Vec<u8> {
    let mut frame = Vec::with_capacity(320);
    for _ in 0..160 {
        frame.extend_from_slice(&8000i16.to_le_bytes());
    }
    frame
}
