//! OpenAI-style chat completion client with intent recognition.
//!
//! The model is given one tool definition per [`AgentIntent`] variant;
//! a tool call in the response maps back onto the closed intent set. A
//! tool name or argument shape the worker does not know is logged and
//! dropped rather than invoked — there is no open-ended dispatch.

use crate::error::SessionError;
use crate::pipeline::{AgentReply, ChatMessage, LanguageModel};
use async_trait::async_trait;
use dialout_types::AgentIntent;
use serde::Deserialize;
use serde_json::{json, Value};

/// Chat completion client for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAiChatModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn request_body(&self, history: &[ChatMessage]) -> Value {
        let messages: Vec<Value> = history
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();
        json!({
            "model": self.model,
            "messages": messages,
            "tools": intent_tools(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn respond(&self, history: &[ChatMessage]) -> Result<AgentReply, SessionError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(history))
            .send()
            .await
            .map_err(|e| SessionError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SessionError::Llm(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(SessionError::Llm(format!(
                "endpoint returned http {status}: {text}"
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| SessionError::Llm(format!("malformed response: {e}")))?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(SessionError::Llm("response contained no choices".to_string()));
        };

        let mut reply = AgentReply {
            say: choice
                .message
                .content
                .filter(|content| !content.trim().is_empty()),
            intents: Vec::new(),
        };
        for call in choice.message.tool_calls {
            match parse_tool_call(&call.function.name, &call.function.arguments) {
                Some(intent) => reply.intents.push(intent),
                None => tracing::warn!(
                    tool = %call.function.name,
                    "model invoked an unknown tool; dropping"
                ),
            }
        }
        Ok(reply)
    }
}

/// Tool definitions offered to the model, one per intent variant.
fn intent_tools() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "end_call",
                "description": "Called when the user wants to end the call",
                "parameters": {"type": "object", "properties": {}}
            }
        },
        {
            "type": "function",
            "function": {
                "name": "transfer_call",
                "description": "Called when the user asks to speak with a human agent",
                "parameters": {"type": "object", "properties": {}}
            }
        },
        {
            "type": "function",
            "function": {
                "name": "look_up_availability",
                "description": "Look up available appointment times on a date",
                "parameters": {
                    "type": "object",
                    "properties": {"date": {"type": "string"}},
                    "required": ["date"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "confirm_appointment",
                "description": "Confirm an appointment on a date at a time",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "date": {"type": "string"},
                        "time": {"type": "string"}
                    },
                    "required": ["date", "time"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "detected_answering_machine",
                "description": "Called when the call went to voicemail",
                "parameters": {"type": "object", "properties": {}}
            }
        }
    ])
}

/// Maps a tool call back onto the closed intent set. Returns `None` for
/// unknown names or argument shapes.
fn parse_tool_call(name: &str, arguments: &str) -> Option<AgentIntent> {
    #[derive(Deserialize)]
    struct DateArg {
        date: String,
    }
    #[derive(Deserialize)]
    struct DateTimeArgs {
        date: String,
        time: String,
    }

    match name {
        "end_call" => Some(AgentIntent::EndCall),
        "transfer_call" => Some(AgentIntent::TransferCall),
        "detected_answering_machine" => Some(AgentIntent::DetectedAnsweringMachine),
        "look_up_availability" => serde_json::from_str::<DateArg>(arguments)
            .ok()
            .map(|args| AgentIntent::LookUpAvailability { date: args.date }),
        "confirm_appointment" => {
            serde_json::from_str::<DateTimeArgs>(arguments)
                .ok()
                .map(|args| AgentIntent::ConfirmAppointment {
                    date: args.date,
                    time: args.time,
                })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tool_calls() {
        assert_eq!(parse_tool_call("end_call", ""), Some(AgentIntent::EndCall));
        assert_eq!(
            parse_tool_call("transfer_call", "{}"),
            Some(AgentIntent::TransferCall)
        );
        assert_eq!(
            parse_tool_call("confirm_appointment", r#"{"date":"tuesday","time":"3pm"}"#),
            Some(AgentIntent::ConfirmAppointment {
                date: "tuesday".to_string(),
                time: "3pm".to_string()
            })
        );
        assert_eq!(
            parse_tool_call("look_up_availability", r#"{"date":"friday"}"#),
            Some(AgentIntent::LookUpAvailability {
                date: "friday".to_string()
            })
        );
    }

    #[test]
    fn drops_unknown_or_malformed_tool_calls() {
        assert_eq!(parse_tool_call("open_pod_bay_doors", "{}"), None);
        assert_eq!(parse_tool_call("confirm_appointment", r#"{"date":"x"}"#), None);
        assert_eq!(parse_tool_call("look_up_availability", "not json"), None);
    }

    #[test]
    fn every_offered_tool_is_parseable() {
        let tools = intent_tools();
        let names: Vec<&str> = tools
            .as_array()
            .expect("tools should be an array")
            .iter()
            .map(|t| t["function"]["name"].as_str().expect("name"))
            .collect();
        assert_eq!(names.len(), 5);
        for name in names {
            let args = match name {
                "look_up_availability" => r#"{"date":"d"}"#,
                "confirm_appointment" => r#"{"date":"d","time":"t"}"#,
                _ => "{}",
            };
            assert!(
                parse_tool_call(name, args).is_some(),
                "offered tool '{name}' must map to an intent"
            );
        }
    }
}
