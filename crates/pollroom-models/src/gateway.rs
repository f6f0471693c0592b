//! Gateway wire protocol. Every frame, in either direction, is a JSON object
//! `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::poll::NewPoll;
use crate::wire;

pub const PARTICIPANTS_UPDATE: &str = "participantsUpdate";
pub const CHAT_MESSAGE: &str = "chatMessage";
pub const POLL_CREATED: &str = "pollCreated";
pub const POLL_RESULTS: &str = "pollResults";
pub const KICKED_OUT: &str = "kickedOut";

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "joinChat")]
    JoinChat(JoinChat),
    #[serde(rename = "chatMessage")]
    ChatMessage(ChatMessage),
    #[serde(rename = "kickOut")]
    KickOut(String),
    #[serde(rename = "createPoll")]
    CreatePoll(NewPoll),
    #[serde(rename = "submitAnswer")]
    SubmitAnswer(SubmitAnswer),
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::JoinChat(_) => "joinChat",
            ClientCommand::ChatMessage(_) => "chatMessage",
            ClientCommand::KickOut(_) => "kickOut",
            ClientCommand::CreatePoll(_) => "createPoll",
            ClientCommand::SubmitAnswer(_) => "submitAnswer",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinChat {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswer {
    #[serde(default)]
    pub username: String,
    #[serde(deserialize_with = "wire::string_or_number")]
    pub option: String,
    #[serde(default, deserialize_with = "wire::optional_string_or_number")]
    pub poll_id: Option<String>,
}

#[derive(Serialize)]
struct OutboundFrame<'a> {
    event: &'a str,
    data: &'a Value,
}

/// Encode a server event as a gateway text frame.
pub fn encode_frame(event: &str, data: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundFrame { event, data })
}
