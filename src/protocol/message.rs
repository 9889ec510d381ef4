//! Decoded application messages and the parser contract
//!
//! The byte-level decoder lives outside this crate. Anything that can turn
//! a raw payload into `{id, type, method, data}` plugs in through
//! [`ProtocolParser`]; [`JsonParser`] covers captures stored as JSON.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Message direction/kind as reported by the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MsgType {
    Request,
    Response,
    Notify,
}

impl FromStr for MsgType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "REQUEST" | "REQ" => Ok(Self::Request),
            "RESPONSE" | "RES" => Ok(Self::Response),
            "NOTIFY" => Ok(Self::Notify),
            other => Err(Error::Decode(format!("unknown message type {:?}", other))),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "REQUEST",
            Self::Response => "RESPONSE",
            Self::Notify => "NOTIFY",
        };
        f.write_str(name)
    }
}

/// A structured message decoded from a MESSAGE frame. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub id: i64,
    #[serde(rename = "type")]
    pub msg_type: MsgType,
    pub method: String,
    pub data: Value,
}

impl DecodedMessage {
    pub fn new(id: i64, msg_type: MsgType, method: impl Into<String>, data: Value) -> Self {
        Self { id, msg_type, method: method.into(), data }
    }

    /// Single-line JSON rendering for debug logs
    pub fn compact_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!("<failed to dump message: {}>", e))
    }
}

/// Decodes a raw frame payload into a [`DecodedMessage`]
pub trait ProtocolParser: Send {
    fn decode(&mut self, payload: &[u8]) -> Result<DecodedMessage>;
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default = "notify_id")]
    id: i64,
    #[serde(rename = "type")]
    msg_type: String,
    method: String,
    #[serde(default)]
    data: Value,
}

fn notify_id() -> i64 {
    -1
}

/// Parser for payloads that already hold the decoded message as JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolParser for JsonParser {
    fn decode(&mut self, payload: &[u8]) -> Result<DecodedMessage> {
        let raw: RawMessage = serde_json::from_slice(payload)
            .map_err(|e| Error::Decode(e.to_string()))?;
        let msg_type = raw.msg_type.parse()?;
        Ok(DecodedMessage {
            id: raw.id,
            msg_type,
            method: raw.method,
            data: raw.data,
        })
    }
}
