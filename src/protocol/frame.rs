use std::fmt;
use std::str::FromStr;

use tokio::sync::mpsc;

use crate::error::Error;

/// Sending half of the inbound frame queue, handed to the interception server.
pub type FrameSender = mpsc::UnboundedSender<WireFrame>;
/// Receiving half of the inbound frame queue, polled by the orchestration loop.
pub type FrameReceiver = mpsc::UnboundedReceiver<WireFrame>;

pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::unbounded_channel()
}

/// Lifecycle tag of an intercepted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Start,
    Message,
    End,
}

impl FromStr for FrameKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "START" => Ok(Self::Start),
            "MESSAGE" => Ok(Self::Message),
            "END" => Ok(Self::End),
            _ => Err(Error::UnknownFrameKind(s.to_string())),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::Message => "MESSAGE",
            Self::End => "END",
        };
        f.write_str(name)
    }
}

/// One unit of intercepted traffic for a flow.
///
/// Only `Message` frames carry a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub flow_id: String,
    pub kind: FrameKind,
    pub payload: Option<Vec<u8>>,
}

impl WireFrame {
    pub fn start(flow_id: impl Into<String>) -> Self {
        Self { flow_id: flow_id.into(), kind: FrameKind::Start, payload: None }
    }

    pub fn message(flow_id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            flow_id: flow_id.into(),
            kind: FrameKind::Message,
            payload: Some(payload.into()),
        }
    }

    pub fn end(flow_id: impl Into<String>) -> Self {
        Self { flow_id: flow_id.into(), kind: FrameKind::End, payload: None }
    }
}
