//! Dependent subsystems started and stopped by the orchestrator
//!
//! Packet capture, process injection and the browser frontend are external.
//! [`ReplayInterceptor`] stands in for a live capture by replaying a
//! JSON-lines file.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{FrameKind, FrameSender, WireFrame};

/// Interception server feeding the frame queue
pub trait Interceptor: Send {
    fn start(&mut self, frames: FrameSender) -> Result<()>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

/// Helper that redirects the game client's traffic to the interceptor
pub trait Injector: Send {
    fn start(&mut self, process_name: &str, port: u16) -> Result<()>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

/// Browser frontend hosting the game page and the overlay
pub trait Frontend: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;

    /// Page is loaded and not showing an error or loading screen
    fn is_page_normal(&self) -> bool;
    fn is_overlay_working(&self) -> bool;
    fn start_overlay(&mut self) -> Result<()>;
    fn stop_overlay(&mut self);
}

#[derive(Deserialize)]
struct CaptureLine {
    flow_id: String,
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

impl CaptureLine {
    fn into_frame(self) -> Result<WireFrame> {
        let kind: FrameKind = self.kind.parse()?;
        let payload = match (kind, self.payload) {
            (FrameKind::Message, Some(Value::String(s))) => Some(s.into_bytes()),
            (FrameKind::Message, Some(v)) => {
                Some(serde_json::to_vec(&v).map_err(|e| Error::Decode(e.to_string()))?)
            }
            _ => None,
        };
        Ok(WireFrame { flow_id: self.flow_id, kind, payload })
    }
}

/// Replays a recorded capture into the frame queue on start
#[derive(Debug, Default)]
pub struct ReplayInterceptor {
    frames: Vec<WireFrame>,
    running: bool,
}

impl ReplayInterceptor {
    pub fn from_frames(frames: Vec<WireFrame>) -> Self {
        Self { frames, running: false }
    }

    /// Load a capture where each line is `{"flow_id", "kind", "payload"}`.
    /// Blank and malformed lines are skipped with a warning.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_frames(parse_capture(&text)))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn parse_capture(text: &str) -> Vec<WireFrame> {
    let mut frames = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let frame = serde_json::from_str::<CaptureLine>(line)
            .map_err(|e| Error::Decode(e.to_string()))
            .and_then(CaptureLine::into_frame);
        match frame {
            Ok(frame) => frames.push(frame),
            Err(e) => warn!(line = lineno + 1, "skipping capture line: {}", e),
        }
    }
    frames
}

impl Interceptor for ReplayInterceptor {
    fn start(&mut self, frames: FrameSender) -> Result<()> {
        info!(frames = self.frames.len(), "replay interceptor starting");
        for frame in &self.frames {
            frames.send(frame.clone()).map_err(|_| Error::ChannelClosed)?;
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        debug!("replay interceptor stopped");
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
