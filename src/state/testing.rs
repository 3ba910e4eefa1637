//! In-memory transport for unit tests.

use std::collections::VecDeque;
use url::Url;

use super::connection::{Transport, TransportEvent};
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Open(String),
    Send(String),
    Close,
}

/// Records every call and replays queued inbound events.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub ops: Vec<Op>,
    pub inbound: VecDeque<TransportEvent>,
    /// Number of upcoming `open` calls to refuse.
    pub refuse_opens: u32,
    pub fail_sends: bool,
}

impl ScriptedTransport {
    pub fn push_frame(&mut self, text: impl Into<String>) {
        self.inbound.push_back(TransportEvent::Frame(text.into()));
    }

    pub fn push_json(&mut self, value: serde_json::Value) {
        self.push_frame(value.to_string());
    }

    pub fn push_close(&mut self, reason: &str) {
        self.inbound.push_back(TransportEvent::Closed {
            reason: reason.to_string(),
        });
    }

    pub fn opens(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Open(_)))
            .count()
    }

    pub fn sent(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Send(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self, url: &Url) -> Result<(), TransportError> {
        self.ops.push(Op::Open(url.to_string()));
        if self.refuse_opens > 0 {
            self.refuse_opens -= 1;
            return Err(TransportError::Refused("scripted refusal".into()));
        }
        Ok(())
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Closed);
        }
        self.ops.push(Op::Send(text.to_string()));
        Ok(())
    }

    fn close(&mut self) {
        self.ops.push(Op::Close);
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        self.inbound.drain(..).collect()
    }
}
