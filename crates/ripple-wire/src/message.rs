//! Envelopes and line codec
//!
//! Every envelope is a single line of JSON:
//! `{"src": "c1", "dest": "n1", "body": {"type": "read", "msg_id": 1}}`

use serde::{Deserialize, Serialize};

use ripple_core::{MsgId, NodeId, RippleError, RippleResult};

use crate::{Body, Payload};

/// Complete envelope
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Body,
}

impl Message {
    /// Create an envelope with no correlation ids
    pub fn new(src: NodeId, dest: NodeId, payload: Payload) -> Self {
        Message {
            src,
            dest,
            body: Body::new(payload),
        }
    }

    /// Build the response to this message
    pub fn reply(&self, payload: Payload) -> Message {
        Message {
            src: self.dest.clone(),
            dest: self.src.clone(),
            body: Body::new(payload).in_reply_to(self.body.msg_id),
        }
    }

    /// Build an error response to this message
    pub fn error_reply(&self, err: &RippleError) -> Message {
        self.reply(Payload::from(err))
    }

    #[inline]
    pub fn msg_id(&self) -> Option<MsgId> {
        self.body.msg_id
    }

    /// The sender is waiting for an answer
    #[inline]
    pub fn expects_reply(&self) -> bool {
        self.body.msg_id.is_some()
    }

    /// This message completes an earlier request of ours
    pub fn is_response(&self) -> bool {
        self.body.in_reply_to.is_some() && self.body.payload.is_reply()
    }

    /// Encode as a single line (no trailing newline)
    pub fn encode_line(&self) -> RippleResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Envelope whose body has not been decoded yet
#[derive(Debug, Deserialize)]
struct RawMessage {
    src: NodeId,
    dest: NodeId,
    body: serde_json::Value,
}

/// An envelope that parsed but whose body was refused
#[derive(Debug)]
pub struct Rejection {
    pub src: NodeId,
    pub dest: NodeId,
    pub msg_id: Option<MsgId>,
    pub error: RippleError,
}

impl Rejection {
    /// Error response for the sender, if the sender is waiting for one
    pub fn reply(&self) -> Option<Message> {
        let msg_id = self.msg_id?;
        Some(Message {
            src: self.dest.clone(),
            dest: self.src.clone(),
            body: Body::new(Payload::from(&self.error)).in_reply_to(Some(msg_id)),
        })
    }
}

/// Result of decoding one inbound line
#[derive(Debug)]
pub enum Inbound {
    Message(Message),
    Rejected(Rejection),
}

/// Decode one line.
///
/// Returns `Err` only when the envelope itself is unparsable, in which case
/// there is nobody to answer.
pub fn decode_line(line: &str) -> RippleResult<Inbound> {
    let raw: RawMessage = serde_json::from_str(line)?;
    let msg_id = Body::peek_msg_id(&raw.body);

    match Body::from_json(raw.body) {
        Ok(body) => Ok(Inbound::Message(Message {
            src: raw.src,
            dest: raw.dest,
            body,
        })),
        Err(error) => Ok(Inbound::Rejected(Rejection {
            src: raw.src,
            dest: raw.dest,
            msg_id,
            error,
        })),
    }
}
