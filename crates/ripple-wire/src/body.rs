//! Message bodies
//!
//! Body = optional `msg_id` + optional `in_reply_to` + payload, where the
//! payload is discriminated by the `type` field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use ripple_core::{ErrorCode, MsgId, NodeId, RippleError, RippleResult, Value};

/// Typed payload, tagged by `type`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Cluster membership handed to the node at startup
    Init {
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    },
    InitOk,

    /// A value to be delivered to every node
    Broadcast { message: Value },
    BroadcastOk,

    /// Request for every value this node has accepted
    Read,
    ReadOk { messages: Vec<Value> },

    /// Adjacency map for the whole cluster
    Topology {
        topology: HashMap<NodeId, Vec<NodeId>>,
    },
    TopologyOk,

    Error {
        code: ErrorCode,
        #[serde(default)]
        text: String,
    },
}

impl Payload {
    /// Every `type` discriminator this node understands
    pub const KINDS: [&'static str; 9] = [
        "init",
        "init_ok",
        "broadcast",
        "broadcast_ok",
        "read",
        "read_ok",
        "topology",
        "topology_ok",
        "error",
    ];

    /// The `type` discriminator of this payload
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Init { .. } => "init",
            Payload::InitOk => "init_ok",
            Payload::Broadcast { .. } => "broadcast",
            Payload::BroadcastOk => "broadcast_ok",
            Payload::Read => "read",
            Payload::ReadOk { .. } => "read_ok",
            Payload::Topology { .. } => "topology",
            Payload::TopologyOk => "topology_ok",
            Payload::Error { .. } => "error",
        }
    }

    pub fn is_known(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }

    /// Replies complete an earlier request; they are never dispatched as requests
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Payload::InitOk
                | Payload::BroadcastOk
                | Payload::ReadOk { .. }
                | Payload::TopologyOk
                | Payload::Error { .. }
        )
    }

    pub fn error(code: ErrorCode, text: impl Into<String>) -> Self {
        Payload::Error {
            code,
            text: text.into(),
        }
    }
}

impl From<&RippleError> for Payload {
    fn from(err: &RippleError) -> Self {
        Payload::error(err.code(), err.to_string())
    }
}

/// Message body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<MsgId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<MsgId>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Body {
    pub fn new(payload: Payload) -> Self {
        Body {
            msg_id: None,
            in_reply_to: None,
            payload,
        }
    }

    pub fn with_msg_id(mut self, msg_id: MsgId) -> Self {
        self.msg_id = Some(msg_id);
        self
    }

    pub fn in_reply_to(mut self, msg_id: Option<MsgId>) -> Self {
        self.in_reply_to = msg_id;
        self
    }

    /// Decode a raw JSON body.
    ///
    /// An unknown `type` is `NotSupported`; a known `type` whose fields are
    /// missing or mistyped is `MalformedRequest`.
    pub fn from_json(raw: serde_json::Value) -> RippleResult<Self> {
        let kind = raw
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| RippleError::MalformedRequest("body has no string `type`".into()))?;

        if !Payload::is_known(kind) {
            return Err(RippleError::NotSupported(format!("unknown type `{kind}`")));
        }

        let kind = kind.to_string();
        serde_json::from_value(raw)
            .map_err(|e| RippleError::MalformedRequest(format!("invalid `{kind}` body: {e}")))
    }

    /// Best-effort recovery of `msg_id` from a body that failed to decode
    pub fn peek_msg_id(raw: &serde_json::Value) -> Option<MsgId> {
        raw.get("msg_id")
            .and_then(serde_json::Value::as_u64)
            .map(MsgId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_broadcast() {
        let body = Body::from_json(json!({"type": "broadcast", "message": 42, "msg_id": 7})).unwrap();
        assert_eq!(body.msg_id, Some(MsgId::new(7)));
        assert_eq!(
            body.payload,
            Payload::Broadcast {
                message: Value::new(42)
            }
        );
    }

    #[test]
    fn test_decode_peer_broadcast_without_msg_id() {
        let body = Body::from_json(json!({"type": "broadcast", "message": 1})).unwrap();
        assert!(body.msg_id.is_none());
    }

    #[test]
    fn test_decode_topology() {
        let body = Body::from_json(json!({
            "type": "topology",
            "msg_id": 1,
            "topology": {"n1": ["n2"], "n2": ["n1", "n3"], "n3": ["n2"]}
        }))
        .unwrap();

        let Payload::Topology { topology } = body.payload else {
            panic!("expected topology");
        };
        assert_eq!(topology[&NodeId::from("n2")].len(), 2);
    }

    #[test]
    fn test_unknown_type_not_supported() {
        let err = Body::from_json(json!({"type": "echo", "echo": "hi"})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }

    #[test]
    fn test_wrong_field_type_malformed() {
        let err = Body::from_json(json!({"type": "broadcast", "message": "forty-two"})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);

        let err = Body::from_json(json!({"type": "broadcast"})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
    }

    #[test]
    fn test_missing_type_malformed() {
        let err = Body::from_json(json!({"message": 1})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
    }

    #[test]
    fn test_encode_unit_reply() {
        let body = Body::new(Payload::BroadcastOk).in_reply_to(Some(MsgId::new(3)));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, json!({"type": "broadcast_ok", "in_reply_to": 3}));
    }

    #[test]
    fn test_encode_read_ok() {
        let body = Body::new(Payload::ReadOk {
            messages: vec![Value::new(1), Value::new(2)],
        });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, json!({"type": "read_ok", "messages": [1, 2]}));
    }

    #[test]
    fn test_reply_classification() {
        assert!(Payload::BroadcastOk.is_reply());
        assert!(Payload::error(ErrorCode::Crash, "x").is_reply());
        assert!(!Payload::Read.is_reply());
        assert!(!Payload::Broadcast {
            message: Value::new(1)
        }
        .is_reply());
    }

    #[test]
    fn test_kinds_cover_every_variant() {
        let samples = [
            Payload::InitOk,
            Payload::BroadcastOk,
            Payload::Read,
            Payload::TopologyOk,
            Payload::error(ErrorCode::Timeout, ""),
        ];
        for payload in samples {
            assert!(Payload::is_known(payload.kind()));
        }
    }
}
