//! Wire frame shapes.
//!
//! Two layers of framing exist, nested: [`SocketFrame`] is what travels over
//! the raw duplex byte stream (one JSON object per frame); [`RpcFrame`] is
//! what `DuplexRPC` embeds in a [`SocketFrameKind::Message`] frame's `data`.

use crate::ids::{MessageId, RequestId};
use serde::{Deserialize, Serialize};

/// The four kinds of frame `MessageSocket` exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SocketFrameKind {
    /// Connection handshake, carries an instance identifier.
    Open,
    /// Acknowledges receipt of a `Message` frame (or a chunk of one).
    Ack,
    /// An application payload, possibly one chunk of a larger payload.
    Message,
    /// Liveness probe.
    Ping,
    /// Liveness probe reply.
    Pong,
}

/// A chunk locator for payloads split across multiple frames.
///
/// `index` and `total` are both 1-based to match the wire format's
/// `"n/total"` convention; a non-chunked message omits this field entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// This chunk's 1-based position.
    pub index: u32,
    /// Total number of chunks for this message id.
    pub total: u32,
}

impl ChunkInfo {
    /// True when this is the last chunk of the message.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.index == self.total
    }
}

/// A single frame on the `MessageSocket` wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketFrame {
    /// Frame id. For `Message`, this is the base id shared by all chunks;
    /// for `Ack`, it echoes the id being acknowledged.
    pub id: MessageId,
    /// Frame discriminant.
    #[serde(rename = "type")]
    pub kind: SocketFrameKind,
    /// Present on `Open` (instance id) and `Message` (one chunk's payload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Present only on chunked `Message` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkInfo>,
}

impl SocketFrame {
    /// Build a non-chunked `Message` frame carrying `data` verbatim.
    #[must_use]
    pub fn message(id: MessageId, data: String) -> Self {
        Self {
            id,
            kind: SocketFrameKind::Message,
            data: Some(data),
            chunk: None,
        }
    }

    /// Build one chunk of a larger `Message` frame.
    #[must_use]
    pub fn message_chunk(id: MessageId, data: String, index: u32, total: u32) -> Self {
        Self {
            id,
            kind: SocketFrameKind::Message,
            data: Some(data),
            chunk: Some(ChunkInfo { index, total }),
        }
    }

    /// Build an `Ack` frame for `id`.
    #[must_use]
    pub fn ack(id: MessageId) -> Self {
        Self {
            id,
            kind: SocketFrameKind::Ack,
            data: None,
            chunk: None,
        }
    }

    /// Build an `Open` frame carrying the sender's instance id.
    #[must_use]
    pub fn open(id: MessageId, instance_id: String) -> Self {
        Self {
            id,
            kind: SocketFrameKind::Open,
            data: Some(instance_id),
            chunk: None,
        }
    }

    /// Build a `Ping` frame.
    #[must_use]
    pub fn ping(id: MessageId) -> Self {
        Self {
            id,
            kind: SocketFrameKind::Ping,
            data: None,
            chunk: None,
        }
    }

    /// Build a `Pong` frame replying to `id`.
    #[must_use]
    pub fn pong(id: MessageId) -> Self {
        Self {
            id,
            kind: SocketFrameKind::Pong,
            data: None,
            chunk: None,
        }
    }
}

/// Call/response discriminant for the `DuplexRPC` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RpcKind {
    /// An outbound method invocation awaiting a matching `Response`.
    Call,
    /// A reply to a previously received `Call`.
    Response,
}

/// A `DuplexRPC` frame, embedded as the `data` of a `SocketFrame::Message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcFrame {
    /// Call id; echoed back on the matching response.
    pub id: RequestId,
    /// Call or response.
    pub kind: RpcKind,
    /// Method name, validated against the schema table for `kind`.
    #[serde(rename = "methodName")]
    pub method_name: String,
    /// Method input (for `Call`) or output (for `Response`), opaque JSON.
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_frame_kind_serializes_uppercase() {
        let json = serde_json::to_string(&SocketFrameKind::Message).unwrap();
        assert_eq!(json, "\"MESSAGE\"");
    }

    #[test]
    fn chunk_info_is_final_at_last_index() {
        let chunk = ChunkInfo { index: 3, total: 3 };
        assert!(chunk.is_final());
        let chunk = ChunkInfo { index: 2, total: 3 };
        assert!(!chunk.is_final());
    }

    #[test]
    fn message_frame_round_trips_through_json() {
        let frame = SocketFrame::message(MessageId::from("m1"), "payload".to_string());
        let json = serde_json::to_string(&frame).unwrap();
        let back: SocketFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, frame.id);
        assert_eq!(back.data, frame.data);
        assert!(back.chunk.is_none());
    }

    #[test]
    fn rpc_frame_round_trips() {
        let frame = RpcFrame {
            id: RequestId::from("r1"),
            kind: RpcKind::Call,
            method_name: "SEND_LOG".to_string(),
            data: serde_json::json!({"message": "hi"}),
        };
        let json = serde_json::to_string(&frame).unwrap();
        let back: RpcFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method_name, frame.method_name);
        assert_eq!(back.kind, RpcKind::Call);
    }
}
