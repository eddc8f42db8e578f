//! Packet type and codec interface

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TetherError};

/// A decoded protocol packet.
///
/// The manager routes packets by channel and treats the payload as opaque;
/// payload semantics belong to the channel layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Channel identifier the packet belongs to
    pub channel: String,
    /// Application payload
    pub payload: serde_json::Value,
}

impl Packet {
    /// Create a packet for a channel
    pub fn new(channel: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }
}

/// Encodes and decodes packets for the wire.
pub trait Codec: Send + Sync + 'static {
    /// Encode a packet into transport bytes
    fn encode(&self, packet: &Packet) -> Result<Bytes>;

    /// Decode transport bytes into a packet
    fn decode(&self, bytes: &Bytes) -> Result<Packet>;
}

/// JSON codec: one packet per frame, serialized with serde.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, packet: &Packet) -> Result<Bytes> {
        serde_json::to_vec(packet)
            .map(Bytes::from)
            .map_err(|e| TetherError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &Bytes) -> Result<Packet> {
        serde_json::from_slice(bytes).map_err(|e| TetherError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_codec_encode() {
        let packet = Packet::new("status", serde_json::json!({"ok": true}));
        let bytes = JsonCodec.encode(&packet).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"channel":"status","payload":{"ok":true}}"#
        );
    }

    #[test]
    fn test_json_codec_decode() {
        let bytes = Bytes::from_static(br#"{"channel":"chat","payload":{"msg":"hi"}}"#);
        let packet = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(packet.channel, "chat");
        assert_eq!(packet.payload, serde_json::json!({"msg": "hi"}));
    }

    #[test]
    fn test_json_codec_decode_garbage() {
        let bytes = Bytes::from_static(b"not json");
        let err = JsonCodec.decode(&bytes).unwrap_err();
        assert!(matches!(err, TetherError::Codec(_)));
    }
}
