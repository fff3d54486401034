use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::error::PacketError;

/// Length of the fixed payload block carried by every packet.
pub const PAYLOAD_SIZE: usize = 20;

/// Value of the acknowledgment field when a packet acknowledges nothing.
pub const NOT_IN_USE: u32 = u32::MAX;

/// Encoded size: seq, ack and checksum words followed by the payload block.
pub const WIRE_SIZE: usize = 12 + PAYLOAD_SIZE;

pub type Payload = [u8; PAYLOAD_SIZE];

/// Zero-pad an application message into a payload block.
pub fn payload_from_bytes(data: &[u8]) -> Result<Payload, PacketError> {
    if data.len() > PAYLOAD_SIZE {
        return Err(PacketError::PayloadTooLarge(data.len(), PAYLOAD_SIZE));
    }
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload[..data.len()].copy_from_slice(data);
    Ok(payload)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Sequence number, in `[0, seq_space)` for well-formed packets.
    pub seq_num: u32,
    /// Acknowledged sequence number; `None` on data packets.
    pub ack_num: Option<u32>,
    /// Checksum stamped at construction. The channel never rewrites it.
    pub checksum: u32,
    pub payload: Payload,
}

impl Packet {
    /// Create a data packet carrying `payload`.
    pub fn data(seq_num: u32, payload: Payload) -> Self {
        Self::stamped(seq_num, None, payload)
    }

    /// Create a pure acknowledgment with a zero-filled payload.
    pub fn ack(seq_num: u32, ack_num: u32) -> Self {
        Self::stamped(seq_num, Some(ack_num), [0u8; PAYLOAD_SIZE])
    }

    fn stamped(seq_num: u32, ack_num: Option<u32>, payload: Payload) -> Self {
        let mut packet = Self {
            seq_num,
            ack_num,
            checksum: 0,
            payload,
        };
        packet.checksum = packet.compute_checksum();
        packet
    }

    /// Ack field as it appears on the wire.
    pub fn raw_ack(&self) -> u32 {
        self.ack_num.unwrap_or(NOT_IN_USE)
    }

    pub fn compute_checksum(&self) -> u32 {
        checksum::compute(self.seq_num, self.raw_ack(), &self.payload)
    }

    pub fn is_corrupted(&self) -> bool {
        self.compute_checksum() != self.checksum
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(WIRE_SIZE);
        buf.put_u32(self.seq_num);
        buf.put_u32(self.raw_ack());
        buf.put_u32(self.checksum);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a frame. The checksum is carried over untouched, so a damaged
    /// frame decodes fine and is caught later by [`Packet::is_corrupted`].
    pub fn decode(mut frame: &[u8]) -> Result<Self, PacketError> {
        if frame.len() < WIRE_SIZE {
            return Err(PacketError::Truncated(frame.len(), WIRE_SIZE));
        }
        let seq_num = frame.get_u32();
        let ack_num = match frame.get_u32() {
            NOT_IN_USE => None,
            ack => Some(ack),
        };
        let checksum = frame.get_u32();
        let mut payload = [0u8; PAYLOAD_SIZE];
        frame.copy_to_slice(&mut payload);
        Ok(Self {
            seq_num,
            ack_num,
            checksum,
            payload,
        })
    }
}
