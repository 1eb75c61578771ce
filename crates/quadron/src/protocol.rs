//! Wire protocol.
//!
//! Every message is a single UDP datagram with a fixed, tightly packed
//! big-endian layout:
//!
//! ```text
//! ┌──────┬────────────┬────────────┬────────────┬──────────────┐
//! │ type │ position.x │ position.y │ aoi radius │  identifier  │
//! │ (u8) │   (i64)    │   (i64)    │   (i64)    │ (4+2 bytes)  │
//! └──────┴────────────┴────────────┴────────────┴──────────────┘
//!   all     MOVE, MOVE_BNR, NEIGHBOR, JOIN        NEIGHBOR, JOIN
//! ```
//!
//! JOIN_ACK and LEAVE carry only the type byte. MOVE, MOVE_BNR and JOIN_ACK
//! identify their subject implicitly through the datagram's source address;
//! NEIGHBOR and JOIN carry an explicit subject identifier distinct from
//! whichever peer relayed them.

use glam::I64Vec2;

use crate::identifier::Identifier;

const KIND_MOVE: u8 = 0;
const KIND_MOVE_BNR: u8 = 1;
const KIND_NEIGHBOR: u8 = 2;
const KIND_JOIN: u8 = 3;
const KIND_JOIN_ACK: u8 = 4;
const KIND_LEAVE: u8 = 5;

const POSITION_OFFSET: usize = 1;
const AOI_RADIUS_OFFSET: usize = POSITION_OFFSET + 16;
const IDENTIFIER_OFFSET: usize = AOI_RADIUS_OFFSET + 8;

/// Size of a MOVE or MOVE_BNR datagram.
pub const MOVE_PACKET_LEN: usize = IDENTIFIER_OFFSET;
/// Size of a NEIGHBOR or JOIN datagram.
pub const NEIGHBOR_PACKET_LEN: usize = IDENTIFIER_OFFSET + Identifier::ENCODED_LEN;
/// Largest datagram the protocol produces.
pub const MAX_PACKET_LEN: usize = NEIGHBOR_PACKET_LEN;

/// A protocol message.
///
/// Decoding is total: anything truncated or carrying an unknown type byte
/// becomes [`Packet::Invalid`], which the engine silently discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    /// Periodic position update for direct neighbors.
    Move { position: I64Vec2, aoi_radius: i64 },
    /// Position update that additionally asks the receiver to keep the
    /// sender updated (the sender holds the receiver as a binding neighbor).
    MoveBindingRequest { position: I64Vec2, aoi_radius: i64 },
    /// Introduction of a third peer, relayed on its behalf.
    Neighbor {
        subject: Identifier,
        position: I64Vec2,
        aoi_radius: i64,
    },
    /// Request to enter the network, routed geographically toward the
    /// claimed position.
    Join {
        subject: Identifier,
        position: I64Vec2,
        aoi_radius: i64,
    },
    /// Confirmation that a join request reached its landing point.
    JoinAck,
    /// Reserved; never produced, ignored on receipt.
    Leave,
    /// Decode sentinel for unrecognized or truncated datagrams.
    Invalid,
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Packet::Move {
                position,
                aoi_radius,
            } => encode_move(KIND_MOVE, position, aoi_radius),
            Packet::MoveBindingRequest {
                position,
                aoi_radius,
            } => encode_move(KIND_MOVE_BNR, position, aoi_radius),
            Packet::Neighbor {
                subject,
                position,
                aoi_radius,
            } => encode_subject(KIND_NEIGHBOR, subject, position, aoi_radius),
            Packet::Join {
                subject,
                position,
                aoi_radius,
            } => encode_subject(KIND_JOIN, subject, position, aoi_radius),
            Packet::JoinAck => vec![KIND_JOIN_ACK],
            Packet::Leave => vec![KIND_LEAVE],
            // never sent
            Packet::Invalid => Vec::new(),
        }
    }

    pub fn decode(data: &[u8]) -> Packet {
        let Some(&kind) = data.first() else {
            return Packet::Invalid;
        };

        match kind {
            KIND_MOVE | KIND_MOVE_BNR if data.len() >= MOVE_PACKET_LEN => {
                let (position, aoi_radius) = read_payload(data);
                if kind == KIND_MOVE {
                    Packet::Move {
                        position,
                        aoi_radius,
                    }
                } else {
                    Packet::MoveBindingRequest {
                        position,
                        aoi_radius,
                    }
                }
            }
            KIND_NEIGHBOR | KIND_JOIN if data.len() >= NEIGHBOR_PACKET_LEN => {
                let (position, aoi_radius) = read_payload(data);
                let Some(subject) = Identifier::decode(&data[IDENTIFIER_OFFSET..]) else {
                    return Packet::Invalid;
                };
                if kind == KIND_NEIGHBOR {
                    Packet::Neighbor {
                        subject,
                        position,
                        aoi_radius,
                    }
                } else {
                    Packet::Join {
                        subject,
                        position,
                        aoi_radius,
                    }
                }
            }
            KIND_JOIN_ACK => Packet::JoinAck,
            KIND_LEAVE => Packet::Leave,
            _ => Packet::Invalid,
        }
    }
}

fn write_payload(buf: &mut [u8], position: I64Vec2, aoi_radius: i64) {
    buf[POSITION_OFFSET..POSITION_OFFSET + 8].copy_from_slice(&position.x.to_be_bytes());
    buf[POSITION_OFFSET + 8..POSITION_OFFSET + 16].copy_from_slice(&position.y.to_be_bytes());
    buf[AOI_RADIUS_OFFSET..AOI_RADIUS_OFFSET + 8].copy_from_slice(&aoi_radius.to_be_bytes());
}

fn read_payload(data: &[u8]) -> (I64Vec2, i64) {
    let x = read_i64(data, POSITION_OFFSET);
    let y = read_i64(data, POSITION_OFFSET + 8);
    let aoi_radius = read_i64(data, AOI_RADIUS_OFFSET);
    (I64Vec2::new(x, y), aoi_radius)
}

fn read_i64(data: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    i64::from_be_bytes(bytes)
}

fn encode_move(kind: u8, position: I64Vec2, aoi_radius: i64) -> Vec<u8> {
    let mut buf = vec![0u8; MOVE_PACKET_LEN];
    buf[0] = kind;
    write_payload(&mut buf, position, aoi_radius);
    buf
}

fn encode_subject(kind: u8, subject: Identifier, position: I64Vec2, aoi_radius: i64) -> Vec<u8> {
    let mut buf = vec![0u8; NEIGHBOR_PACKET_LEN];
    buf[0] = kind;
    write_payload(&mut buf, position, aoi_radius);
    subject.encode(&mut buf[IDENTIFIER_OFFSET..]);
    buf
}
