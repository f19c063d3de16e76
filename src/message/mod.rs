//! Implementation of the peer-to-peer message types.
//!
//! The [`Message`] enum combines the messages of the stabilization protocol
//! and provides an abstraction for sending them over a TCP stream using the
//! [`Connection`] struct. Every message is framed with its total size and a
//! type code, both as 16 bit integers in network byte order.
//!
//! [`Message`]: enum.Message.html
//! [`Connection`]: ../network/struct.Connection.html

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor};

pub mod p2p;

/// This enum contains the different message types supported by this module.
///
/// For each message type, there exists a corresponding struct holding the
/// contents of this message.
///
/// * [`CheckLiving`](#variant.CheckLiving) / [`Alive`](#variant.Alive)
///   form the liveness probe.
/// * [`PredecessorGet`](#variant.PredecessorGet),
///   [`PredecessorReply`](#variant.PredecessorReply),
///   [`SuccessorGet`](#variant.SuccessorGet),
///   [`SuccessorReply`](#variant.SuccessorReply) and
///   [`PredecessorNotify`](#variant.PredecessorNotify) repair the ring
///   pointers.
/// * [`NodeFind`](#variant.NodeFind) / [`NodeFound`](#variant.NodeFound)
///   implement the lookup routing.
/// * [`ChunkPut`](#variant.ChunkPut),
///   [`ChunkPutAck`](#variant.ChunkPutAck) and
///   [`ChunkFailure`](#variant.ChunkFailure) move stored chunks between
///   custodians.
pub enum Message {
    /// Probe whether the receiving peer is alive.
    CheckLiving(p2p::CheckLiving),
    /// Positive reply to `CHECK LIVING`.
    Alive(p2p::Alive),
    /// Query the predecessor of some other peer.
    PredecessorGet(p2p::PredecessorGet),
    /// Reply to `PREDECESSOR GET` with the predecessor's address, if any.
    PredecessorReply(p2p::PredecessorReply),
    /// Query the nearest successor of some other peer.
    SuccessorGet(p2p::SuccessorGet),
    /// Reply to `SUCCESSOR GET` with the successor's address, if any.
    SuccessorReply(p2p::SuccessorReply),
    /// Tell some peer about a potentially new predecessor.
    PredecessorNotify(p2p::PredecessorNotify),
    /// Initiate or forward a lookup for the node responsible for an
    /// identifier.
    NodeFind(p2p::NodeFind),
    /// Terminal lookup reply, sent directly to the originator.
    NodeFound(p2p::NodeFound),
    /// Store a chunk at the peer responsible for its key.
    ChunkPut(p2p::ChunkPut),
    /// Acknowledge a stored chunk.
    ChunkPutAck(p2p::ChunkPutAck),
    /// Reject a chunk transfer.
    ChunkFailure(p2p::ChunkFailure),
}

impl Message {
    pub const MAX_LENGTH: usize = 64000;

    const CHECK_LIVING: u16 = 1100;
    const ALIVE: u16 = 1101;

    const PREDECESSOR_GET: u16 = 1110;
    const PREDECESSOR_REPLY: u16 = 1111;
    const SUCCESSOR_GET: u16 = 1112;
    const SUCCESSOR_REPLY: u16 = 1113;
    const PREDECESSOR_NOTIFY: u16 = 1114;

    const NODE_FIND: u16 = 1120;
    const NODE_FOUND: u16 = 1121;

    const CHUNK_PUT: u16 = 1130;
    const CHUNK_PUT_ACK: u16 = 1131;
    const CHUNK_FAILURE: u16 = 1132;

    pub fn parse(buffer: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(buffer);
        let size = cursor.read_u16::<NetworkEndian>()? as usize;
        let msg_type = cursor.read_u16::<NetworkEndian>()?;

        if buffer.len() != size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Non-matching message size",
            ));
        }

        let msg = match msg_type {
            Self::CHECK_LIVING => Message::CheckLiving(p2p::CheckLiving::parse(cursor)?),
            Self::ALIVE => Message::Alive(p2p::Alive::parse(cursor)?),
            Self::PREDECESSOR_GET => {
                Message::PredecessorGet(p2p::PredecessorGet::parse(cursor)?)
            }
            Self::PREDECESSOR_REPLY => {
                Message::PredecessorReply(p2p::PredecessorReply::parse(cursor)?)
            }
            Self::SUCCESSOR_GET => Message::SuccessorGet(p2p::SuccessorGet::parse(cursor)?),
            Self::SUCCESSOR_REPLY => {
                Message::SuccessorReply(p2p::SuccessorReply::parse(cursor)?)
            }
            Self::PREDECESSOR_NOTIFY => {
                Message::PredecessorNotify(p2p::PredecessorNotify::parse(cursor)?)
            }
            Self::NODE_FIND => Message::NodeFind(p2p::NodeFind::parse(cursor)?),
            Self::NODE_FOUND => Message::NodeFound(p2p::NodeFound::parse(cursor)?),
            Self::CHUNK_PUT => Message::ChunkPut(p2p::ChunkPut::parse(cursor)?),
            Self::CHUNK_PUT_ACK => Message::ChunkPutAck(p2p::ChunkPutAck::parse(cursor)?),
            Self::CHUNK_FAILURE => Message::ChunkFailure(p2p::ChunkFailure::parse(cursor)?),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid message type",
                ));
            }
        };

        Ok(msg)
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        // reserve two bytes for size
        buffer.write_u16::<NetworkEndian>(0)?;

        match self {
            Message::CheckLiving(_) => {
                buffer.write_u16::<NetworkEndian>(Self::CHECK_LIVING)?;
            }
            Message::Alive(_) => {
                buffer.write_u16::<NetworkEndian>(Self::ALIVE)?;
            }
            Message::PredecessorGet(_) => {
                buffer.write_u16::<NetworkEndian>(Self::PREDECESSOR_GET)?;
            }
            Message::PredecessorReply(predecessor_reply) => {
                buffer.write_u16::<NetworkEndian>(Self::PREDECESSOR_REPLY)?;
                predecessor_reply.write_bytes(buffer)?;
            }
            Message::SuccessorGet(_) => {
                buffer.write_u16::<NetworkEndian>(Self::SUCCESSOR_GET)?;
            }
            Message::SuccessorReply(successor_reply) => {
                buffer.write_u16::<NetworkEndian>(Self::SUCCESSOR_REPLY)?;
                successor_reply.write_bytes(buffer)?;
            }
            Message::PredecessorNotify(predecessor_notify) => {
                buffer.write_u16::<NetworkEndian>(Self::PREDECESSOR_NOTIFY)?;
                predecessor_notify.write_bytes(buffer)?;
            }
            Message::NodeFind(node_find) => {
                buffer.write_u16::<NetworkEndian>(Self::NODE_FIND)?;
                node_find.write_bytes(buffer)?;
            }
            Message::NodeFound(node_found) => {
                buffer.write_u16::<NetworkEndian>(Self::NODE_FOUND)?;
                node_found.write_bytes(buffer)?;
            }
            Message::ChunkPut(chunk_put) => {
                buffer.write_u16::<NetworkEndian>(Self::CHUNK_PUT)?;
                chunk_put.write_bytes(buffer)?;
            }
            Message::ChunkPutAck(chunk_put_ack) => {
                buffer.write_u16::<NetworkEndian>(Self::CHUNK_PUT_ACK)?;
                chunk_put_ack.write_bytes(buffer)?;
            }
            Message::ChunkFailure(chunk_failure) => {
                buffer.write_u16::<NetworkEndian>(Self::CHUNK_FAILURE)?;
                chunk_failure.write_bytes(buffer)?;
            }
        }

        // write size at beginning of buffer
        let size = buffer.len();

        if size > Self::MAX_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Message exceeded maximum length",
            ));
        }

        buffer
            .as_mut_slice()
            .write_u16::<NetworkEndian>(size as u16)?;

        Ok(())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Message::CheckLiving(_) => "CHECK LIVING",
            Message::Alive(_) => "ALIVE",
            Message::PredecessorGet(_) => "PREDECESSOR GET",
            Message::PredecessorReply(_) => "PREDECESSOR REPLY",
            Message::SuccessorGet(_) => "SUCCESSOR GET",
            Message::SuccessorReply(_) => "SUCCESSOR REPLY",
            Message::PredecessorNotify(_) => "PREDECESSOR NOTIFY",
            Message::NodeFind(_) => "NODE FIND",
            Message::NodeFound(_) => "NODE FOUND",
            Message::ChunkPut(_) => "CHUNK PUT",
            Message::ChunkPutAck(_) => "CHUNK PUT ACK",
            Message::ChunkFailure(_) => "CHUNK FAILURE",
        };

        write!(f, "{}", name)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
