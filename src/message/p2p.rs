use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io;
use std::io::prelude::*;
use std::io::Cursor;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use crate::routing::identifier::Identifier;

/// Probe whether the peer is still alive.
pub struct CheckLiving;

/// Reply to `CHECK LIVING`.
pub struct Alive;

/// Ask a peer for its current predecessor.
pub struct PredecessorGet;

/// Reply to `PREDECESSOR GET`; the peer may not know a predecessor.
pub struct PredecessorReply {
    pub socket_addr: Option<SocketAddr>,
}

/// Ask a peer for its current nearest successor.
pub struct SuccessorGet;

/// Reply to `SUCCESSOR GET`.
pub struct SuccessorReply {
    pub socket_addr: Option<SocketAddr>,
}

/// Announce the sender as a potential predecessor of the receiver.
pub struct PredecessorNotify {
    pub socket_addr: SocketAddr,
}

/// Look up the node responsible for an identifier.
///
/// The message carries the address of the node that started the lookup, so
/// that the final custodian can answer the originator directly no matter how
/// many hops forwarded the request.
pub struct NodeFind {
    pub identifier: Identifier,
    pub origin: SocketAddr,
}

/// Terminal reply to `NODE FIND`, sent straight to the originator.
pub struct NodeFound {
    pub identifier: Identifier,
    pub socket_addr: SocketAddr,
}

/// Hand a chunk over to the peer that is responsible for its key.
pub struct ChunkPut {
    pub key: [u8; 32],
    pub value: Vec<u8>,
}

/// Reply to a stored `CHUNK PUT`.
pub struct ChunkPutAck {
    pub key: [u8; 32],
}

/// Reply to a `CHUNK PUT` the receiver did not accept.
pub struct ChunkFailure {
    pub key: [u8; 32],
}

fn read_addr(cursor: &mut Cursor<&[u8]>) -> io::Result<SocketAddr> {
    let mut ip_arr = [0; 16];
    cursor.read_exact(&mut ip_arr)?;

    let ipv6 = Ipv6Addr::from(ip_arr);

    let ip_address = match ipv6.to_ipv4() {
        Some(ipv4) => IpAddr::V4(ipv4),
        None => IpAddr::V6(ipv6),
    };

    let port = cursor.read_u16::<NetworkEndian>()?;

    Ok(SocketAddr::new(ip_address, port))
}

fn write_addr(buffer: &mut Vec<u8>, socket_addr: &SocketAddr) -> io::Result<()> {
    let ip_address = match socket_addr.ip() {
        IpAddr::V4(ipv4) => ipv4.to_ipv6_mapped(),
        IpAddr::V6(ipv6) => ipv6,
    };

    buffer.write_all(&ip_address.octets())?;
    buffer.write_u16::<NetworkEndian>(socket_addr.port())?;

    Ok(())
}

fn read_opt_addr(cursor: &mut Cursor<&[u8]>) -> io::Result<Option<SocketAddr>> {
    match cursor.read_u8()? {
        0 => Ok(None),
        _ => Ok(Some(read_addr(cursor)?)),
    }
}

fn write_opt_addr(buffer: &mut Vec<u8>, socket_addr: &Option<SocketAddr>) -> io::Result<()> {
    match socket_addr {
        Some(addr) => {
            buffer.write_u8(1)?;
            write_addr(buffer, addr)
        }
        None => {
            buffer.write_u8(0)?;
            Ok(())
        }
    }
}

impl CheckLiving {
    pub fn parse(_cursor: Cursor<&[u8]>) -> io::Result<Self> {
        Ok(CheckLiving)
    }
}

impl Alive {
    pub fn parse(_cursor: Cursor<&[u8]>) -> io::Result<Self> {
        Ok(Alive)
    }
}

impl PredecessorGet {
    pub fn parse(_cursor: Cursor<&[u8]>) -> io::Result<Self> {
        Ok(PredecessorGet)
    }
}

impl PredecessorReply {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let socket_addr = read_opt_addr(&mut cursor)?;

        Ok(PredecessorReply { socket_addr })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        write_opt_addr(buffer, &self.socket_addr)
    }
}

impl SuccessorGet {
    pub fn parse(_cursor: Cursor<&[u8]>) -> io::Result<Self> {
        Ok(SuccessorGet)
    }
}

impl SuccessorReply {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let socket_addr = read_opt_addr(&mut cursor)?;

        Ok(SuccessorReply { socket_addr })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        write_opt_addr(buffer, &self.socket_addr)
    }
}

impl PredecessorNotify {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let socket_addr = read_addr(&mut cursor)?;

        Ok(PredecessorNotify { socket_addr })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        write_addr(buffer, &self.socket_addr)
    }
}

impl NodeFind {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let mut id_arr = [0; 32];
        cursor.read_exact(&mut id_arr)?;
        let identifier = Identifier::new(&id_arr);

        let origin = read_addr(&mut cursor)?;

        Ok(NodeFind { identifier, origin })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        buffer.write_all(&self.identifier.as_bytes())?;
        write_addr(buffer, &self.origin)
    }
}

impl NodeFound {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let mut id_arr = [0; 32];
        cursor.read_exact(&mut id_arr)?;
        let identifier = Identifier::new(&id_arr);

        let socket_addr = read_addr(&mut cursor)?;

        Ok(NodeFound {
            identifier,
            socket_addr,
        })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        buffer.write_all(&self.identifier.as_bytes())?;
        write_addr(buffer, &self.socket_addr)
    }
}

impl ChunkPut {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let mut key = [0; 32];
        cursor.read_exact(&mut key)?;

        let mut value = Vec::new();
        cursor.read_to_end(&mut value)?;

        Ok(ChunkPut { key, value })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        buffer.write_all(&self.key)?;
        buffer.write_all(&self.value)?;

        Ok(())
    }
}

impl ChunkPutAck {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let mut key = [0; 32];
        cursor.read_exact(&mut key)?;

        Ok(ChunkPutAck { key })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        buffer.write_all(&self.key)?;

        Ok(())
    }
}

impl ChunkFailure {
    pub fn parse(mut cursor: Cursor<&[u8]>) -> io::Result<Self> {
        let mut key = [0; 32];
        cursor.read_exact(&mut key)?;

        Ok(ChunkFailure { key })
    }

    pub fn write_bytes(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        buffer.write_all(&self.key)?;

        Ok(())
    }
}
