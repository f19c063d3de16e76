//! This module implements identifier-based routing using consistent hashing.
//!
//! An [`Identifier`] is a 256 bit number on an identifier circle containing
//! all non-negative integers modulo 2^256. Each peer obtains its identifier
//! by hashing its own ip address. The peers are responsible for the range on
//! the identifier circle beginning with the identifier after their
//! predecessor up to and including their own identifier.
//!
//! The [`Routing`] struct holds everything a node knows about the ring: its
//! own identity, the last known predecessor, the successor list and the
//! finger list. The stabilizer re-establishes the successor and predecessor
//! pointers on every tick while the finger list is maintained by a separate
//! routine and only read here.
//!
//! [`Identifier`]: identifier/struct.Identifier.html
//! [`Routing`]: struct.Routing.html

use self::identifier::{Identifier, Identify};
use self::node_list::NodeList;
use std::fmt;
use std::net::SocketAddr;

pub mod identifier;
pub mod node_list;

/// The identity of a peer on the ring
///
/// A peer is a socket address together with its position on the identifier
/// circle. Two peers are considered equal iff their identifiers are equal;
/// the address is only a handle for opening connections.
#[derive(Clone)]
pub struct Peer {
    id: Identifier,
    addr: SocketAddr,
}

impl Peer {
    /// Creates a peer whose identifier is the hash of its address.
    pub fn new(addr: SocketAddr) -> Self {
        Peer {
            id: addr.identifier(),
            addr,
        }
    }

    /// Creates a peer with an explicitly chosen identifier.
    ///
    /// Mainly useful to lay out deterministic rings in tests; the live
    /// system always derives the identifier from the address.
    pub fn with_id(id: Identifier, addr: SocketAddr) -> Self {
        Peer { id, addr }
    }

    pub fn id(&self) -> Identifier {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Peer) -> bool {
        self.id == other.id
    }
}

impl Eq for Peer {}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Peer({}, {})", self.addr, self.id)
    }
}

/// This struct stores routing information about other peers.
#[derive(Clone, Debug)]
pub struct Routing {
    current: Peer,
    predecessor: Option<Peer>,
    successors: NodeList,
    fingers: NodeList,
}

impl Routing {
    /// Creates the routing state of a node that is alone on the ring.
    pub fn new(current: Peer) -> Self {
        let successors = NodeList::single(current.clone());
        let fingers = NodeList::single(current.clone());

        Routing {
            current,
            predecessor: None,
            successors,
            fingers,
        }
    }

    /// Returns this node's own identity.
    pub fn current(&self) -> &Peer {
        &self.current
    }

    /// Returns the last known predecessor.
    pub fn predecessor(&self) -> Option<&Peer> {
        self.predecessor.as_ref()
    }

    pub fn set_predecessor(&mut self, peer: Peer) {
        self.predecessor = Some(peer);
    }

    pub fn clear_predecessor(&mut self) {
        self.predecessor = None;
    }

    /// Returns the first live candidate after this node on the circle.
    ///
    /// Equals `current` iff the node is alone.
    pub fn nearest_successor(&self) -> Peer {
        self.successors.nearest_successor(&self.current)
    }

    pub fn successors(&self) -> &NodeList {
        &self.successors
    }

    pub fn set_successors(&mut self, successors: NodeList) {
        self.successors = successors;
    }

    /// Shrinks the successor list to a single, better candidate.
    pub fn narrow_successors(&mut self, peer: Peer) {
        self.successors = NodeList::single(peer);
    }

    pub fn fingers(&self) -> &NodeList {
        &self.fingers
    }

    pub fn set_fingers(&mut self, fingers: NodeList) {
        self.fingers = fingers;
    }

    /// Checks whether this peer is responsible for the given identifier.
    ///
    /// A node without a predecessor considers itself responsible; the
    /// stabilization protocol corrects this as soon as a predecessor
    /// announces itself.
    pub fn responsible_for(&self, identifier: &Identifier) -> bool {
        match &self.predecessor {
            Some(pred) => identifier.is_between(&pred.id(), &self.current.id()),
            None => true,
        }
    }

    /// Returns the closest known node preceding `target`, taking this node,
    /// the successor list and the finger list into account.
    ///
    /// This is the node a lookup that cannot be answered locally is
    /// forwarded to.
    pub fn closest_preceding(&self, target: &Identifier) -> Peer {
        let best = self
            .successors
            .refine_preceding(target, self.current.clone());
        self.fingers.refine_preceding(target, best)
    }

    /// Returns the first known node at or after `target` on the circle,
    /// taking this node, the successor list and the finger list into
    /// account.
    ///
    /// A chunk is rightfully held here iff this method names the node
    /// itself for the chunk's hash.
    pub fn nearest_custodian(&self, target: &Identifier) -> Peer {
        let best = self
            .successors
            .refine_custodian(target, self.current.clone());
        self.fingers.refine_custodian(target, best)
    }
}
