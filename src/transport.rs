//! Remote calls to single peers.
//!
//! The [`Transmitter`] trait lists the calls the stabilizer issues against a
//! remote peer, one connection per call with a deadline appropriate for the
//! call. The [`Transport`] trait opens transmitters from peer identities,
//! which keeps the stabilizer free of socket code and lets tests substitute
//! a scripted transport.
//!
//! The TCP implementation routes `find_node` triangularly: the request
//! carries the originating address, every hop forwards it to its closest
//! known preceding node, and the final custodian connects back to the
//! originator. The originator parks the call in a [`PendingLookups`] table
//! until the answer arrives at its own server.
//!
//! [`Transmitter`]: trait.Transmitter.html
//! [`Transport`]: trait.Transport.html
//! [`PendingLookups`]: struct.PendingLookups.html

use crate::error::MessageError;
use crate::message::p2p;
use crate::message::Message;
use crate::network::Connection;
use crate::routing::identifier::Identifier;
use crate::routing::Peer;
use crate::storage::Key;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deadlines for the individual remote calls, in milliseconds
///
/// Liveness probes are kept short so a dead successor is detected within a
/// tick; lookups may legitimately cross many hops and get the longest
/// deadline.
#[derive(Copy, Clone, Debug)]
pub struct Timeouts {
    pub liveness: u64,
    pub predecessor: u64,
    pub successor: u64,
    pub find_node: u64,
    pub chunk: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            liveness: 5_000,
            predecessor: 20_000,
            successor: 10_000,
            find_node: 50_000,
            chunk: 10_000,
        }
    }
}

/// The calls the stabilizer can issue against one remote peer
///
/// An `Err` means the peer was unreachable or answered garbage; `Ok(None)`
/// means the peer answered but reported an absence. The two are handled very
/// differently by the stabilizer, so implementations must not conflate them.
pub trait Transmitter {
    /// Probes whether the peer answers at all. Failures of any kind count
    /// as "not living".
    fn check_living(&self) -> bool;

    /// Asks the peer for its current predecessor.
    fn your_predecessor(&self) -> crate::Result<Option<Peer>>;

    /// Asks the peer for its current nearest successor.
    fn your_successor(&self) -> crate::Result<Option<Peer>>;

    /// Announces `current` as a potential predecessor of the peer. There is
    /// no reply.
    fn notify(&self, current: &Peer) -> crate::Result<()>;

    /// Resolves the node responsible for `target` by routing through the
    /// ring, starting at the peer.
    fn find_node(&self, target: Identifier) -> crate::Result<Option<Peer>>;

    /// Stores a chunk at the peer. Storing the same pair twice is a no-op
    /// on the receiver.
    fn set_chunk(&self, key: &Key, value: &[u8]) -> crate::Result<()>;
}

/// Opens [`Transmitter`]s from peer identities.
///
/// [`Transmitter`]: trait.Transmitter.html
pub trait Transport {
    type Tx: Transmitter;

    fn open(&self, peer: &Peer) -> Self::Tx;
}

/// Lookups waiting for their `NODE FOUND` answer, keyed by target identifier
#[derive(Default)]
pub struct PendingLookups {
    waiting: Mutex<HashMap<Identifier, mpsc::Sender<Peer>>>,
}

impl PendingLookups {
    pub fn new() -> Self {
        Default::default()
    }

    /// Parks a lookup and returns the receiver its answer will arrive on.
    ///
    /// A second lookup for the same identifier replaces the first one; the
    /// stabilizer is the only originator and runs one step at a time, so
    /// this cannot drop a live lookup.
    pub fn register(&self, target: Identifier) -> mpsc::Receiver<Peer> {
        let (sender, receiver) = mpsc::channel();
        self.waiting.lock().unwrap().insert(target, sender);

        receiver
    }

    /// Delivers an answer to a parked lookup.
    ///
    /// Returns whether some caller was actually waiting for `target`.
    pub fn complete(&self, target: Identifier, peer: Peer) -> bool {
        match self.waiting.lock().unwrap().remove(&target) {
            Some(sender) => sender.send(peer).is_ok(),
            None => false,
        }
    }

    pub fn cancel(&self, target: &Identifier) {
        self.waiting.lock().unwrap().remove(target);
    }
}

struct Inner {
    home: Peer,
    lookups: Arc<PendingLookups>,
    timeouts: Timeouts,
}

/// The TCP transport used by a live node
///
/// Cloning is cheap; all clones share the home identity and the pending
/// lookup table.
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<Inner>,
}

impl TcpTransport {
    /// Creates a transport for the node with identity `home`.
    ///
    /// `lookups` must be the same table the node's request handler delivers
    /// `NODE FOUND` messages into.
    pub fn new(home: Peer, lookups: Arc<PendingLookups>, timeouts: Timeouts) -> Self {
        TcpTransport {
            inner: Arc::new(Inner {
                home,
                lookups,
                timeouts,
            }),
        }
    }
}

impl Transport for TcpTransport {
    type Tx = TcpTransmitter;

    fn open(&self, peer: &Peer) -> TcpTransmitter {
        TcpTransmitter {
            peer: peer.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Issues the remote calls of one peer over fresh TCP connections
pub struct TcpTransmitter {
    peer: Peer,
    inner: Arc<Inner>,
}

impl TcpTransmitter {
    fn probe(&self) -> crate::Result<bool> {
        let mut con = Connection::open(self.peer.addr(), self.inner.timeouts.liveness)?;
        con.send(&Message::CheckLiving(p2p::CheckLiving))?;

        let msg = con.receive()?;

        if let Message::Alive(_) = msg {
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

impl Transmitter for TcpTransmitter {
    fn check_living(&self) -> bool {
        match self.probe() {
            Ok(alive) => alive,
            Err(err) => {
                log::debug!("Liveness probe to {} failed: {}", self.peer, err);

                false
            }
        }
    }

    fn your_predecessor(&self) -> crate::Result<Option<Peer>> {
        log::debug!("Getting predecessor of peer {}", self.peer);

        let mut con = Connection::open(self.peer.addr(), self.inner.timeouts.predecessor)?;
        con.send(&Message::PredecessorGet(p2p::PredecessorGet))?;

        let msg = con.receive()?;

        if let Message::PredecessorReply(reply) = msg {
            Ok(reply.socket_addr.map(Peer::new))
        } else {
            Err(Box::new(MessageError::new(msg)))
        }
    }

    fn your_successor(&self) -> crate::Result<Option<Peer>> {
        log::debug!("Getting successor of peer {}", self.peer);

        let mut con = Connection::open(self.peer.addr(), self.inner.timeouts.successor)?;
        con.send(&Message::SuccessorGet(p2p::SuccessorGet))?;

        let msg = con.receive()?;

        if let Message::SuccessorReply(reply) = msg {
            Ok(reply.socket_addr.map(Peer::new))
        } else {
            Err(Box::new(MessageError::new(msg)))
        }
    }

    fn notify(&self, current: &Peer) -> crate::Result<()> {
        let mut con = Connection::open(self.peer.addr(), self.inner.timeouts.successor)?;

        con.send(&Message::PredecessorNotify(p2p::PredecessorNotify {
            socket_addr: current.addr(),
        }))?;

        Ok(())
    }

    fn find_node(&self, target: Identifier) -> crate::Result<Option<Peer>> {
        log::debug!("Finding node for identifier {} via {}", target, self.peer);

        let receiver = self.inner.lookups.register(target);

        let sent = Connection::open(self.peer.addr(), self.inner.timeouts.successor)
            .and_then(|mut con| {
                con.send(&Message::NodeFind(p2p::NodeFind {
                    identifier: target,
                    origin: self.inner.home.addr(),
                }))
            });

        if let Err(err) = sent {
            self.inner.lookups.cancel(&target);

            return Err(Box::new(err));
        }

        let deadline = Duration::from_millis(self.inner.timeouts.find_node);

        match receiver.recv_timeout(deadline) {
            Ok(peer) => {
                log::debug!("Node found for identifier {}: {}", target, peer);

                Ok(Some(peer))
            }
            Err(_) => {
                self.inner.lookups.cancel(&target);

                log::warn!("Lookup for identifier {} received no answer", target);

                Ok(None)
            }
        }
    }

    fn set_chunk(&self, key: &Key, value: &[u8]) -> crate::Result<()> {
        log::debug!("Moving chunk {} to peer {}", key, self.peer);

        let mut con = Connection::open(self.peer.addr(), self.inner.timeouts.chunk)?;

        con.send(&Message::ChunkPut(p2p::ChunkPut {
            key: key.raw,
            value: value.to_vec(),
        }))?;

        match con.receive()? {
            Message::ChunkPutAck(_) => Ok(()),
            Message::ChunkFailure(_) => {
                log::warn!("Peer {} refused chunk {}", self.peer, key);

                Err("peer refused the chunk".into())
            }
            msg => Err(Box::new(MessageError::new(msg))),
        }
    }
}
