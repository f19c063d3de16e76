use crate::error::MessageError;
use crate::finder;
use crate::message::p2p::*;
use crate::message::Message;
use crate::network::{Connection, ServerHandler};
use crate::routing::identifier::{Identifier, Identify};
use crate::routing::{Peer, Routing};
use crate::storage::{ChunkStore, Key};
use crate::transport::PendingLookups;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Handler for peer-to-peer requests
///
/// The supported incoming peer-to-peer messages are `CHECK LIVING`,
/// `PREDECESSOR GET`, `SUCCESSOR GET`, `PREDECESSOR NOTIFY`, `NODE FIND`,
/// `NODE FOUND` and `CHUNK PUT`. This is the serving counterpart of the
/// calls the stabilizer issues through its transport.
pub struct P2PHandler {
    routing: Arc<Mutex<Routing>>,
    store: Arc<Mutex<ChunkStore>>,
    lookups: Arc<PendingLookups>,
    timeout: u64,
}

impl P2PHandler {
    /// Creates a new `P2PHandler` instance.
    ///
    /// `lookups` must be the table the local transport parks its `NODE FIND`
    /// calls in; `timeout` bounds the connections this handler opens itself
    /// for forwarding and for answering originators.
    pub fn new(
        routing: Arc<Mutex<Routing>>,
        store: Arc<Mutex<ChunkStore>>,
        lookups: Arc<PendingLookups>,
        timeout: u64,
    ) -> Self {
        Self {
            routing,
            store,
            lookups,
            timeout,
        }
    }

    fn handle_check_living(&self, mut con: Connection) -> crate::Result<()> {
        con.send(&Message::Alive(Alive))?;

        Ok(())
    }

    fn handle_predecessor_get(&self, mut con: Connection) -> crate::Result<()> {
        let socket_addr = {
            let routing = self.routing.lock().unwrap();

            routing.predecessor().map(|peer| peer.addr())
        };

        log::debug!("Replying with PREDECESSOR REPLY {:?}", socket_addr);

        con.send(&Message::PredecessorReply(PredecessorReply { socket_addr }))?;

        Ok(())
    }

    fn handle_successor_get(&self, mut con: Connection) -> crate::Result<()> {
        let socket_addr = {
            let routing = self.routing.lock().unwrap();

            Some(routing.nearest_successor().addr())
        };

        log::debug!("Replying with SUCCESSOR REPLY {:?}", socket_addr);

        con.send(&Message::SuccessorReply(SuccessorReply { socket_addr }))?;

        Ok(())
    }

    fn handle_predecessor_notify(&self, notify: PredecessorNotify) -> crate::Result<()> {
        let peer = Peer::new(notify.socket_addr);

        log::debug!("Received PREDECESSOR NOTIFY from {}", peer);

        let mut routing = self.routing.lock().unwrap();
        let current_id = routing.current().id();

        if peer.id() == current_id {
            return Ok(());
        }

        // 1. adopt the sender when the slot is free or it is closer than the
        //    previous predecessor
        let adopt = match routing.predecessor() {
            None => true,
            Some(_) => routing.responsible_for(&peer.id()),
        };

        if adopt {
            log::info!("Updated predecessor to new address {}", peer);

            routing.set_predecessor(peer.clone());
        }

        // 2. a lone node adopts the first caller as successor, which is how
        //    a second node closes the ring
        if routing.nearest_successor().id() == current_id {
            log::info!("Updated successor to new address {}", peer);

            routing.narrow_successors(peer);
        }

        Ok(())
    }

    fn handle_node_find(&self, node_find: NodeFind) -> crate::Result<()> {
        let identifier = node_find.identifier;
        let origin = node_find.origin;

        log::debug!(
            "Received NODE FIND for identifier {} from origin {}",
            identifier,
            origin
        );

        let (current, successor, next) = {
            let routing = self.routing.lock().unwrap();

            (
                routing.current().clone(),
                routing.nearest_successor(),
                routing.closest_preceding(&identifier),
            )
        };

        finder::judge(
            identifier,
            &current,
            &successor,
            || self.reply_found(identifier, &current, origin),
            || self.reply_found(identifier, &successor, origin),
            || self.forward_find(identifier, origin, &next),
        )
    }

    fn reply_found(
        &self,
        identifier: Identifier,
        custodian: &Peer,
        origin: SocketAddr,
    ) -> crate::Result<()> {
        log::debug!(
            "Replying to origin {} with NODE FOUND {}",
            origin,
            custodian
        );

        let mut con = Connection::open(origin, self.timeout)?;
        con.send(&Message::NodeFound(NodeFound {
            identifier,
            socket_addr: custodian.addr(),
        }))?;

        Ok(())
    }

    fn forward_find(
        &self,
        identifier: Identifier,
        origin: SocketAddr,
        next: &Peer,
    ) -> crate::Result<()> {
        log::debug!("Forwarding NODE FIND for identifier {} to {}", identifier, next);

        let mut con = Connection::open(next.addr(), self.timeout)?;
        con.send(&Message::NodeFind(NodeFind { identifier, origin }))?;

        Ok(())
    }

    fn handle_node_found(&self, node_found: NodeFound) -> crate::Result<()> {
        let peer = Peer::new(node_found.socket_addr);

        if self.lookups.complete(node_found.identifier, peer) {
            log::debug!("Lookup for identifier {} answered", node_found.identifier);
        } else {
            log::warn!(
                "Received NODE FOUND for identifier {} nobody asked for",
                node_found.identifier
            );
        }

        Ok(())
    }

    fn handle_chunk_put(&self, mut con: Connection, chunk_put: ChunkPut) -> crate::Result<()> {
        let key = Key { raw: chunk_put.key };

        log::info!("Received CHUNK PUT for key {}", key);

        // 1. only accept keys in our range; a sender with a stale view gets
        //    a failure and retries after its own next stabilization round
        let responsible = {
            let routing = self.routing.lock().unwrap();

            routing.responsible_for(&key.identifier())
        };

        if !responsible {
            log::warn!("Refusing CHUNK PUT for key {} outside our range", key);

            con.send(&Message::ChunkFailure(ChunkFailure { key: key.raw }))?;

            return Ok(());
        }

        // 2. overwriting with the same value keeps re-sent transfers a no-op
        //    for the sender
        {
            let mut store = self.store.lock().unwrap();
            store.insert(key, chunk_put.value);
        }

        con.send(&Message::ChunkPutAck(ChunkPutAck { key: key.raw }))?;

        Ok(())
    }

    fn handle_connection(&self, mut con: Connection) -> crate::Result<()> {
        let msg = con.receive()?;

        log::debug!("P2P handler received message of type {}", msg);

        match msg {
            Message::CheckLiving(_) => self.handle_check_living(con),
            Message::PredecessorGet(_) => self.handle_predecessor_get(con),
            Message::SuccessorGet(_) => self.handle_successor_get(con),
            Message::PredecessorNotify(notify) => self.handle_predecessor_notify(notify),
            Message::NodeFind(node_find) => self.handle_node_find(node_find),
            Message::NodeFound(node_found) => self.handle_node_found(node_found),
            Message::ChunkPut(chunk_put) => self.handle_chunk_put(con, chunk_put),
            _ => Err(Box::new(MessageError::new(msg))),
        }
    }

    fn handle_error(&self, error: &dyn Error) {
        log::error!("Error in P2PHandler: {}", error)
    }
}

impl ServerHandler for P2PHandler {
    fn handle_connection(&self, connection: Connection) {
        if let Err(err) = self.handle_connection(connection) {
            self.handle_error(&*err);
        }
    }

    fn handle_error(&self, error: io::Error) {
        self.handle_error(&error)
    }
}
