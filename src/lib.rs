//! This crate contains the stabilization core of a structured peer-to-peer
//! overlay node based on the [Chord protocol][w:chord] and
//! [consistent hashing][w:cons].
//!
//! # Introduction
//!
//! In a Chord overlay, every node and every stored chunk lives on the same
//! circular identifier space. A node is responsible for the chunks whose
//! identifiers fall between its predecessor and itself. Routing a lookup
//! only works while every live node knows its current successor, so the
//! health of the whole network reduces to one local obligation: keep your
//! own pointers fresh.
//!
//! The periodic stabilization loop is what fulfils that obligation. Each
//! tick probes the successor, routes around it if it died, announces the
//! node to whoever should consider it a predecessor, keeps a short list of
//! fallback successors and moves chunks whose custodian changed. The loop
//! is deliberately pessimistic: nothing it learns in one tick is trusted in
//! the next, every pointer is re-earned each round.
//!
//! # Architecture Design
//!
//! The crate splits into a pure core and a thin networked shell. The
//! [`routing`] module holds the identifier arithmetic and the snapshot
//! value describing what the node believes about the ring; the
//! [`stabilization`] module contains the decision procedure operating on
//! that value; the [`finder`] module decides how lookups are routed. All
//! three are plain data and functions, testable without sockets.
//!
//! The shell consists of the [`message`], [`network`], [`transport`] and
//! [`handler`] modules: framed TCP messages, a thread pool server, the
//! outgoing call interface with per-call deadlines, and the serving side
//! answering the same calls. The [`supervision`] module owns the tick
//! schedule and the registry of watched peers.
//!
//! Lookups route triangularly: a `NODE FIND` request carries its
//! originator, intermediate nodes forward it along their finger lists, and
//! whichever node turns out to be responsible answers the originator
//! directly.
//!
//! [w:chord]: https://en.wikipedia.org/wiki/Chord_(peer-to-peer)
//! [w:cons]: https://en.wikipedia.org/wiki/Consistent_hashing
//! [`routing`]: routing/index.html
//! [`stabilization`]: stabilization/index.html
//! [`finder`]: finder/index.html
//! [`message`]: message/index.html
//! [`network`]: network/index.html
//! [`transport`]: transport/index.html
//! [`handler`]: handler/index.html
//! [`supervision`]: supervision/index.html

use std::error::Error;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub mod config;
pub mod error;
pub mod finder;
pub mod handler;
pub mod message;
pub mod network;
pub mod routing;
pub mod stabilization;
pub mod storage;
pub mod supervision;
pub mod transport;

pub type Result<T> = std::result::Result<T, Box<dyn Error>>;

use crate::config::Config;
use crate::handler::P2PHandler;
use crate::network::Server;
use crate::routing::{Peer, Routing};
use crate::stabilization::{Bootstrap, Stabilizer};
use crate::storage::ChunkStore;
use crate::supervision::{spawn_ticker, PeerRegistry, StopFlag};
use crate::transport::{PendingLookups, TcpTransport, Timeouts};

/// Runs a node until its peer-to-peer server dies.
///
/// Brings up the server first so the node can answer lookups, then joins
/// the ring through `bootstrap_addr` if one is given, and finally starts
/// the stabilization schedule.
pub fn run(config: Config, bootstrap_addr: Option<SocketAddr>) -> Result<()> {
    let current = Peer::new(config.listen_address);

    log::info!(
        "Starting node {} with identifier {}",
        current,
        current.id()
    );

    let timeouts = Timeouts::default();
    let lookups = Arc::new(PendingLookups::new());
    let transport = TcpTransport::new(current.clone(), Arc::clone(&lookups), timeouts);

    let routing = Arc::new(Mutex::new(Routing::new(current.clone())));
    let store = Arc::new(Mutex::new(ChunkStore::new()));

    let handler = Arc::new(P2PHandler::new(
        Arc::clone(&routing),
        Arc::clone(&store),
        Arc::clone(&lookups),
        timeouts.successor,
    ));

    let server_handle = Server::new(handler).listen(config.listen_address, config.worker_threads)?;

    if let Some(boot_addr) = bootstrap_addr {
        let joined = Bootstrap::new(current, boot_addr).bootstrap(&transport)?;
        *routing.lock().unwrap() = joined;
    }

    let registry = Arc::new(PeerRegistry::new());
    let flag = Arc::new(StopFlag::new());

    let stabilizer = Stabilizer::new(
        routing,
        store,
        transport,
        registry,
        Arc::clone(&flag),
    );

    let interval = Duration::from_millis(config.stabilization_interval_ms);
    let _ticker = spawn_ticker(interval, flag, move || {
        let outcome = stabilizer.step();
        log::debug!("stabilize: step finished as {}", outcome);
    });

    server_handle
        .join()
        .map_err(|_| "p2p server thread panicked")?;

    Ok(())
}
