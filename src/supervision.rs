//! Supervision of peers and of the stabilization schedule.
//!
//! The stabilizer announces which peers it currently relies on through the
//! [`Watcher`] trait; the [`PeerRegistry`] is the process wide registry
//! behind it. Both operations are idempotent, watching a peer twice is the
//! same as watching it once.
//!
//! The periodic schedule itself is a plain thread running one step after the
//! other with a pause in between, so two steps can never overlap. The
//! [`StabilizerHandle`] lets the stabilizer halt its own schedule; a step
//! that is already running always finishes.
//!
//! [`Watcher`]: trait.Watcher.html
//! [`PeerRegistry`]: struct.PeerRegistry.html
//! [`StabilizerHandle`]: trait.StabilizerHandle.html

use crate::routing::identifier::Identifier;
use crate::routing::Peer;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Registers interest in the liveness of peers.
pub trait Watcher {
    /// Starts watching the given peer. Idempotent.
    fn watch(&self, peer: &Peer);

    /// Stops watching the given peer. Idempotent.
    fn unwatch(&self, peer: &Peer);
}

impl<W: Watcher + ?Sized> Watcher for Arc<W> {
    fn watch(&self, peer: &Peer) {
        (**self).watch(peer)
    }

    fn unwatch(&self, peer: &Peer) {
        (**self).unwatch(peer)
    }
}

/// The peers this node currently relies on, keyed by identifier
#[derive(Default)]
pub struct PeerRegistry {
    watched: Mutex<HashMap<Identifier, SocketAddr>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_watching(&self, peer: &Peer) -> bool {
        self.watched.lock().unwrap().contains_key(&peer.id())
    }

    /// Returns the addresses of all watched peers.
    pub fn watched_addrs(&self) -> Vec<SocketAddr> {
        self.watched.lock().unwrap().values().cloned().collect()
    }
}

impl Watcher for PeerRegistry {
    fn watch(&self, peer: &Peer) {
        let mut watched = self.watched.lock().unwrap();

        if watched.insert(peer.id(), peer.addr()).is_none() {
            log::debug!("Watching peer {}", peer);
        }
    }

    fn unwatch(&self, peer: &Peer) {
        let mut watched = self.watched.lock().unwrap();

        if watched.remove(&peer.id()).is_some() {
            log::debug!("No longer watching peer {}", peer);
        }
    }
}

/// Halts the periodic stabilization schedule.
pub trait StabilizerHandle {
    /// Prevents any further steps from being scheduled. A step that is
    /// already running finishes normally.
    fn stop(&self);

    fn is_stopped(&self) -> bool;
}

impl<H: StabilizerHandle + ?Sized> StabilizerHandle for Arc<H> {
    fn stop(&self) {
        (**self).stop()
    }

    fn is_stopped(&self) -> bool {
        (**self).is_stopped()
    }
}

/// Stop flag shared between the ticker thread and the stabilizer
#[derive(Default)]
pub struct StopFlag {
    stopped: AtomicBool,
}

impl StopFlag {
    pub fn new() -> Self {
        Default::default()
    }
}

impl StabilizerHandle for StopFlag {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Runs `step` at a fixed cadence on its own thread until `flag` is stopped.
///
/// Steps are strictly sequential; the pause starts only after the previous
/// step has returned, so a slow step delays the next tick instead of
/// overlapping with it.
pub fn spawn_ticker<F>(
    interval: Duration,
    flag: Arc<StopFlag>,
    mut step: F,
) -> thread::JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    thread::spawn(move || {
        while !flag.is_stopped() {
            step();

            if flag.is_stopped() {
                break;
            }

            thread::sleep(interval);
        }

        log::info!("Stabilization schedule stopped");
    })
}
