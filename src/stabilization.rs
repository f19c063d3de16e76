//! The stabilization control loop.
//!
//! A Chord ring stays routable only while every node keeps its successor
//! list, predecessor pointer and stored chunks in agreement with the ring as
//! it actually is. The [`Stabilizer`] re-establishes that agreement: once
//! per tick it probes the nearest successor, repairs the successor list
//! around dead peers, announces itself to whoever should consider it a
//! predecessor, extends the successor list as failure headroom and hands
//! chunks that stopped belonging here to their rightful custodians.
//!
//! One call to [`step`] performs one full round. Remote calls block with
//! per-call deadlines; the caller must not run two steps concurrently on the
//! same state, which the ticker in the [`supervision`] module guarantees by
//! construction. All routing updates are computed on a snapshot and written
//! back under the lock, so concurrent readers observe either the previous or
//! the next state and never an intermediate one.
//!
//! [`Stabilizer`]: struct.Stabilizer.html
//! [`step`]: struct.Stabilizer.html#method.step
//! [`supervision`]: ../supervision/index.html

use crate::routing::identifier::Identify;
use crate::routing::node_list::NodeList;
use crate::routing::{Peer, Routing};
use crate::storage::{ChunkStore, Key};
use crate::supervision::{StabilizerHandle, Watcher};
use crate::transport::{Transmitter, Transport};
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// How many successors beyond the nearest one a step tries to collect
const SUCCESSOR_UNFOLD: usize = 4;

/// Basic information needed to connect to the network using a bootstrap peer
pub struct Bootstrap {
    current: Peer,
    boot_addr: SocketAddr,
}

impl Bootstrap {
    /// Initializes the bootstrap algorithm by providing the peer's own
    /// identity and the address of a bootstrapping peer.
    pub fn new(current: Peer, boot_addr: SocketAddr) -> Self {
        Self { current, boot_addr }
    }

    /// Creates a new routing state by asking the bootstrap peer for the node
    /// currently responsible for our identifier.
    ///
    /// That node becomes our first successor; the predecessor stays unknown
    /// until the ring tells us about one. The finger list starts out
    /// pointing at ourselves and is filled in by the finger maintenance
    /// routine.
    pub fn bootstrap<T: Transport>(&self, transport: &T) -> crate::Result<Routing> {
        let boot_peer = Peer::new(self.boot_addr);

        let successor = transport
            .open(&boot_peer)
            .find_node(self.current.id())?
            .ok_or("bootstrap peer did not resolve a successor")?;

        log::info!("Joining the ring with successor {}", successor);

        let mut routing = Routing::new(self.current.clone());
        routing.set_successors(NodeList::single(successor));

        Ok(routing)
    }
}

/// The branch one stabilization round took, with its observable result
///
/// The variant names double as log tags so an operator can follow which
/// branch fired from the logs alone.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The node is alone on the ring; nothing to do, no calls issued.
    Alone,
    /// The successor died mid-step or no repair path exists this tick; the
    /// state is unchanged and the next tick retries.
    Stalled,
    /// The dead successor was dropped and the ring was re-joined through a
    /// spare from the successor list.
    Recovered,
    /// The dead successor was the only one; the ring was re-joined through
    /// the predecessor.
    JoinedViaPredecessor,
    /// Neither a spare successor nor the predecessor led back into the
    /// ring; the node reset itself and stopped its own schedule.
    Bankrupt,
    /// The successor knows no predecessor yet and was told about us.
    Notified,
    /// The successor reported a predecessor closer to us than itself; the
    /// successor list was narrowed to that node.
    Narrowed,
    /// We are our successor's predecessor; the successor list was extended
    /// and chunks were migrated.
    Extended {
        migrated: usize,
        migration_failed: bool,
    },
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tag = match self {
            StepOutcome::Alone => "alone",
            StepOutcome::Stalled => "stalled",
            StepOutcome::Recovered => "recovered",
            StepOutcome::JoinedViaPredecessor => "joined-via-predecessor",
            StepOutcome::Bankrupt => "bankrupt",
            StepOutcome::Notified => "notified",
            StepOutcome::Narrowed => "narrowed",
            StepOutcome::Extended { .. } => "extended",
        };

        write!(f, "{}", tag)
    }
}

/// Repairs the ring pointers and migrates chunks in regular intervals
pub struct Stabilizer<T, W, H> {
    routing: Arc<Mutex<Routing>>,
    store: Arc<Mutex<ChunkStore>>,
    transport: T,
    watcher: W,
    handle: H,
}

impl<T, W, H> Stabilizer<T, W, H>
where
    T: Transport,
    W: Watcher,
    H: StabilizerHandle,
{
    /// Initializes the stabilizer with the shared routing state, the shared
    /// chunk store, and its collaborators.
    ///
    /// `handle` must control the schedule this stabilizer runs on; it is
    /// used to stop further ticks when the node goes bankrupt.
    pub fn new(
        routing: Arc<Mutex<Routing>>,
        store: Arc<Mutex<ChunkStore>>,
        transport: T,
        watcher: W,
        handle: H,
    ) -> Self {
        Self {
            routing,
            store,
            transport,
            watcher,
            handle,
        }
    }

    /// Executes one stabilization round and reports which branch it took.
    ///
    /// The round inspects the nearest successor and picks exactly one of
    /// the branches described on [`StepOutcome`].
    ///
    /// [`StepOutcome`]: enum.StepOutcome.html
    pub fn step(&self) -> StepOutcome {
        let snapshot = self.routing.lock().unwrap().clone();
        let current = snapshot.current().clone();
        let succ = snapshot.nearest_successor();

        if succ.id() == current.id() {
            log::debug!("stabilize: alone");
            return StepOutcome::Alone;
        }

        let tx = self.transport.open(&succ);

        if !tx.check_living() {
            return self.succ_dead(&snapshot, &current, &succ);
        }

        match tx.your_predecessor() {
            Err(err) => {
                log::warn!("stabilize: successor {} stopped answering: {}", succ, err);

                StepOutcome::Stalled
            }
            Ok(None) => {
                // the successor is not aware of any predecessor yet
                log::debug!("stabilize: telling {} about ourselves", succ);
                self.notify(&tx, &current, &succ);

                StepOutcome::Notified
            }
            Ok(Some(better))
                if better.id().is_between_exclusive(&current.id(), &succ.id()) =>
            {
                self.narrow(&current, better)
            }
            Ok(Some(_)) => {
                // our pointer is correct; keep the successor informed,
                // build up failure headroom and shed chunks we no longer own
                self.notify(&tx, &current, &succ);

                if let Some(list) = self.unfold_successors(&current, &succ) {
                    for peer in list.iter() {
                        self.watcher.watch(peer);
                    }

                    self.routing.lock().unwrap().set_successors(list);
                }

                let (migrated, migration_failed) = self.immigrate_data(&current);

                StepOutcome::Extended {
                    migrated,
                    migration_failed,
                }
            }
        }
    }

    fn notify(&self, tx: &T::Tx, current: &Peer, receiver: &Peer) {
        if let Err(err) = tx.notify(current) {
            log::warn!("stabilize: could not notify {}: {}", receiver, err);
        }
    }

    /// The successor between us and the one we knew wins; the list narrows
    /// to it and the next tick extends the list again from there.
    fn narrow(&self, current: &Peer, better: Peer) -> StepOutcome {
        log::info!("stabilize: {} is a closer successor, narrowing", better);

        // the newly discovered node is the one that needs to hear from us
        let tx = self.transport.open(&better);
        self.notify(&tx, current, &better);

        self.routing.lock().unwrap().narrow_successors(better.clone());
        self.watcher.watch(&better);

        StepOutcome::Narrowed
    }

    fn succ_dead(&self, snapshot: &Routing, current: &Peer, succ: &Peer) -> StepOutcome {
        log::info!("stabilize: successor {} is dead", succ);

        self.watcher.unwatch(succ);

        if snapshot.successors().len() > 1 {
            let trimmed = snapshot.successors().kill_nearest(current);
            let spare = trimmed.nearest_successor(current);

            log::info!("stabilize: recovering through spare successor {}", spare);

            // resolve the replacement first so the routing state is written
            // exactly once; readers must never see the trimmed list alone
            let found = self.resolve_successor_via(current, &spare);

            {
                let mut routing = self.routing.lock().unwrap();

                match &found {
                    Some(new_succ) => {
                        routing.set_successors(NodeList::single(new_succ.clone()));
                        routing.clear_predecessor();
                    }
                    None => routing.set_successors(trimmed),
                }
            }

            match found {
                Some(new_succ) => {
                    self.watcher.watch(&new_succ);

                    log::info!("stabilize: ring rejoined at {}", new_succ);
                }
                None => {
                    log::warn!("stabilize: spare {} did not answer, retrying next tick", spare);
                }
            }

            return StepOutcome::Recovered;
        }

        if let Some(pred) = snapshot.predecessor().cloned() {
            log::info!("stabilize: no spare successor, joining through {}", pred);

            return match self.join_via(current, &pred) {
                Some(_) => StepOutcome::JoinedViaPredecessor,
                None => self.bankrupt(current),
            };
        }

        log::warn!("stabilize: successor dead and no predecessor known");

        StepOutcome::Stalled
    }

    /// Asks `peer` for the node responsible for our identifier.
    ///
    /// Returns `None` iff no live successor could be established.
    fn resolve_successor_via(&self, current: &Peer, peer: &Peer) -> Option<Peer> {
        match self.transport.open(peer).find_node(current.id()) {
            Ok(found) => found,
            Err(err) => {
                log::warn!("stabilize: join through {} failed: {}", peer, err);
                None
            }
        }
    }

    /// Asks `peer` for the node responsible for our identifier and adopts
    /// it as the sole successor.
    ///
    /// Returns `None` iff no live successor could be established; the
    /// routing state is only touched on success, in one write.
    fn join_via(&self, current: &Peer, peer: &Peer) -> Option<Peer> {
        let new_succ = self.resolve_successor_via(current, peer)?;

        {
            let mut routing = self.routing.lock().unwrap();
            routing.set_successors(NodeList::single(new_succ.clone()));
            routing.clear_predecessor();
        }

        self.watcher.watch(&new_succ);

        Some(new_succ)
    }

    /// The node cannot reach anybody who could lead it back into the ring.
    /// It resets to the alone state and stops its own schedule; re-joining
    /// requires a fresh bootstrap from the outside.
    fn bankrupt(&self, current: &Peer) -> StepOutcome {
        log::warn!("stabilize: no path back into the ring, going bankrupt");

        self.handle.stop();

        let mut routing = self.routing.lock().unwrap();
        routing.set_successors(NodeList::single(current.clone()));
        routing.clear_predecessor();

        StepOutcome::Bankrupt
    }

    /// Walks successor pointers starting at `succ` to collect up to
    /// [`SUCCESSOR_UNFOLD`] further successors.
    ///
    /// Stops early when a peer fails to answer, reports no successor, the
    /// walk wraps around the ring back to us, or a node repeats. Returns
    /// `None` iff the very first call failed, in which case the current
    /// list is kept as it is.
    ///
    /// [`SUCCESSOR_UNFOLD`]: constant.SUCCESSOR_UNFOLD.html
    fn unfold_successors(&self, current: &Peer, succ: &Peer) -> Option<NodeList> {
        let mut list = NodeList::single(succ.clone());
        let mut last = succ.clone();

        for collected in 0..SUCCESSOR_UNFOLD {
            let next = match self.transport.open(&last).your_successor() {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(err) => {
                    if collected == 0 {
                        log::warn!("stabilize: could not extend successor list: {}", err);
                        return None;
                    }

                    log::debug!("stabilize: successor walk stopped early: {}", err);
                    break;
                }
            };

            if next.id() == current.id() || list.contains(&next.id()) {
                // wrapped around the ring
                break;
            }

            list.insert(current, next.clone());
            last = next;
        }

        Some(list)
    }

    /// Hands every chunk this node no longer owns to its rightful
    /// custodian.
    ///
    /// A chunk leaves when the successor's range claims it or some other
    /// known node is a better custodian for its hash. The recipient is
    /// resolved through the ring, not guessed from the local view. Removal
    /// is all or nothing: if any transfer fails, the store is left
    /// untouched and the next tick retries the whole batch.
    fn immigrate_data(&self, current: &Peer) -> (usize, bool) {
        let snapshot = self.routing.lock().unwrap().clone();
        let succ = snapshot.nearest_successor();

        let chunks: Vec<(Key, Vec<u8>)> = {
            let store = self.store.lock().unwrap();
            store.iter().map(|(key, value)| (*key, value.clone())).collect()
        };

        let mut to_move = Vec::new();

        for (key, value) in chunks {
            let id = key.identifier();

            let claimed_by_successor = id.is_between(&current.id(), &succ.id());
            let better_custodian = snapshot.nearest_custodian(&id).id() != current.id();

            if claimed_by_successor || better_custodian {
                to_move.push((key, value, id));
            }
        }

        if to_move.is_empty() {
            return (0, false);
        }

        log::info!("stabilize: {} chunks no longer belong here", to_move.len());

        let home = self.transport.open(current);
        let mut moved = Vec::new();

        for (key, value, id) in &to_move {
            let recipient = match home.find_node(*id) {
                Ok(Some(recipient)) => recipient,
                Ok(None) | Err(_) => {
                    log::warn!("stabilize: no custodian found for chunk {}, keeping data", key);
                    return (0, true);
                }
            };

            if recipient.id() == current.id() {
                // the authoritative lookup put it back on our plate
                continue;
            }

            match self.transport.open(&recipient).set_chunk(key, value) {
                Ok(()) => moved.push(*key),
                Err(err) => {
                    log::warn!(
                        "stabilize: moving chunk {} to {} failed: {}, keeping data",
                        key,
                        recipient,
                        err
                    );
                    return (0, true);
                }
            }
        }

        let mut store = self.store.lock().unwrap();
        for key in &moved {
            store.remove(key);
        }

        if !moved.is_empty() {
            log::info!("stabilize: migrated {} chunks", moved.len());
        }

        (moved.len(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::identifier::Identifier;
    use crate::supervision::StopFlag;
    use std::collections::HashMap;

    #[derive(Clone)]
    enum Reply<T> {
        Answer(T),
        Unreachable,
    }

    /// What one scripted peer answers to each call
    #[derive(Clone)]
    struct PeerScript {
        living: bool,
        predecessor: Reply<Option<Peer>>,
        successor: Reply<Option<Peer>>,
        found_node: Reply<Option<Peer>>,
        accepts_chunks: bool,
    }

    impl Default for PeerScript {
        fn default() -> Self {
            PeerScript {
                living: true,
                predecessor: Reply::Answer(None),
                successor: Reply::Answer(None),
                found_node: Reply::Answer(None),
                accepts_chunks: true,
            }
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        CheckLiving(u8),
        YourPredecessor(u8),
        YourSuccessor(u8),
        Notify { to: u8, of: u8 },
        FindNode { via: u8 },
        SetChunk { to: u8, key: Key },
    }

    /// In-memory transport answering from peer scripts and recording every
    /// call in order
    #[derive(Clone, Default)]
    struct ScriptedTransport {
        scripts: Arc<Mutex<HashMap<Identifier, PeerScript>>>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl ScriptedTransport {
        fn script(&self, peer: &Peer, script: PeerScript) {
            self.scripts.lock().unwrap().insert(peer.id(), script);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        type Tx = ScriptedTransmitter;

        fn open(&self, peer: &Peer) -> ScriptedTransmitter {
            ScriptedTransmitter {
                peer: peer.clone(),
                transport: self.clone(),
            }
        }
    }

    struct ScriptedTransmitter {
        peer: Peer,
        transport: ScriptedTransport,
    }

    impl ScriptedTransmitter {
        fn record(&self, call: Call) {
            self.transport.calls.lock().unwrap().push(call);
        }

        fn script(&self) -> PeerScript {
            self.transport
                .scripts
                .lock()
                .unwrap()
                .get(&self.peer.id())
                .cloned()
                .unwrap_or_else(|| PeerScript {
                    living: false,
                    ..Default::default()
                })
        }
    }

    impl Transmitter for ScriptedTransmitter {
        fn check_living(&self) -> bool {
            self.record(Call::CheckLiving(tag(&self.peer)));
            self.script().living
        }

        fn your_predecessor(&self) -> crate::Result<Option<Peer>> {
            self.record(Call::YourPredecessor(tag(&self.peer)));

            match self.script().predecessor {
                Reply::Answer(peer) => Ok(peer),
                Reply::Unreachable => Err("peer unreachable".into()),
            }
        }

        fn your_successor(&self) -> crate::Result<Option<Peer>> {
            self.record(Call::YourSuccessor(tag(&self.peer)));

            match self.script().successor {
                Reply::Answer(peer) => Ok(peer),
                Reply::Unreachable => Err("peer unreachable".into()),
            }
        }

        fn notify(&self, current: &Peer) -> crate::Result<()> {
            self.record(Call::Notify {
                to: tag(&self.peer),
                of: tag(current),
            });

            Ok(())
        }

        fn find_node(&self, _target: Identifier) -> crate::Result<Option<Peer>> {
            self.record(Call::FindNode {
                via: tag(&self.peer),
            });

            match self.script().found_node {
                Reply::Answer(peer) => Ok(peer),
                Reply::Unreachable => Err("peer unreachable".into()),
            }
        }

        fn set_chunk(&self, key: &Key, _value: &[u8]) -> crate::Result<()> {
            self.record(Call::SetChunk {
                to: tag(&self.peer),
                key: *key,
            });

            if self.script().accepts_chunks {
                Ok(())
            } else {
                Err("chunk rejected".into())
            }
        }
    }

    #[derive(Clone, Default)]
    struct WatchLog {
        watched: Arc<Mutex<Vec<u8>>>,
        unwatched: Arc<Mutex<Vec<u8>>>,
    }

    impl WatchLog {
        fn watched(&self) -> Vec<u8> {
            self.watched.lock().unwrap().clone()
        }

        fn unwatched(&self) -> Vec<u8> {
            self.unwatched.lock().unwrap().clone()
        }
    }

    impl Watcher for WatchLog {
        fn watch(&self, peer: &Peer) {
            self.watched.lock().unwrap().push(tag(peer));
        }

        fn unwatch(&self, peer: &Peer) {
            self.unwatched.lock().unwrap().push(tag(peer));
        }
    }

    struct Fixture {
        stabilizer: Stabilizer<ScriptedTransport, WatchLog, Arc<StopFlag>>,
        transport: ScriptedTransport,
        watcher: WatchLog,
        flag: Arc<StopFlag>,
        routing: Arc<Mutex<Routing>>,
        store: Arc<Mutex<ChunkStore>>,
    }

    fn fixture(routing: Routing) -> Fixture {
        let routing = Arc::new(Mutex::new(routing));
        let store = Arc::new(Mutex::new(ChunkStore::new()));
        let transport = ScriptedTransport::default();
        let watcher = WatchLog::default();
        let flag = Arc::new(StopFlag::new());

        let stabilizer = Stabilizer::new(
            Arc::clone(&routing),
            Arc::clone(&store),
            transport.clone(),
            watcher.clone(),
            Arc::clone(&flag),
        );

        Fixture {
            stabilizer,
            transport,
            watcher,
            flag,
            routing,
            store,
        }
    }

    fn peer(byte: u8) -> Peer {
        Peer::with_id(
            Identifier::new(&[byte; 32]),
            format!("127.0.0.1:{}", 4000 + u16::from(byte))
                .parse()
                .unwrap(),
        )
    }

    fn tag(peer: &Peer) -> u8 {
        peer.id().as_bytes()[0]
    }

    fn ring(current: u8, successors: &[u8]) -> Routing {
        let me = peer(current);
        let mut routing = Routing::new(me.clone());
        routing.set_successors(NodeList::from_peers(
            &me,
            successors.iter().map(|&byte| peer(byte)),
        ));

        routing
    }

    fn successor_tags(routing: &Arc<Mutex<Routing>>) -> Vec<u8> {
        routing
            .lock()
            .unwrap()
            .successors()
            .iter()
            .map(tag)
            .collect()
    }

    #[test]
    fn alone_step_is_a_no_op() {
        let fx = fixture(ring(10, &[]));

        let outcome = fx.stabilizer.step();

        assert_eq!(outcome, StepOutcome::Alone);
        assert!(fx.transport.calls().is_empty());
        assert_eq!(successor_tags(&fx.routing), vec![10]);
        assert!(fx.routing.lock().unwrap().predecessor().is_none());
    }

    #[test]
    fn live_two_node_ring_notifies_and_extends() {
        let fx = fixture(ring(10, &[20]));
        fx.transport.script(
            &peer(20),
            PeerScript {
                predecessor: Reply::Answer(Some(peer(10))),
                successor: Reply::Answer(Some(peer(10))),
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(
            outcome,
            StepOutcome::Extended {
                migrated: 0,
                migration_failed: false,
            }
        );
        // the walk wrapped straight back to us, so the list stays [20]
        assert_eq!(successor_tags(&fx.routing), vec![20]);
        assert_eq!(
            fx.transport.calls(),
            vec![
                Call::CheckLiving(20),
                Call::YourPredecessor(20),
                Call::Notify { to: 20, of: 10 },
                Call::YourSuccessor(20),
            ]
        );
        assert_eq!(fx.watcher.watched(), vec![20]);
    }

    #[test]
    fn better_predecessor_narrows_and_notifies_the_new_node() {
        let fx = fixture(ring(10, &[30]));
        fx.transport.script(
            &peer(30),
            PeerScript {
                predecessor: Reply::Answer(Some(peer(20))),
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(outcome, StepOutcome::Narrowed);
        assert_eq!(successor_tags(&fx.routing), vec![20]);
        // the announcement goes to the discovered node, not the old successor
        assert_eq!(
            fx.transport.calls(),
            vec![
                Call::CheckLiving(30),
                Call::YourPredecessor(30),
                Call::Notify { to: 20, of: 10 },
            ]
        );
        assert_eq!(fx.watcher.watched(), vec![20]);
    }

    #[test]
    fn successor_reporting_us_as_predecessor_extends_the_list() {
        let fx = fixture(ring(10, &[20]));
        fx.transport.script(
            &peer(20),
            PeerScript {
                predecessor: Reply::Answer(Some(peer(10))),
                successor: Reply::Answer(Some(peer(30))),
                ..Default::default()
            },
        );
        fx.transport.script(
            &peer(30),
            PeerScript {
                successor: Reply::Answer(Some(peer(10))),
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(
            outcome,
            StepOutcome::Extended {
                migrated: 0,
                migration_failed: false,
            }
        );
        assert_eq!(successor_tags(&fx.routing), vec![20, 30]);
        assert_eq!(fx.watcher.watched(), vec![20, 30]);
    }

    #[test]
    fn dead_successor_with_spare_recovers_through_it() {
        let fx = fixture(ring(10, &[20, 30]));
        fx.transport.script(
            &peer(20),
            PeerScript {
                living: false,
                ..Default::default()
            },
        );
        fx.transport.script(
            &peer(30),
            PeerScript {
                found_node: Reply::Answer(Some(peer(30))),
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(outcome, StepOutcome::Recovered);
        assert_eq!(successor_tags(&fx.routing), vec![30]);
        assert_eq!(fx.watcher.unwatched(), vec![20]);
        assert_eq!(fx.watcher.watched(), vec![30]);
        assert_eq!(
            fx.transport.calls(),
            vec![Call::CheckLiving(20), Call::FindNode { via: 30 }]
        );
    }

    #[test]
    fn failed_recovery_keeps_the_trimmed_list_for_the_next_tick() {
        let fx = fixture(ring(10, &[20, 30]));
        fx.transport.script(
            &peer(20),
            PeerScript {
                living: false,
                ..Default::default()
            },
        );
        fx.transport.script(
            &peer(30),
            PeerScript {
                found_node: Reply::Unreachable,
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(outcome, StepOutcome::Recovered);
        assert_eq!(successor_tags(&fx.routing), vec![30]);
        assert!(!fx.flag.is_stopped());
    }

    #[test]
    fn dead_sole_successor_joins_through_predecessor() {
        let mut routing = ring(10, &[20]);
        routing.set_predecessor(peer(5));
        let fx = fixture(routing);
        fx.transport.script(
            &peer(20),
            PeerScript {
                living: false,
                ..Default::default()
            },
        );
        fx.transport.script(
            &peer(5),
            PeerScript {
                found_node: Reply::Answer(Some(peer(40))),
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(outcome, StepOutcome::JoinedViaPredecessor);
        assert_eq!(successor_tags(&fx.routing), vec![40]);
        assert!(fx.routing.lock().unwrap().predecessor().is_none());
        assert!(!fx.flag.is_stopped());
    }

    #[test]
    fn bankruptcy_resets_the_node_and_stops_the_schedule() {
        let mut routing = ring(10, &[20]);
        routing.set_predecessor(peer(5));
        let fx = fixture(routing);
        fx.transport.script(
            &peer(20),
            PeerScript {
                living: false,
                ..Default::default()
            },
        );
        fx.transport.script(
            &peer(5),
            PeerScript {
                found_node: Reply::Unreachable,
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(outcome, StepOutcome::Bankrupt);
        assert_eq!(successor_tags(&fx.routing), vec![10]);
        assert!(fx.routing.lock().unwrap().predecessor().is_none());
        assert!(fx.flag.is_stopped());
    }

    #[test]
    fn dead_successor_without_spare_or_predecessor_stalls() {
        let fx = fixture(ring(10, &[20]));
        fx.transport.script(
            &peer(20),
            PeerScript {
                living: false,
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(outcome, StepOutcome::Stalled);
        assert_eq!(successor_tags(&fx.routing), vec![20]);
        assert!(!fx.flag.is_stopped());
    }

    #[test]
    fn successor_failing_mid_step_leaves_the_state_unchanged() {
        let fx = fixture(ring(10, &[20]));
        fx.transport.script(
            &peer(20),
            PeerScript {
                predecessor: Reply::Unreachable,
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(outcome, StepOutcome::Stalled);
        assert_eq!(successor_tags(&fx.routing), vec![20]);
    }

    #[test]
    fn quiet_ring_makes_consecutive_steps_identical() {
        let fx = fixture(ring(10, &[20]));
        fx.transport.script(
            &peer(20),
            PeerScript {
                predecessor: Reply::Answer(Some(peer(10))),
                successor: Reply::Answer(Some(peer(10))),
                ..Default::default()
            },
        );

        let first = fx.stabilizer.step();
        let after_first = successor_tags(&fx.routing);
        let second = fx.stabilizer.step();
        let after_second = successor_tags(&fx.routing);

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        assert!(fx.routing.lock().unwrap().predecessor().is_none());
    }

    #[test]
    fn successor_walk_is_bounded() {
        let fx = fixture(ring(10, &[20]));
        fx.transport.script(
            &peer(20),
            PeerScript {
                predecessor: Reply::Answer(Some(peer(10))),
                successor: Reply::Answer(Some(peer(30))),
                ..Default::default()
            },
        );
        for (from, to) in &[(30, 40), (40, 50), (50, 60), (60, 70), (70, 80)] {
            fx.transport.script(
                &peer(*from),
                PeerScript {
                    successor: Reply::Answer(Some(peer(*to))),
                    ..Default::default()
                },
            );
        }

        fx.stabilizer.step();

        let walks = fx
            .transport
            .calls()
            .into_iter()
            .filter(|call| match call {
                Call::YourSuccessor(_) => true,
                _ => false,
            })
            .count();

        assert_eq!(walks, SUCCESSOR_UNFOLD);
        assert_eq!(successor_tags(&fx.routing), vec![20, 30, 40, 50, 60]);
    }

    #[test]
    fn failed_walk_keeps_the_previous_successor_list() {
        let fx = fixture(ring(10, &[20, 30]));
        fx.transport.script(
            &peer(20),
            PeerScript {
                predecessor: Reply::Answer(Some(peer(10))),
                successor: Reply::Unreachable,
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(
            outcome,
            StepOutcome::Extended {
                migrated: 0,
                migration_failed: false,
            }
        );
        assert_eq!(successor_tags(&fx.routing), vec![20, 30]);
    }

    fn bracket(id: Identifier, below: u8, above: u8) -> (Identifier, Identifier) {
        let first = id.as_bytes()[0];

        let mut lo = [0u8; 32];
        lo[0] = first.wrapping_sub(below);
        let mut hi = [0u8; 32];
        hi[0] = first.wrapping_add(above);

        (Identifier::new(&lo), Identifier::new(&hi))
    }

    fn chunk_ring(key: Key) -> (Peer, Peer, Routing) {
        let (lo, hi) = bracket(key.identifier(), 1, 1);

        let current = Peer::with_id(lo, "127.0.0.1:4100".parse().unwrap());
        let successor = Peer::with_id(hi, "127.0.0.1:4200".parse().unwrap());

        let mut routing = Routing::new(current.clone());
        routing.set_successors(NodeList::from_peers(
            &current,
            vec![successor.clone()],
        ));

        (current, successor, routing)
    }

    #[test]
    fn chunk_claimed_by_the_successor_is_migrated() {
        let key = Key { raw: [1; 32] };
        let (current, successor, routing) = chunk_ring(key);

        let fx = fixture(routing);
        fx.store.lock().unwrap().insert(key, vec![9, 9, 9]);
        fx.transport.script(
            &successor,
            PeerScript {
                predecessor: Reply::Answer(Some(current.clone())),
                ..Default::default()
            },
        );
        fx.transport.script(
            &current,
            PeerScript {
                found_node: Reply::Answer(Some(successor.clone())),
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(
            outcome,
            StepOutcome::Extended {
                migrated: 1,
                migration_failed: false,
            }
        );
        assert!(fx.store.lock().unwrap().is_empty());
        assert!(fx.transport.calls().contains(&Call::SetChunk {
            to: tag(&successor),
            key,
        }));
    }

    #[test]
    fn failed_transfer_keeps_every_chunk_for_the_next_tick() {
        let key = Key { raw: [1; 32] };
        let (current, successor, routing) = chunk_ring(key);

        let fx = fixture(routing);
        fx.store.lock().unwrap().insert(key, vec![9, 9, 9]);
        fx.transport.script(
            &successor,
            PeerScript {
                predecessor: Reply::Answer(Some(current.clone())),
                accepts_chunks: false,
                ..Default::default()
            },
        );
        fx.transport.script(
            &current,
            PeerScript {
                found_node: Reply::Answer(Some(successor.clone())),
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(
            outcome,
            StepOutcome::Extended {
                migrated: 0,
                migration_failed: true,
            }
        );
        assert_eq!(fx.store.lock().unwrap().len(), 1);
    }

    #[test]
    fn chunk_resolving_back_to_this_node_is_kept() {
        let key = Key { raw: [1; 32] };
        let (current, successor, routing) = chunk_ring(key);

        let fx = fixture(routing);
        fx.store.lock().unwrap().insert(key, vec![9, 9, 9]);
        fx.transport.script(
            &successor,
            PeerScript {
                predecessor: Reply::Answer(Some(current.clone())),
                ..Default::default()
            },
        );
        fx.transport.script(
            &current,
            PeerScript {
                found_node: Reply::Answer(Some(current.clone())),
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(
            outcome,
            StepOutcome::Extended {
                migrated: 0,
                migration_failed: false,
            }
        );
        assert_eq!(fx.store.lock().unwrap().len(), 1);
    }

    #[test]
    fn owned_chunk_stays_without_any_lookup() {
        let key = Key { raw: [1; 32] };

        // lay the ring out so the chunk's hash falls just below us
        let (_, just_above) = bracket(key.identifier(), 1, 1);
        let (_, further) = bracket(key.identifier(), 1, 2);
        let current = Peer::with_id(just_above, "127.0.0.1:4100".parse().unwrap());
        let successor = Peer::with_id(further, "127.0.0.1:4200".parse().unwrap());

        let mut routing = Routing::new(current.clone());
        routing.set_successors(NodeList::from_peers(&current, vec![successor.clone()]));

        let fx = fixture(routing);
        fx.store.lock().unwrap().insert(key, vec![9, 9, 9]);
        fx.transport.script(
            &successor,
            PeerScript {
                predecessor: Reply::Answer(Some(current.clone())),
                ..Default::default()
            },
        );

        let outcome = fx.stabilizer.step();

        assert_eq!(
            outcome,
            StepOutcome::Extended {
                migrated: 0,
                migration_failed: false,
            }
        );
        assert_eq!(fx.store.lock().unwrap().len(), 1);
        assert!(!fx
            .transport
            .calls()
            .iter()
            .any(|call| match call {
                Call::FindNode { .. } | Call::SetChunk { .. } => true,
                _ => false,
            }));
    }
}

