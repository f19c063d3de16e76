//! An ordered list of peers as seen from one node on the identifier circle.

use super::identifier::Identifier;
use super::Peer;

/// A non-empty list of peers ordered by clockwise distance from the owner
///
/// The list never contains two peers with the same identifier. Both the
/// successor list and the finger list of a node are kept in this form; all
/// queries take the owning peer as a parameter since the ordering is relative
/// to it.
#[derive(Clone, Debug)]
pub struct NodeList {
    entries: Vec<Peer>,
}

impl NodeList {
    /// Creates a list containing only the given peer.
    pub fn single(peer: Peer) -> Self {
        NodeList {
            entries: vec![peer],
        }
    }

    /// Creates a list from the owner and a sequence of peers.
    ///
    /// The peers are inserted in clockwise order from `current`; duplicates
    /// are dropped. An empty sequence yields `[current]`.
    pub fn from_peers<I: IntoIterator<Item = Peer>>(current: &Peer, peers: I) -> Self {
        let mut list = NodeList {
            entries: Vec::new(),
        };

        for peer in peers {
            list.insert(current, peer);
        }

        if list.entries.is_empty() {
            list.entries.push(current.clone());
        }

        list
    }

    /// Returns the first peer after `current` on the circle.
    ///
    /// If the list contains no peer other than `current` itself, `current`
    /// is returned.
    pub fn nearest_successor(&self, current: &Peer) -> Peer {
        self.entries
            .iter()
            .find(|peer| peer.id() != current.id())
            .cloned()
            .unwrap_or_else(|| current.clone())
    }

    /// Returns a new list with the nearest successor removed.
    ///
    /// The result is never empty; removing the last remaining peer yields
    /// `[current]`.
    pub fn kill_nearest(&self, current: &Peer) -> NodeList {
        let nearest = self.nearest_successor(current);

        let entries: Vec<Peer> = self
            .entries
            .iter()
            .filter(|peer| peer.id() != nearest.id())
            .cloned()
            .collect();

        if entries.is_empty() {
            NodeList::single(current.clone())
        } else {
            NodeList { entries }
        }
    }

    /// Inserts a peer, keeping the clockwise ordering from `current`.
    ///
    /// A peer whose identifier is already present is dropped.
    pub fn insert(&mut self, current: &Peer, peer: Peer) {
        if self.entries.iter().any(|entry| entry.id() == peer.id()) {
            return;
        }

        let offset = peer.id().offset(&current.id());
        let position = self
            .entries
            .iter()
            .position(|entry| offset < entry.id().offset(&current.id()))
            .unwrap_or_else(|| self.entries.len());

        self.entries.insert(position, peer);
    }

    /// Returns the peer from this list closest before `target`, if any peer
    /// precedes it more closely than `best` does.
    pub(crate) fn refine_preceding(&self, target: &Identifier, mut best: Peer) -> Peer {
        for peer in &self.entries {
            if target.offset(&peer.id()) < target.offset(&best.id()) {
                best = peer.clone();
            }
        }

        best
    }

    /// Returns the peer from this list closest at or after `target`, if any
    /// peer succeeds it more closely than `best` does.
    pub(crate) fn refine_custodian(&self, target: &Identifier, mut best: Peer) -> Peer {
        for peer in &self.entries {
            if peer.id().offset(target) < best.id().offset(target) {
                best = peer.clone();
            }
        }

        best
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.entries.iter()
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.entries.iter().any(|entry| entry.id() == *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn peer(byte: u8) -> Peer {
        let addr: SocketAddr = format!("127.0.0.1:{}", 4000 + u16::from(byte))
            .parse()
            .unwrap();
        Peer::with_id(Identifier::new(&[byte; 32]), addr)
    }

    #[test]
    fn nearest_successor_skips_the_owner() {
        let owner = peer(10);
        let list = NodeList::from_peers(&owner, vec![owner.clone(), peer(20)]);

        assert_eq!(list.nearest_successor(&owner).id(), peer(20).id());
    }

    #[test]
    fn nearest_successor_of_singleton_is_the_owner() {
        let owner = peer(10);
        let list = NodeList::single(owner.clone());

        assert_eq!(list.nearest_successor(&owner).id(), owner.id());
    }

    #[test]
    fn kill_nearest_never_empties_the_list() {
        let owner = peer(10);
        let list = NodeList::single(peer(20));

        let killed = list.kill_nearest(&owner);

        assert_eq!(killed.len(), 1);
        assert_eq!(killed.nearest_successor(&owner).id(), owner.id());
    }

    #[test]
    fn kill_nearest_promotes_the_spare() {
        let owner = peer(10);
        let list = NodeList::from_peers(&owner, vec![peer(20), peer(30)]);

        let killed = list.kill_nearest(&owner);

        assert_eq!(killed.len(), 1);
        assert_eq!(killed.nearest_successor(&owner).id(), peer(30).id());
    }

    #[test]
    fn insert_keeps_clockwise_order_and_deduplicates() {
        let owner = peer(100);
        let mut list = NodeList::single(peer(120));

        // 5 wraps around zero and therefore sorts after 120 as seen from 100
        list.insert(&owner, peer(5));
        list.insert(&owner, peer(110));
        list.insert(&owner, peer(110));

        let ids: Vec<_> = list.iter().map(|p| p.id()).collect();
        assert_eq!(
            ids,
            vec![peer(110).id(), peer(120).id(), peer(5).id()]
        );
    }
}
