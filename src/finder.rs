//! The lookup routing decision.
//!
//! Deciding who answers a lookup is the one place where stabilization and
//! routing meet, so it is kept as a pure procedure with no state and no I/O:
//! given the target identifier, our own identity and our current successor,
//! exactly one of three continuations is invoked. The serving side in
//! [`handler::p2p`] injects the continuations that reply or forward over the
//! network; tests inject markers.
//!
//! [`handler::p2p`]: ../handler/index.html

use crate::routing::identifier::Identifier;
use crate::routing::Peer;

/// Decides who is responsible for `target`.
///
/// * the node itself, when it is alone on the ring or the target is its own
///   identifier,
/// * its immediate successor, when the target falls into the range between
///   the node and the successor,
/// * some node further along the circle otherwise; the caller is expected to
///   forward to its closest known node preceding the target.
pub fn judge<R>(
    target: Identifier,
    current: &Peer,
    successor: &Peer,
    on_self_owns: impl FnOnce() -> R,
    on_successor_owns: impl FnOnce() -> R,
    on_forward: impl FnOnce() -> R,
) -> R {
    if successor.id() == current.id() || target == current.id() {
        on_self_owns()
    } else if target.is_between(&current.id(), &successor.id()) {
        on_successor_owns()
    } else {
        on_forward()
    }
}
