//! Local chunk storage shared between the request handler and the stabilizer.

use std::collections::HashMap;
use std::fmt;

/// A 32 byte key under which a chunk is stored
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Key {
    pub raw: [u8; 32],
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // the first eight bytes are enough to tell keys apart in logs
        for byte in self.raw.iter().take(8) {
            write!(f, "{:02x}", byte)?;
        }

        write!(f, "..")
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The chunks held by this node, keyed by their raw key
pub type ChunkStore = HashMap<Key, Vec<u8>>;
