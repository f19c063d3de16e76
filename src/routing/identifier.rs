//! This module allows to obtain identifiers from different data structures.
//!
//! The [`Identifier`] struct represents a 256 bit identifier obtained using
//! the SHA256 hashing algorithm. The identifier is meant to be part of an
//! identifier circle consisting of all non-negative integers modulo 2^256.
//!
//! Using the [`Identify`] trait, different data structures like ip addresses
//! can be associated with an identifier and stored accordingly.
//!
//! [`Identifier`]: struct.Identifier.html
//! [`Identify`]: trait.Identify.html

use crate::storage::Key;
use bigint::U256;
use ring::digest;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};

/// A 256 bit identifier on an identifier circle
#[derive(Copy, Clone, PartialEq)]
pub struct Identifier(U256);

impl Identifier {
    /// Creates a new identifier from a byte slice.
    ///
    /// This method does not perform any hashing but interprets the bytes as
    /// a raw identifier.
    ///
    /// # Panics
    ///
    /// Panics if the slice does not contain exactly 32 elements.
    pub fn new(identifier: &[u8]) -> Self {
        Identifier(U256::from_big_endian(identifier))
    }

    fn generate(bytes: &[u8]) -> Self {
        let dig = digest::digest(&digest::SHA256, bytes);
        Self::new(dig.as_ref())
    }

    /// Returns whether this identifier is between `first` and `second` on the
    /// identifier circle, excluding `first` but including `second`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chord_overlay::routing::identifier::Identifier;
    /// #
    /// let id1 = Identifier::new(&[1; 32]);
    /// let id2 = Identifier::new(&[2; 32]);
    /// let id3 = Identifier::new(&[3; 32]);
    ///
    /// assert!(id2.is_between(&id1, &id3));
    /// assert!(id3.is_between(&id2, &id1));
    /// assert!(!id3.is_between(&id1, &id2));
    /// assert!(id3.is_between(&id1, &id3));
    /// assert!(!id1.is_between(&id1, &id3));
    /// ```
    pub fn is_between(&self, first: &Identifier, second: &Identifier) -> bool {
        let (diff1, _) = second.0.overflowing_sub(self.0);
        let (diff2, _) = second.0.overflowing_sub(first.0);

        diff1 < diff2
    }

    /// Returns whether this identifier lies strictly between `first` and
    /// `second` on the identifier circle, excluding both endpoints.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chord_overlay::routing::identifier::Identifier;
    /// #
    /// let id1 = Identifier::new(&[1; 32]);
    /// let id2 = Identifier::new(&[2; 32]);
    /// let id3 = Identifier::new(&[3; 32]);
    ///
    /// assert!(id2.is_between_exclusive(&id1, &id3));
    /// assert!(!id3.is_between_exclusive(&id1, &id3));
    /// assert!(!id1.is_between_exclusive(&id1, &id3));
    /// ```
    pub fn is_between_exclusive(&self, first: &Identifier, second: &Identifier) -> bool {
        *self != *second && self.is_between(first, second)
    }

    /// Calculate the distance to the given offset in positive direction.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chord_overlay::routing::identifier::Identifier;
    /// #
    /// let id1 = Identifier::new(&[5; 32]);
    /// let id2 = Identifier::new(&[1; 32]);
    ///
    /// let offset = Identifier::new(&[4; 32]);
    ///
    /// assert_eq!(offset, id1.offset(&id2));
    /// ```
    pub fn offset(&self, base: &Identifier) -> Identifier {
        let (diff, _) = self.0.overflowing_sub(base.0);

        Identifier(diff)
    }

    /// Returns the number of leading zero bits of this identifier.
    pub fn leading_zeros(&self) -> u32 {
        self.0.leading_zeros()
    }

    /// Returns the raw bytes of this identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chord_overlay::routing::identifier::Identifier;
    /// #
    /// let id = Identifier::new(&[5; 32]);
    ///
    /// assert_eq!([5; 32], id.as_bytes());
    /// ```
    pub fn as_bytes(&self) -> [u8; 32] {
        let mut bytes = [0; 32];
        self.0.to_big_endian(&mut bytes);
        bytes
    }
}

impl Eq for Identifier {}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Identifier) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        (self.0).0.fmt(f)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        for byte in self.as_bytes().iter() {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

/// Trait to obtain an identifier from a data structure
pub trait Identify {
    /// Generates an identifier for this object.
    fn identifier(&self) -> Identifier;
}

/// Obtains an identifier by hashing the four octets of the ip address and
/// the port.
impl Identify for SocketAddrV4 {
    fn identifier(&self) -> Identifier {
        let mut bytes = [0; 6];
        bytes[..4].copy_from_slice(&self.ip().octets());
        bytes[4..].copy_from_slice(&self.port().to_be_bytes());
        Identifier::generate(&bytes)
    }
}

/// Obtains an identifier by hashing the 16 octets of the ip address and the
/// port.
impl Identify for SocketAddrV6 {
    fn identifier(&self) -> Identifier {
        let mut bytes = [0; 18];
        bytes[..16].copy_from_slice(&self.ip().octets());
        bytes[16..].copy_from_slice(&self.port().to_be_bytes());
        Identifier::generate(&bytes)
    }
}

/// Get the identifier for a V4 or V6 socket address.
impl Identify for SocketAddr {
    fn identifier(&self) -> Identifier {
        match self {
            SocketAddr::V4(v4) => v4.identifier(),
            SocketAddr::V6(v6) => v6.identifier(),
        }
    }
}

/// Hashes the raw key bytes.
impl Identify for Key {
    fn identifier(&self) -> Identifier {
        Identifier::generate(&self.raw)
    }
}
