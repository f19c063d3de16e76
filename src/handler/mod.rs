//! This module contains the interface for peer-to-peer requests
//!
//! The [`P2PHandler`] implements the [`ServerHandler`] trait and can be used
//! as handler for an instance of the [`Server`] struct.
//!
//! [`P2PHandler`]: struct.P2PHandler.html
//! [`ServerHandler`]: ../network/trait.ServerHandler.html
//! [`Server`]: ../network/struct.Server.html

pub use self::p2p::P2PHandler;

mod p2p;
