//! Custom error types
//!
//! The [`MessageError`] is used when a peer replied with an unexpected
//! message type. Transport failures keep their [`io::Error`] and are always
//! recovered inside the stabilization step that observed them.
//!
//! [`MessageError`]: struct.MessageError.html
//! [`io::Error`]: https://doc.rust-lang.org/std/io/struct.Error.html

use crate::message::Message;
use std::error::Error;
use std::fmt;

/// Error type to use when an unexpected message has been received
///
/// A specific [`Message`] object needs to be available for this error type.
/// If no valid message has been received yet, one should use a different
/// error type like [`io::Error`].
///
/// [`Message`]: ../message/enum.Message.html
/// [`io::Error`]: https://doc.rust-lang.org/std/io/struct.Error.html
#[derive(Debug)]
pub struct MessageError {
    msg: Message,
}

impl MessageError {
    /// Creates a new message error from the offending message.
    pub fn new(msg: Message) -> Self {
        MessageError { msg }
    }
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Unexpected message type {}", self.msg)
    }
}

impl Error for MessageError {}
