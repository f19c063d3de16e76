//! Networking abstraction layer for TCP connections
//!
//! This module provides some nice abstraction from raw TCP sockets to
//! connections allowing to send and receive [`Message`] objects.
//! Furthermore, it includes parallel handling of incoming connections using
//! a thread pool and the abstraction of handlers.
//!
//! [`Message`]: ../message/enum.Message.html

use crate::message::Message;
use byteorder::{NetworkEndian, ReadBytesExt};
use std::io;
use std::io::prelude::*;
use std::net::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use threadpool::ThreadPool;

/// A connection between two peers to send Message objects via TCP
pub struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl Connection {
    /// Opens a TCP connection to a remote peer.
    ///
    /// `timeout_ms` is the timeout in milliseconds for the connection
    /// attempt as well as for read and write operations. See
    /// [`TcpStream::set_read_timeout`] and [`TcpStream::set_write_timeout`]
    /// for further documentation.
    ///
    /// [`TcpStream::set_read_timeout`]:
    /// https://doc.rust-lang.org/std/net/struct.TcpStream.html#method.set_read_timeout
    /// [`TcpStream::set_write_timeout`]:
    /// https://doc.rust-lang.org/std/net/struct.TcpStream.html#method.set_write_timeout
    pub fn open(addr: SocketAddr, timeout_ms: u64) -> io::Result<Self> {
        let timeout = Duration::from_millis(timeout_ms);

        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        Ok(Self::from_stream(stream))
    }

    pub(crate) fn from_stream(stream: TcpStream) -> Self {
        let buffer = Vec::with_capacity(Message::MAX_LENGTH);
        Self { stream, buffer }
    }

    /// Receives a message from the remote peer.
    ///
    /// Reads the two size bytes first and then exactly the announced number
    /// of bytes, so several messages can follow each other on one stream.
    /// This operation blocks until a full message has been received or the
    /// read timeout fires.
    pub fn receive(&mut self) -> io::Result<Message> {
        let mut header = [0; 2];
        self.stream.read_exact(&mut header)?;

        let size = (&header[..]).read_u16::<NetworkEndian>()? as usize;

        if size < 4 || size > Message::MAX_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid message size",
            ));
        }

        self.buffer.clear();
        self.buffer.extend_from_slice(&header);
        self.buffer.resize(size, 0);
        self.stream.read_exact(&mut self.buffer[2..])?;

        Message::parse(self.buffer.as_slice())
    }

    /// Sends a message to the remote peer.
    ///
    /// This operation is blocking until the message has been sent.
    pub fn send(&mut self, msg: &Message) -> io::Result<()> {
        self.buffer.clear();
        msg.write_bytes(&mut self.buffer)?;
        self.stream.write_all(self.buffer.as_slice())
    }

    /// Returns the socket address of the remote peer of this TCP connection.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Shuts down the read and write part of this connection.
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

/// A trait to handle incoming requests from a [`Server`].
///
/// The methods [`handle_connection`] and [`handle_error`] are called based on
/// the success of the incoming request.
///
/// [`Server`]: struct.Server.html
/// [`handle_connection`]: #tymethod.handle_connection
/// [`handle_error`]: #tymethod.handle_error
pub trait ServerHandler {
    /// A connection has been established with some remote peer.
    ///
    /// The handler can exchange messages with the peer via the given
    /// `connection` object.
    fn handle_connection(&self, connection: Connection);

    /// The incoming request was unsuccessful and an error was raised.
    fn handle_error(&self, error: io::Error);

    /// Handles an incoming connection.
    ///
    /// Depending on the `result` this either calls [`handle_error`] or
    /// creates a new [`Connection`] from the given [`TcpStream`] and
    /// calls [`handle_connection`].
    ///
    /// [`handle_error`]: #tymethod.handle_error
    /// [`Connection`]: struct.Connection.html
    /// [`handle_connection`]: #tymethod.handle_connection
    fn handle_incoming(&self, result: io::Result<TcpStream>) {
        match result {
            Ok(stream) => {
                let connection = Connection::from_stream(stream);
                self.handle_connection(connection)
            }
            Err(error) => self.handle_error(error),
        }
    }
}

/// A multithreaded server waiting for connections
pub struct Server {
    handler: Arc<dyn ServerHandler + Send + Sync>,
}

impl Server {
    /// Creates a new server for the given handler.
    ///
    /// The [`ServerHandler`] must also implement [`Send`] and [`Sync`] to
    /// ensure it can be shared between threads.
    ///
    /// [`ServerHandler`]: trait.ServerHandler.html
    /// [`Send`]: https://doc.rust-lang.org/std/marker/trait.Send.html
    /// [`Sync`]: https://doc.rust-lang.org/std/marker/trait.Sync.html
    pub fn new(handler: Arc<dyn ServerHandler + Send + Sync>) -> Self {
        Self { handler }
    }

    /// Listens on the given socket address.
    ///
    /// `num_workers` defines the number of worker threads which handle
    /// incoming requests in parallel.
    pub fn listen<A: ToSocketAddrs>(
        self,
        addr: A,
        num_workers: usize,
    ) -> io::Result<thread::JoinHandle<()>> {
        let listener = TcpListener::bind(addr)?;

        Ok(self.serve(listener, num_workers))
    }

    /// Serves connections accepted from an already bound listener.
    ///
    /// Binding separately allows callers to listen on an ephemeral port and
    /// read the actual address before the accept loop starts.
    pub fn serve(self, listener: TcpListener, num_workers: usize) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let pool = ThreadPool::new(num_workers);

            for result in listener.incoming() {
                let handler = Arc::clone(&self.handler);
                pool.execute(move || {
                    handler.handle_incoming(result);
                });
            }
        })
    }
}
