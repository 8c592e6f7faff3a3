//! Blocking Connection
//!
//! One `std::net::TcpStream` per shard. Commands are encoded into a buffered
//! writer and replies are pulled, one at a time, by a [`SyncReader`] over a
//! clone of the same socket.
//!
//! ## Read Timeouts
//!
//! Every read runs under the shard's finite read timeout, except blocking
//! commands such as `BLPOP`, which may legitimately wait forever. Those run
//! inside a [`TimeoutGuard`] that clears the timeout and puts it back when it
//! is dropped, so the finite timeout is restored on every exit path.
//!
//! ## Teardown
//!
//! A timeout, a decode error, a pipeline desync or an I/O failure leaves the
//! stream in an unknown position. The connection is closed before the error is
//! returned; the next command reconnects.

use crate::config::ShardDescriptor;
use crate::connection::error::is_timeout;
use crate::connection::{ConnectionError, PipelineState};
use crate::protocol::{Command, ReadError, Reply, SyncReader, Verb};
use std::io::{self, BufReader, BufWriter, Write};
use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Capacity of the buffered writer (8 KB)
const WRITE_BUFFER_SIZE: usize = 8 * 1024;

/// Capacity of the buffered reader (8 KB)
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// A zero read timeout means "wait forever".
pub(crate) fn finite_timeout(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

struct Socket {
    writer: BufWriter<TcpStream>,
    reader: SyncReader<BufReader<TcpStream>>,
}

/// A blocking connection to one shard.
///
/// # Example
///
/// ```ignore
/// use shardis::{Command, Connection, ShardDescriptor, Verb};
///
/// let mut conn = Connection::new(ShardDescriptor::new("127.0.0.1", 6379));
/// conn.connect()?;
/// let reply = conn.execute(&Command::new(Verb::Ping))?;
/// ```
pub struct Connection {
    shard: ShardDescriptor,
    socket: Option<Socket>,
    state: PipelineState,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("shard", &self.shard)
            .field("connected", &self.is_connected())
            .field("state", &self.state)
            .finish()
    }
}

impl Connection {
    /// Creates a disconnected connection. Nothing touches the network until
    /// [`connect`](Self::connect) or the first command.
    pub fn new(shard: ShardDescriptor) -> Self {
        Self {
            shard,
            socket: None,
            state: PipelineState::default(),
        }
    }

    pub fn shard(&self) -> &ShardDescriptor {
        &self.shard
    }

    /// Opens the socket. Does nothing if already connected.
    ///
    /// If the shard carries a password, `AUTH` is sent before returning and a
    /// rejection closes the connection again.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let addr = self.shard.addr();
        let stream = TcpStream::connect(&addr).map_err(|source| ConnectionError::Connect {
            addr: addr.clone(),
            source,
        })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(finite_timeout(self.shard.read_timeout))?;
        let read_half = stream.try_clone()?;

        self.socket = Some(Socket {
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, stream),
            reader: SyncReader::new(BufReader::with_capacity(READ_BUFFER_SIZE, read_half)),
        });
        self.state.reset();
        info!(shard = %addr, "Connected");

        if let Some(password) = self.shard.password.clone() {
            self.authenticate(password)?;
        }
        Ok(())
    }

    fn authenticate(&mut self, password: String) -> Result<(), ConnectionError> {
        let pipelining = self.state.is_pipelining();
        self.state.set_pipelining(false);

        let auth = Command::new(Verb::Auth).arg(password);
        let result = self.send_command(&auth).and_then(|_| self.read_reply());
        self.state.set_pipelining(pipelining);

        if let Err(e) = result {
            warn!(shard = %self.shard.addr(), error = %e, "Authentication failed");
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    /// Closes the socket. Safe to call when already closed.
    ///
    /// Buffered but unflushed commands are discarded.
    pub fn disconnect(&mut self) {
        if let Some(socket) = self.socket.take() {
            let (stream, _unflushed) = socket.writer.into_parts();
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                trace!(error = %e, "Shutdown on a closed socket");
            }
            info!(shard = %self.shard.addr(), "Disconnected");
        }
        self.state.reset();
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Writes one command, connecting first if needed.
    ///
    /// Without pipelining the write is flushed at once. With pipelining it is
    /// buffered until the next read or [`drain`](Self::drain).
    pub fn send_command(&mut self, command: &Command) -> Result<(), ConnectionError> {
        self.connect()?;
        if let Err(e) = self.state.on_send() {
            return Err(self.teardown(e));
        }

        debug!(
            shard = %self.shard.addr(),
            verb = %command.verb(),
            in_flight = self.state.in_flight(),
            "Sending command"
        );

        let flush = !self.state.is_pipelining();
        match self.write(command, flush) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.teardown(e)),
        }
    }

    fn write(&mut self, command: &Command, flush: bool) -> Result<(), ConnectionError> {
        let socket = self.socket.as_mut().ok_or(ConnectionError::Closed)?;
        let bytes = command.encode();
        socket.writer.write_all(&bytes)?;
        if flush {
            socket.writer.flush()?;
        }
        trace!(bytes = bytes.len(), flushed = flush, "Wrote command");
        Ok(())
    }

    /// Reads the next reply, returning error replies as values.
    pub fn read_raw_reply(&mut self) -> Result<Reply, ConnectionError> {
        match self.read_one() {
            Ok(reply) => Ok(reply),
            Err(e) => Err(self.teardown(e)),
        }
    }

    /// Reads the next reply. An error reply becomes [`ConnectionError::Server`].
    pub fn read_reply(&mut self) -> Result<Reply, ConnectionError> {
        match self.read_raw_reply()? {
            Reply::Error(message) => Err(ConnectionError::Server(message)),
            reply => Ok(reply),
        }
    }

    fn read_one(&mut self) -> Result<Reply, ConnectionError> {
        let timeout = self.shard.read_timeout;
        let socket = self.socket.as_mut().ok_or(ConnectionError::Closed)?;
        self.state.on_reply()?;
        socket.writer.flush()?;

        socket.reader.read_reply().map_err(|e| match e {
            ReadError::Io(io) if is_timeout(&io) => ConnectionError::Timeout(timeout),
            other => other.into(),
        })
    }

    /// Sends a command and reads its reply.
    ///
    /// Blocking verbs are run through [`blocking_command`](Self::blocking_command).
    pub fn execute(&mut self, command: &Command) -> Result<Reply, ConnectionError> {
        if command.verb().is_blocking() {
            return self.blocking_command(command);
        }
        self.ensure_idle()?;
        self.send_command(command)?;
        self.read_reply()
    }

    /// Sends a command and waits for its reply with no read timeout.
    ///
    /// The finite timeout is back in place when this returns, whether the
    /// reply was data, absent, an error reply or a failure.
    pub fn blocking_command(&mut self, command: &Command) -> Result<Reply, ConnectionError> {
        self.connect()?;
        self.ensure_idle()?;

        let _guard = self.infinite_timeout()?;
        self.send_command(command)?;
        self.read_reply()
    }

    fn infinite_timeout(&self) -> Result<TimeoutGuard, ConnectionError> {
        let socket = self.socket.as_ref().ok_or(ConnectionError::Closed)?;
        let restore = finite_timeout(self.shard.read_timeout);
        Ok(TimeoutGuard::infinite(socket.writer.get_ref(), restore)?)
    }

    fn ensure_idle(&mut self) -> Result<(), ConnectionError> {
        if self.state.in_flight() > 0 {
            let err = ConnectionError::PipelineDesync("execute called with replies still unread");
            return Err(self.teardown(err));
        }
        Ok(())
    }

    /// Turns pipelining on or off. [`drain`](Self::drain) turns it off again.
    pub fn set_pipelining(&mut self, enabled: bool) {
        self.state.set_pipelining(enabled);
    }

    pub fn is_pipelining(&self) -> bool {
        self.state.is_pipelining()
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight()
    }

    /// Flushes buffered commands and reads one reply for each, in send order.
    ///
    /// Error replies are returned in place rather than failing the whole
    /// batch. Afterwards nothing is in flight and pipelining is off.
    pub fn drain(&mut self) -> Result<Vec<Reply>, ConnectionError> {
        let pending = self.state.in_flight();
        let mut replies = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.read_raw_reply() {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    // The batch is over either way.
                    self.state.finish_drain();
                    return Err(e);
                }
            }
        }
        self.state.finish_drain();

        debug!(shard = %self.shard.addr(), replies = replies.len(), "Drained pipeline");
        Ok(replies)
    }

    /// The read timeout currently set on the socket. `None` means infinite.
    pub fn read_timeout(&self) -> Result<Option<Duration>, ConnectionError> {
        let socket = self.socket.as_ref().ok_or(ConnectionError::Closed)?;
        Ok(socket.writer.get_ref().read_timeout()?)
    }

    fn teardown(&mut self, err: ConnectionError) -> ConnectionError {
        if err.is_fatal() {
            warn!(shard = %self.shard.addr(), error = %err, "Tearing down connection");
            self.disconnect();
        }
        err
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Clears the socket's read timeout for as long as it lives.
///
/// Socket options are shared by every clone of a socket, so the guard keeps a
/// clone of its own and needs no borrow of the connection.
struct TimeoutGuard {
    stream: TcpStream,
    restore: Option<Duration>,
}

impl TimeoutGuard {
    fn infinite(stream: &TcpStream, restore: Option<Duration>) -> io::Result<Self> {
        let stream = stream.try_clone()?;
        stream.set_read_timeout(None)?;
        trace!("Read timeout cleared");
        Ok(Self { stream, restore })
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        match self.stream.set_read_timeout(self.restore) {
            Ok(()) => trace!(timeout = ?self.restore, "Read timeout restored"),
            Err(e) => debug!(error = %e, "Could not restore read timeout"),
        }
    }
}
