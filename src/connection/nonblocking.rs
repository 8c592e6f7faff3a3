//! Async Connection
//!
//! The tokio flavor of [`Connection`](super::Connection). The socket is split
//! in two: the write half stays with the connection, and the read half is moved
//! into a reader task.
//!
//! ```text
//!   send_command ──> BufWriter<OwnedWriteHalf> ──> socket
//!
//!   socket ──> reader task ──> StreamFramer ──> mpsc (bounded) ──> read_reply
//! ```
//!
//! The reader task pushes whatever bytes arrive into a [`StreamFramer`] and
//! forwards each complete reply. When the queue is full the task waits for
//! room, so replies are never dropped and TCP backpressure reaches the server.
//!
//! Deadlines are per call: [`AsyncConnection::read_reply`] uses the shard's
//! read timeout, and blocking verbs pass `None` to wait forever.

use crate::config::{ShardDescriptor, DEFAULT_REPLY_QUEUE_CAPACITY};
use crate::connection::blocking::finite_timeout;
use crate::connection::{ConnectionError, PipelineState};
use crate::protocol::{Command, Reply, StreamFramer, Verb};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Minimum spare capacity kept in the framer before each read
const READ_CHUNK: usize = 4096;

type ReplyResult = Result<Reply, ConnectionError>;

struct Live {
    writer: BufWriter<OwnedWriteHalf>,
    replies: mpsc::Receiver<ReplyResult>,
    reader_task: JoinHandle<()>,
}

impl Drop for Live {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// A non-blocking connection to one shard.
pub struct AsyncConnection {
    shard: ShardDescriptor,
    queue_capacity: usize,
    live: Option<Live>,
    state: PipelineState,
}

impl fmt::Debug for AsyncConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncConnection")
            .field("shard", &self.shard)
            .field("connected", &self.is_connected())
            .field("queue_capacity", &self.queue_capacity)
            .field("state", &self.state)
            .finish()
    }
}

impl AsyncConnection {
    pub fn new(shard: ShardDescriptor) -> Self {
        Self {
            shard,
            queue_capacity: DEFAULT_REPLY_QUEUE_CAPACITY,
            live: None,
            state: PipelineState::default(),
        }
    }

    /// Sets the bound of the reply queue used by the next connect.
    pub fn with_reply_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn shard(&self) -> &ShardDescriptor {
        &self.shard
    }

    /// Opens the socket and starts the reader task. Does nothing if already
    /// connected.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.live.is_some() {
            return Ok(());
        }

        let addr = self.shard.addr();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let reader_task = tokio::spawn(read_replies(read_half, tx));

        self.live = Some(Live {
            writer: BufWriter::new(write_half),
            replies: rx,
            reader_task,
        });
        self.state.reset();
        info!(shard = %addr, "Connected");

        if let Some(password) = self.shard.password.clone() {
            self.authenticate(password).await?;
        }
        Ok(())
    }

    async fn authenticate(&mut self, password: String) -> Result<(), ConnectionError> {
        let pipelining = self.state.is_pipelining();
        self.state.set_pipelining(false);

        // Written directly: `send_command` would try to connect again.
        let auth = Command::new(Verb::Auth).arg(password);
        let sent = match self.state.on_send() {
            Ok(()) => self.write(&auth, true).await,
            Err(e) => Err(e),
        };
        let result = match sent {
            Ok(()) => self.read_reply().await,
            Err(e) => Err(e),
        };
        self.state.set_pipelining(pipelining);

        if let Err(e) = result {
            warn!(shard = %self.shard.addr(), error = %e, "Authentication failed");
            self.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    /// Stops the reader task and closes the socket. Safe to call when already
    /// closed.
    pub async fn disconnect(&mut self) {
        if let Some(mut live) = self.live.take() {
            if let Err(e) = live.writer.get_mut().shutdown().await {
                trace!(error = %e, "Shutdown on a closed socket");
            }
            info!(shard = %self.shard.addr(), "Disconnected");
        }
        self.state.reset();
    }

    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    /// Writes one command, connecting first if needed.
    pub async fn send_command(&mut self, command: &Command) -> Result<(), ConnectionError> {
        self.connect().await?;
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
        match self.write(command, flush).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.teardown(e)),
        }
    }

    async fn write(&mut self, command: &Command, flush: bool) -> Result<(), ConnectionError> {
        let live = self.live.as_mut().ok_or(ConnectionError::Closed)?;
        let bytes = command.encode();
        live.writer.write_all(&bytes).await?;
        if flush {
            live.writer.flush().await?;
        }
        trace!(bytes = bytes.len(), flushed = flush, "Wrote command");
        Ok(())
    }

    /// Reads the next reply under the shard's read timeout.
    pub async fn read_reply(&mut self) -> Result<Reply, ConnectionError> {
        let deadline = finite_timeout(self.shard.read_timeout);
        self.read_reply_within(deadline).await
    }

    /// Reads the next reply, waiting at most `deadline` (`None` waits forever).
    /// An error reply becomes [`ConnectionError::Server`].
    pub async fn read_reply_within(
        &mut self,
        deadline: Option<Duration>,
    ) -> Result<Reply, ConnectionError> {
        match self.read_raw_reply(deadline).await? {
            Reply::Error(message) => Err(ConnectionError::Server(message)),
            reply => Ok(reply),
        }
    }

    /// Reads the next reply, returning error replies as values.
    pub async fn read_raw_reply(
        &mut self,
        deadline: Option<Duration>,
    ) -> Result<Reply, ConnectionError> {
        match self.read_one(deadline).await {
            Ok(reply) => Ok(reply),
            Err(e) => Err(self.teardown(e)),
        }
    }

    async fn read_one(&mut self, deadline: Option<Duration>) -> Result<Reply, ConnectionError> {
        let live = self.live.as_mut().ok_or(ConnectionError::Closed)?;
        self.state.on_reply()?;
        live.writer.flush().await?;

        let received = match deadline {
            Some(limit) => tokio::time::timeout(limit, live.replies.recv())
                .await
                .map_err(|_| ConnectionError::Timeout(limit))?,
            None => live.replies.recv().await,
        };

        match received {
            Some(result) => result,
            None => Err(ConnectionError::Closed),
        }
    }

    /// Sends a command and reads its reply. Blocking verbs wait with no deadline.
    pub async fn execute(&mut self, command: &Command) -> Result<Reply, ConnectionError> {
        if command.verb().is_blocking() {
            return self.blocking_command(command).await;
        }
        self.ensure_idle()?;
        self.send_command(command).await?;
        self.read_reply().await
    }

    /// Sends a command and waits for its reply with no deadline.
    pub async fn blocking_command(&mut self, command: &Command) -> Result<Reply, ConnectionError> {
        self.ensure_idle()?;
        self.send_command(command).await?;
        self.read_reply_within(None).await
    }

    fn ensure_idle(&mut self) -> Result<(), ConnectionError> {
        if self.state.in_flight() > 0 {
            let err = ConnectionError::PipelineDesync("execute called with replies still unread");
            return Err(self.teardown(err));
        }
        Ok(())
    }

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
    pub async fn drain(&mut self) -> Result<Vec<Reply>, ConnectionError> {
        let deadline = finite_timeout(self.shard.read_timeout);
        let pending = self.state.in_flight();
        let mut replies = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.read_raw_reply(deadline).await {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    self.state.finish_drain();
                    return Err(e);
                }
            }
        }
        self.state.finish_drain();

        debug!(shard = %self.shard.addr(), replies = replies.len(), "Drained pipeline");
        Ok(replies)
    }

    /// Drops the connection after a fatal error. The reader task is aborted
    /// when `Live` is dropped; the socket closes with it.
    fn teardown(&mut self, err: ConnectionError) -> ConnectionError {
        if err.is_fatal() {
            warn!(shard = %self.shard.addr(), error = %err, "Tearing down connection");
            if self.live.take().is_some() {
                info!(shard = %self.shard.addr(), "Disconnected");
            }
            self.state.reset();
        }
        err
    }
}

/// Feeds bytes from `reader` through a framer and forwards complete replies.
///
/// Ends after EOF, a read error or a decode error (each forwarded as the last
/// item), or when the receiving side is gone.
pub(crate) async fn read_replies<R>(mut reader: R, tx: mpsc::Sender<ReplyResult>)
where
    R: AsyncRead + Unpin,
{
    let mut framer = StreamFramer::new();

    loop {
        framer.buffer_mut().reserve(READ_CHUNK);
        let n = match reader.read_buf(framer.buffer_mut()).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tx.send(Err(ConnectionError::Io(e))).await;
                return;
            }
        };

        if n == 0 {
            trace!(buffered = framer.buffered_len(), "Reader reached EOF");
            let _ = tx.send(Err(ConnectionError::Closed)).await;
            return;
        }
        trace!(bytes = n, "Read data");

        // Replies decoded ahead of a bad frame still go out first.
        loop {
            match framer.next_reply() {
                Ok(Some(reply)) => {
                    if tx.send(Ok(reply)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(ConnectionError::Parse(e))).await;
                    return;
                }
            }
        }
    }
}
