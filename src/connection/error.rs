//! Connection errors.

use crate::protocol::{ParseError, ReadError};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to one shard.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The TCP connection could not be established
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The server sent bytes that do not follow the reply grammar
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// No reply arrived within the read timeout
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with an error reply
    #[error("server error: {0}")]
    Server(String),

    /// Sends and reads no longer line up
    #[error("pipeline desync: {0}")]
    PipelineDesync(&'static str),

    /// The connection is closed or was closed by the peer
    #[error("connection closed")]
    Closed,
}

impl ConnectionError {
    /// Errors after which the connection can no longer be trusted.
    ///
    /// A server error reply is the only recoverable kind: the stream is still
    /// in sync after it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ConnectionError::Server(_))
    }
}

impl From<ReadError> for ConnectionError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Io(e) => ConnectionError::Io(e),
            ReadError::Parse(e) => ConnectionError::Parse(e),
            ReadError::Eof => ConnectionError::Closed,
        }
    }
}

/// True for the error kinds a socket read deadline produces.
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_server_errors_are_recoverable() {
        assert!(!ConnectionError::Server("ERR".into()).is_fatal());
        assert!(ConnectionError::Closed.is_fatal());
        assert!(ConnectionError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(ConnectionError::PipelineDesync("x").is_fatal());
        assert!(ConnectionError::Parse(ParseError::UnknownPrefix(b'?')).is_fatal());
    }

    #[test]
    fn test_from_read_error() {
        assert!(matches!(
            ConnectionError::from(ReadError::Eof),
            ConnectionError::Closed
        ));
        assert!(matches!(
            ConnectionError::from(ReadError::Parse(ParseError::UnknownPrefix(b'!'))),
            ConnectionError::Parse(ParseError::UnknownPrefix(b'!'))
        ));
    }

    #[test]
    fn test_timeout_kinds() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }
}
