//! Error types for the protocol and I/O layers.
//!
//! The cache engine itself never returns errors; its failure modes are
//! ordinary outcome variants. Errors here cover malformed protocol input
//! and socket failures.

use thiserror::Error;

/// Failures while parsing or serving the text protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The command word is not one we know; rendered as `ERROR`.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// The client sent a malformed request; rendered as `CLIENT_ERROR <msg>`.
    #[error("{0}")]
    Client(String),

    /// A socket error; the connection is dropped.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    /// The wire form of this error, if the connection can continue.
    pub fn to_reply(&self) -> Option<String> {
        match self {
            Self::UnknownCommand(_) => Some("ERROR\r\n".to_string()),
            Self::Client(msg) => Some(format!("CLIENT_ERROR {}\r\n", msg)),
            Self::Io(_) => None,
        }
    }
}

/// A specialized Result type for protocol handling.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_replies() {
        let err = ProtocolError::UnknownCommand("frob".to_string());
        assert_eq!(err.to_reply().as_deref(), Some("ERROR\r\n"));

        let err = ProtocolError::client("bad data chunk");
        assert_eq!(
            err.to_reply().as_deref(),
            Some("CLIENT_ERROR bad data chunk\r\n")
        );

        let err: ProtocolError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(err.to_reply().is_none());
    }
}
