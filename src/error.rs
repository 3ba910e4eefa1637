//! Error types.
//!
//! Transport and protocol failures are absorbed by the channel manager and
//! dispatcher and only show up in logs and lifecycle events. Running out of
//! reconnect attempts is the one failure callers are expected to act on.

use thiserror::Error;

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Top-level error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("gave up reconnecting after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    InvalidCommand(#[from] CommandError),
}

/// Connect, refused, timeout and I/O failures of the push channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport is not open")]
    Closed,

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
}

/// An inbound frame that could not be understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("bad {kind} payload: {reason}")]
    BadPayload { kind: String, reason: String },

    #[error("unparseable timestamp: {0}")]
    BadTimestamp(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A troop command that can't be composed against the current world.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("troop {0} is not in the latest snapshot")]
    UnknownTroop(String),

    #[error("troop {troop_id} cannot {action} to {x},{y}")]
    IllegalTarget {
        troop_id: String,
        action: &'static str,
        x: i32,
        y: i32,
    },

    #[error("troop {0} is busy")]
    Busy(String),
}

/// Failure returned by a subscriber callback. Contained per subscriber.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SyncError::ExhaustedRetries { attempts: 5 };
        assert_eq!(err.to_string(), "gave up reconnecting after 5 attempts");

        let err: SyncError = ProtocolError::Malformed("eof".into()).into();
        assert_eq!(err.to_string(), "malformed frame: eof");

        let err = CommandError::IllegalTarget {
            troop_id: "t1".into(),
            action: "move",
            x: 3,
            y: -2,
        };
        assert_eq!(err.to_string(), "troop t1 cannot move to 3,-2");
    }
}
