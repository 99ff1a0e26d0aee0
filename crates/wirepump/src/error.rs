//! Error types for the event pump.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while connecting to and pumping a display
/// server.
///
/// Protocol-level errors reported by the server are *not* represented
/// here: those arrive as records, are logged by the dispatcher, and
/// never abort pumping.
#[derive(Debug, Error)]
pub enum PumpError {
    /// The WIREPUMP_SOCKET environment variable is not set
    #[error("WIREPUMP_SOCKET environment variable not set - is the display server running?")]
    SocketNotSet,

    /// The socket path does not exist
    #[error("display socket not found at {path}")]
    SocketNotFound { path: PathBuf },

    /// Failed to connect to the display socket
    #[error("failed to connect to display socket at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to duplicate or configure the connection handle
    #[error("failed to set up the display connection: {0}")]
    ConnectionSetup(#[source] std::io::Error),

    /// Failed to read from the connection
    #[error("failed to read from the display connection: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// The connection was closed by the peer
    #[error("the display connection closed unexpectedly")]
    ConnectionClosed,

    /// The connection broke while pumping; no recovery is attempted
    #[error("the display connection broke; event pumping has stopped")]
    ConnectionBroken,

    /// A frame on the wire did not decode into a record
    #[error("malformed record on the wire: {0}")]
    MalformedRecord(#[from] wirepump_proto::RecordError),

    /// The event reader thread could not be spawned
    #[error("failed to spawn the event reader thread: {0}")]
    ReaderSpawnFailed(#[source] std::io::Error),

    /// A config file could not be read
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file could not be parsed
    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
