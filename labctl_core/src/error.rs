//! Error taxonomy shared by the acquisition engine and the stage transport.
//!
//! Two families with different propagation rules:
//!
//! - [`SessionError`] aborts an acquisition session and always reaches the caller
//!   (configuration, clock pairing and driver failures are never retried).
//! - [`TransportError`] is raised by a single serial exchange. The stage driver feeds it
//!   into a [`RetryPolicy`](crate::retry::RetryPolicy), which absorbs it and hands the
//!   caller a failure value once the attempt budget is spent.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Bad or missing channel mapping, invalid sample rate, chunk size or waveform.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// None of the supported sample clock pairings matches the channel layout.
    #[error(
        "no sample clock pairing for read device {read_device} and write device {write_device} \
        (clock-1 on {clock1_device}, clock-2 on {clock2_device})"
    )]
    ClockResolution {
        read_device: String,
        write_device: String,
        clock1_device: String,
        clock2_device: String,
    },

    /// Driver or task failure while configuring, starting, reading or writing.
    #[error("hardware error: {0}")]
    Hardware(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    /// The serial line could not be opened or configured.
    #[error("serial link failure on {port}: {reason}")]
    Link { port: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The reply does not have the shape the command expects.
    #[error("malformed reply {reply:?} to command {command:?}")]
    MalformedReply { command: String, reply: String },
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
