//! Event source errors and their retry classification.

use thiserror::Error;

/// How the collector reacts to a [`SourceError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Network blip or closed connection; retry.
    Transient,
    /// The broadcast is over; stop without error.
    Ended,
    /// The platform's signing/auth service refused us; stop and surface it.
    SignService,
}

/// Errors from an event source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Could not establish or keep the connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// The platform closed the stream.
    #[error("connection closed by platform")]
    Closed,

    /// No connection is open.
    #[error("not connected")]
    NotConnected,

    /// The room is not broadcasting.
    #[error("room is offline")]
    Offline,

    /// The broadcast ended while connected.
    #[error("broadcast ended")]
    BroadcastEnded,

    /// Signing or authentication service failure.
    #[error("signing service failure: {0}")]
    SignService(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SourceError {
    /// Retry classification.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Connection(_) | Self::Closed | Self::NotConnected | Self::Http(_) => {
                FailureClass::Transient
            }
            Self::Offline | Self::BroadcastEnded => FailureClass::Ended,
            Self::SignService(_) => FailureClass::SignService,
        }
    }
}
