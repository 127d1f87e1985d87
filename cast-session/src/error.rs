//! Error types for the cast-session crate.

use thiserror::Error;

/// Errors surfaced by the cast protocol client.
///
/// Clone so the same error can travel through broadcast event streams.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The connection attempt was rejected or failed
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Nothing answered at the address
    #[error("Host unreachable: {0}")]
    HostUnreachable(String),

    /// The connection was closed underneath an operation
    #[error("Connection closed")]
    ConnectionClosed,

    /// The operation did not complete in time
    #[error("Operation timed out")]
    Timeout,

    /// Joining an application session failed
    #[error("Join failed: {0}")]
    JoinFailed(String),

    /// A playback or volume operation was rejected by the device
    #[error("Operation failed: {0}")]
    Operation(String),

    /// Low-level transport error carrying the raw system message
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors from constructing or driving a [`crate::DeviceController`].
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The controller task is no longer running
    #[error("Controller stopped")]
    ControllerStopped,

    /// A protocol client error
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// How a connection failure should be treated by the reconnect supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No device reachable at the last known address
    Unreachable,
    /// Connect or operation timed out
    Timeout,
    /// An established connection dropped
    ConnectionLost,
    /// Joining the foreground application failed
    JoinFailed,
    /// Anything else
    Other,
}

impl FailureKind {
    /// Classify a client error, inspecting the message text of transport errors.
    pub fn classify(error: &ClientError) -> Self {
        match error {
            ClientError::HostUnreachable(_) | ClientError::ConnectFailed(_) => {
                FailureKind::Unreachable
            }
            ClientError::Timeout => FailureKind::Timeout,
            ClientError::ConnectionClosed => FailureKind::ConnectionLost,
            ClientError::JoinFailed(_) => FailureKind::JoinFailed,
            ClientError::Operation(_) => FailureKind::Other,
            ClientError::Transport(message) => Self::classify_message(message),
        }
    }

    fn classify_message(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        if message.contains("ehostunreach")
            || message.contains("enetunreach")
            || message.contains("host unreachable")
            || message.contains("no route to host")
            || message.contains("econnrefused")
            || message.contains("connection refused")
        {
            FailureKind::Unreachable
        } else if message.contains("etimedout") || message.contains("timed out") {
            FailureKind::Timeout
        } else if message.contains("econnreset")
            || message.contains("connection reset")
            || message.contains("epipe")
            || message.contains("broken pipe")
        {
            FailureKind::ConnectionLost
        } else {
            FailureKind::Other
        }
    }

    /// Whether a first failure of this kind may be retried without delay.
    pub fn retry_immediately(&self) -> bool {
        matches!(self, FailureKind::ConnectionLost | FailureKind::JoinFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ClientError::HostUnreachable("10.0.0.5".into()), FailureKind::Unreachable)]
    #[case(ClientError::ConnectFailed("refused".into()), FailureKind::Unreachable)]
    #[case(ClientError::Timeout, FailureKind::Timeout)]
    #[case(ClientError::ConnectionClosed, FailureKind::ConnectionLost)]
    #[case(ClientError::JoinFailed("no session".into()), FailureKind::JoinFailed)]
    #[case(ClientError::Operation("INVALID_REQUEST".into()), FailureKind::Other)]
    #[case(ClientError::Transport("connect EHOSTUNREACH 10.0.0.5:8009".into()), FailureKind::Unreachable)]
    #[case(ClientError::Transport("connect ECONNREFUSED 10.0.0.5:8009".into()), FailureKind::Unreachable)]
    #[case(ClientError::Transport("read ECONNRESET".into()), FailureKind::ConnectionLost)]
    #[case(ClientError::Transport("socket timed out".into()), FailureKind::Timeout)]
    #[case(ClientError::Transport("unexpected frame".into()), FailureKind::Other)]
    fn test_classify(#[case] error: ClientError, #[case] expected: FailureKind) {
        assert_eq!(FailureKind::classify(&error), expected);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ClientError::JoinFailed("abc".into()).to_string(),
            "Join failed: abc"
        );
        let error: ControllerError = ClientError::Timeout.into();
        assert_eq!(error.to_string(), "Client error: Operation timed out");
    }
}
