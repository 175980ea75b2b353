use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("armsync: Not connected to the authority")]
    NotConnected,
    #[error("armsync: Protocol error : {}", message)]
    Protocol { message: String },
    #[error("armsync: Transport error : {}", message)]
    Transport { message: String },
    #[error("armsync: Joint index {} is out of range (joints = {})", index, len)]
    IndexOutOfRange { index: usize, len: usize },
    #[error(
        "armsync: Dimension mismatch (expected = {}, actual = {})",
        expected,
        actual
    )]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("armsync: Invalid joint spec : {}", message)]
    InvalidJointSpec { message: String },
    #[error("armsync: Target for joint {} is not finite ({})", index, value)]
    NonFiniteTarget { index: usize, value: f64 },
    #[error("armsync: Sync engine is closed")]
    Closed,
}

impl Error {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns `true` if this error must never occur with a valid static
    /// configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::IndexOutOfRange { .. }
                | Self::DimensionMismatch { .. }
                | Self::InvalidJointSpec { .. }
        )
    }
}
