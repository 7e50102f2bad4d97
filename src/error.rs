use thiserror::Error;

/// Request-level failures. Per-port network errors never show up here;
/// they are folded into the port's status instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("invalid port `{token}`: {reason}")]
    InvalidPort { token: String, reason: String },

    #[error("invalid port range `{token}`: {reason}")]
    InvalidRange { token: String, reason: String },

    #[error("too many ports: {count} requested, at most {max} allowed")]
    TooManyPorts { count: usize, max: usize },

    #[error("unsupported protocol `{0}` (expected tcp or udp)")]
    UnsupportedProtocol(String),

    #[error("container instance {0} not found")]
    InstanceNotFound(u32),

    #[error("container instance {0} has no mapped ports")]
    NoPortMappings(u32),

    #[error("scan cancelled")]
    Cancelled,
}

impl ScanError {
    /// True for errors caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ScanError::EmptyTarget
                | ScanError::InvalidPort { .. }
                | ScanError::InvalidRange { .. }
                | ScanError::TooManyPorts { .. }
                | ScanError::UnsupportedProtocol(_)
                | ScanError::NoPortMappings(_)
        )
    }
}
