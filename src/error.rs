// MIT License

/// All errors that can occur when talking to a Texecom panel.
#[derive(Debug, thiserror::Error)]
pub enum TexecomError {
    #[error("not connected to panel")]
    NotConnected,

    #[error("command {cmd:#04x} timed out after {attempts} attempts")]
    Timeout { cmd: u8, attempts: u32 },

    #[error("panel rejected UDL password")]
    AuthFailed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("event channel closed")]
    ChannelClosed,
}

impl TexecomError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TexecomError::NotConnected
                | TexecomError::Timeout { .. }
                | TexecomError::Transport(_)
                | TexecomError::ChannelClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, TexecomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TexecomError::NotConnected.is_retryable());
        assert!(TexecomError::Timeout { cmd: 0x19, attempts: 5 }.is_retryable());
        assert!(!TexecomError::AuthFailed.is_retryable());
        assert!(!TexecomError::Protocol("bad ack".into()).is_retryable());
        assert!(!TexecomError::Config("udl password too long".into()).is_retryable());
    }
}
