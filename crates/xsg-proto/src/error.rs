use thiserror::Error;

/// Errors produced by the packet codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer ended before a complete field could be read.
    #[error("truncated packet: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// The leading two bytes are not a known packet type code.
    #[error("unknown packet type 0x{0:04x}")]
    UnknownPacketType(u16),

    /// A field required by the target layout is absent or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field was present but its contents are invalid.
    #[error("malformed field {field}: {reason}")]
    Malformed {
        field: &'static str,
        reason: &'static str,
    },
}

impl DecodeError {
    pub(crate) fn malformed(field: &'static str, reason: &'static str) -> Self {
        DecodeError::Malformed { field, reason }
    }
}
