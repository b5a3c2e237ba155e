use thiserror::Error;

/// Transport-level failures: everything short of a `CommandFailed`
/// returned by the dispatcher. These map to the wire protocol's FATAL
/// (code 2) responses and always end the connection.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed request: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request is missing a \"command\" field")]
    MissingCommand,
}

impl WireError {
    /// The exception name surfaced in the FATAL error body.
    pub fn exception_name(&self) -> &'static str {
        match self {
            WireError::Decode(_) => "JSONDecodeError",
            WireError::MissingCommand => "InvalidCommand",
        }
    }
}
