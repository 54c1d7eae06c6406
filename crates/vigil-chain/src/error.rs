// Chain RPC failure taxonomy.

use thiserror::Error;

/// Typed failures from the chain RPC capability.
///
/// The client itself never retries; callers consult [`ChainError::is_transient`]
/// to decide what is worth another attempt.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport-level failure: connection, timeout, TLS
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the node endpoint
    #[error("http status {status}")]
    Http { status: u16 },

    /// Error object inside the JSON-RPC envelope
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Envelope carried neither a result nor an error
    #[error("rpc response for {method} carried no result")]
    MissingResult { method: &'static str },

    /// Result payload did not match the expected shape
    #[error("malformed {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Node returned constants that fail validation
    #[error("unusable policy constants: {0}")]
    Policy(#[from] vigil_core::PolicyError),
}

impl ChainError {
    /// Failures worth retrying: transport hiccups, node overload, and
    /// server-side error codes. Malformed or rejected requests are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ChainError::Transport(_) => true,
            ChainError::Http { status } => *status == 429 || *status >= 500,
            ChainError::Rpc { code, message } => {
                // -32000..=-32099 is the server-defined range; nodes under
                // load also answer with -32603 (internal error)
                (-32099..=-32000).contains(code)
                    || *code == -32603
                    || message.contains("busy")
                    || message.contains("timeout")
            }
            ChainError::MissingResult { .. } => false,
            ChainError::Decode { .. } => false,
            ChainError::Policy(_) => false,
        }
    }
}
