use thiserror::Error;

/// Errors that can occur when using the Centrifuge client.
#[derive(Error, Debug)]
pub enum CentrifugeError {
    /// WebSocket protocol error (connection failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// General connection error with descriptive message
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server answered a command with an error reply
    #[error("Server error {code}: {message}")]
    Server { code: u32, message: String },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error (private channel token endpoint)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// No reply arrived within the configured timeout
    #[error("Timeout error")]
    Timeout,

    /// Attempted operation while not connected to the server
    #[error("Not connected")]
    NotConnected,

    /// The transport closed while the request was in flight
    #[error("Transport closed")]
    Closed,

    /// The operation is part of the public surface but is not supported
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Private channel token could not be obtained
    #[error("Token error: {0}")]
    Token(String),

    /// A push frame could not be decoded for its declared type
    #[error("Invalid push: {0}")]
    InvalidPush(String),
}

impl CentrifugeError {
    /// Whether the error came from the server rejecting a command, as opposed
    /// to the transport failing underneath it.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}

/// Convenience type alias for `Result<T, CentrifugeError>`.
pub type Result<T> = std::result::Result<T, CentrifugeError>;
