// ! Error types for the MCP hub
// !
// ! Module defines all error kinds that can occur within the hub as tagged
// ! values, so callers can branch on the kind instead of parsing messages.

use thiserror::Error;

/// The main error type for the hub
#[derive(Error, Debug, Clone)]
pub enum HubError {
    /// A plugin with the same registration name is already loaded
    #[error("Plugin already loaded: {0}")]
    DuplicateName(String),

    /// A plugin module failed shape validation (manifest, exports)
    #[error("Invalid plugin: {0}")]
    InvalidPlugin(String),

    /// Plugin `init` rejected; the original message is preserved
    #[error("Plugin load failed: {0}")]
    LoadFailure(String),

    /// Lookup of a registered plugin failed
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    /// Lookup of a tool (local or fully-qualified) failed
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Lookup of a CLI verb failed
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Transport-related errors (connection, framing, I/O)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer went away mid-request
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// Protocol-level errors (invalid messages, unexpected responses)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Malformed input from a peer or caller (bad JSON, schema violation)
    #[error("Bad input: {0}")]
    BadInput(String),

    /// An I/O deadline elapsed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A proxied child MCP server exited
    #[error("Child process exited: {0}")]
    ChildExited(String),

    /// Configuration file errors
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors from the standard library
    #[error("I/O error: {0}")]
    Io(String),

    /// HTTP errors from the proxy SSE client
    #[error("HTTP error: {0}")]
    Http(String),

    /// Errors raised by plugin handlers
    #[error("{0}")]
    Plugin(String),
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HubError::Timeout(err.to_string())
        } else {
            HubError::Http(err.to_string())
        }
    }
}

impl From<url::ParseError> for HubError {
    fn from(err: url::ParseError) -> Self {
        HubError::BadInput(format!("invalid URL: {err}"))
    }
}

/// Result type alias for hub operations
pub type HubResult<T> = Result<T, HubError>;

impl HubError {
    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a new bad-input error
    pub fn bad_input<S: Into<String>>(message: S) -> Self {
        Self::BadInput(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new plugin handler error
    pub fn plugin<S: Into<String>>(message: S) -> Self {
        Self::Plugin(message.into())
    }

    /// Create a new config error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            HubError::UnknownTool("demo_echo".to_string()).to_string(),
            "Unknown tool: demo_echo"
        );
        assert_eq!(
            HubError::DuplicateName("fs".to_string()).to_string(),
            "Plugin already loaded: fs"
        );
        // Handler errors surface their message verbatim
        assert_eq!(HubError::plugin("boom").to_string(), "boom");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HubError = io.into();
        assert!(matches!(err, HubError::Io(_)));
    }
}
