use thiserror::Error;

/// Result type shared by the job and session clients.
pub type ClientResult<T> = Result<T, ClientError>;

/// Failures surfaced to whoever initiated an operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// A client-side precondition did not hold; nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// The service answered with a non-2xx status.
    #[error("{message}")]
    Service { status: u16, message: String },

    /// Transport failure or a body that could not be decoded.
    #[error("{0}")]
    Network(String),

    /// Durable token storage could not be read or written.
    #[error("token storage error: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// HTTP status of a service rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_bare_message() {
        let err = ClientError::Service {
            status: 422,
            message: "bad file".into(),
        };
        assert_eq!(err.to_string(), "bad file");
        assert_eq!(err.status(), Some(422));
        assert_eq!(
            ClientError::validation("Please select a file").to_string(),
            "Please select a file"
        );
        assert_eq!(ClientError::network("timeout").status(), None);
    }
}
