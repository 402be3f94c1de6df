//! Error types for fingerprint verification

use std::fmt;

use thiserror::Error;

use crate::session::FailureKind;

/// Result type alias for verification operations
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Broad classification of a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The device is claimed by another caller
    AlreadyInUse,
    /// The device path does not exist on the service
    NoSuchDevice,
    /// The caller is not allowed to use the device
    PermissionDenied,
    /// The service could not open the device
    ClaimDevice,
    /// The user has no enrolled fingerprints
    NoEnrolledPrints,
    /// Nobody owns the service name on the bus
    ServiceUnavailable,
    /// The bus connection went away
    Disconnected,
    /// The service reported an internal failure
    Internal,
    /// Anything else, including malformed replies
    Other,
}

impl RemoteErrorKind {
    /// Classify a D-Bus error name
    pub fn from_error_name(name: &str) -> Self {
        match name.rsplit('.').next().unwrap_or(name) {
            "AlreadyInUse" | "AlreadyClaimed" => Self::AlreadyInUse,
            "NoSuchDevice" | "UnknownObject" | "UnknownMethod" => Self::NoSuchDevice,
            "PermissionDenied" | "AccessDenied" => Self::PermissionDenied,
            "ClaimDevice" => Self::ClaimDevice,
            "NoEnrolledPrints" => Self::NoEnrolledPrints,
            "ServiceUnknown" | "NameHasNoOwner" => Self::ServiceUnavailable,
            "Disconnected" | "NoReply" => Self::Disconnected,
            "Internal" | "Failed" => Self::Internal,
            _ => Self::Other,
        }
    }
}

/// Failure of a remote method call (claim, verify-start, release, subscribe)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct RemoteError {
    kind: RemoteErrorKind,
    /// Fully qualified error name, when the service sent one
    name: Option<String>,
    message: String,
}

impl RemoteError {
    /// Build from a D-Bus error reply
    pub fn from_reply(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: RemoteErrorKind::from_error_name(&name),
            name: Some(name),
            message: message.into(),
        }
    }

    /// Build from a transport-level failure with no error name
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if self.message.is_empty() => write!(f, "{}", name),
            Some(name) => write!(f, "{}: {}", name, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Terminal failures of a verification session
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A remote call failed
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// Every allowed scan completed without a match
    #[error("Max attempts exhausted ({attempts} scans did not match)")]
    AttemptsExhausted { attempts: u32 },

    /// The event stream ended or timed out before a match
    #[error("Connection to the fingerprint service was lost")]
    ConnectionLost,

    /// Shutdown was requested while waiting for a scan
    #[error("Verification cancelled")]
    Cancelled,

    /// Releasing the device failed after another terminal failure
    #[error("{cause} (release also failed: {release})")]
    Cleanup {
        cause: Box<VerifyError>,
        release: RemoteError,
    },
}

impl VerifyError {
    /// The failure kind recorded in the session state
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Remote(_) => FailureKind::Remote,
            Self::AttemptsExhausted { .. } => FailureKind::AttemptsExhausted,
            Self::ConnectionLost => FailureKind::ConnectionLost,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Cleanup { cause, .. } => cause.kind(),
        }
    }

    /// Attach a failed release to this error without losing it
    pub fn with_release_failure(self, release: RemoteError) -> Self {
        Self::Cleanup {
            cause: Box::new(self),
            release,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_fprintd_errors() {
        assert_eq!(
            RemoteErrorKind::from_error_name("net.reactivated.Fprint.Error.AlreadyInUse"),
            RemoteErrorKind::AlreadyInUse
        );
        assert_eq!(
            RemoteErrorKind::from_error_name("net.reactivated.Fprint.Error.NoEnrolledPrints"),
            RemoteErrorKind::NoEnrolledPrints
        );
        assert_eq!(
            RemoteErrorKind::from_error_name("org.freedesktop.DBus.Error.ServiceUnknown"),
            RemoteErrorKind::ServiceUnavailable
        );
        assert_eq!(
            RemoteErrorKind::from_error_name("com.example.Weird"),
            RemoteErrorKind::Other
        );
    }

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::from_reply("net.reactivated.Fprint.Error.AlreadyInUse", "Device busy");
        assert_eq!(
            err.to_string(),
            "net.reactivated.Fprint.Error.AlreadyInUse: Device busy"
        );

        let err = RemoteError::new(RemoteErrorKind::Disconnected, "bus closed");
        assert_eq!(err.to_string(), "bus closed");
        assert!(err.name().is_none());
    }

    #[test]
    fn test_cleanup_keeps_original_cause() {
        let release = RemoteError::from_reply("net.reactivated.Fprint.Error.Internal", "stuck");
        let err = VerifyError::AttemptsExhausted { attempts: 3 }.with_release_failure(release);

        assert_eq!(err.kind(), FailureKind::AttemptsExhausted);
        let text = err.to_string();
        assert!(text.contains("Max attempts exhausted"));
        assert!(text.contains("release also failed"));
    }
}
