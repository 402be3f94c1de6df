//! Status events emitted by a fingerprint device

use std::fmt;

/// Signal member carrying scan outcomes
pub const VERIFY_STATUS_MEMBER: &str = "VerifyStatus";

/// Result string reported with a `VerifyStatus` signal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerifyResult {
    /// The scan matched an enrolled print
    Match,
    /// The scan completed but did not match
    NoMatch,
    /// The scan was unusable, scan again
    RetryScan,
    /// Swipe was too short, scan again
    SwipeTooShort,
    /// Finger was not centered, scan again
    FingerNotCentered,
    /// Remove the finger and scan again
    RemoveAndRetry,
    /// The device was unplugged
    Disconnected,
    /// The driver hit an unknown error
    UnknownError,
    /// Any value this crate does not know
    Unrecognized(String),
}

impl VerifyResult {
    /// Parse the fprintd result string
    pub fn parse(value: &str) -> Self {
        match value {
            "verify-match" => Self::Match,
            "verify-no-match" => Self::NoMatch,
            "verify-retry-scan" => Self::RetryScan,
            "verify-swipe-too-short" => Self::SwipeTooShort,
            "verify-finger-not-centered" => Self::FingerNotCentered,
            "verify-remove-and-retry" => Self::RemoveAndRetry,
            "verify-disconnected" => Self::Disconnected,
            "verify-unknown-error" => Self::UnknownError,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Match => "verify-match",
            Self::NoMatch => "verify-no-match",
            Self::RetryScan => "verify-retry-scan",
            Self::SwipeTooShort => "verify-swipe-too-short",
            Self::FingerNotCentered => "verify-finger-not-centered",
            Self::RemoveAndRetry => "verify-remove-and-retry",
            Self::Disconnected => "verify-disconnected",
            Self::UnknownError => "verify-unknown-error",
            Self::Unrecognized(other) => other,
        }
    }

    /// A completed scan: either a match or a no-match
    pub fn is_scan_outcome(&self) -> bool {
        matches!(self, Self::Match | Self::NoMatch)
    }

    /// The device wants the user to scan again within the same cycle
    pub fn is_retry_hint(&self) -> bool {
        matches!(
            self,
            Self::RetryScan | Self::SwipeTooShort | Self::FingerNotCentered | Self::RemoveAndRetry
        )
    }

    /// Human-readable prompt for retry hints
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RetryScan => Some("Please retry scanning your finger"),
            Self::SwipeTooShort => Some("Swipe was too short, please try again"),
            Self::FingerNotCentered => Some("Finger was not centered, please try again"),
            Self::RemoveAndRetry => Some("Please remove your finger and try again"),
            _ => None,
        }
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered by a device subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent {
    /// A `VerifyStatus` signal
    Status {
        /// Object path the signal came from
        device: String,
        result: VerifyResult,
        /// Whether the device ended the verify operation
        done: bool,
    },
    /// Any other signal seen on the subscription
    Other { device: String, member: String },
}

impl VerificationEvent {
    /// Shorthand for a status event
    pub fn status(device: impl Into<String>, result: VerifyResult, done: bool) -> Self {
        Self::Status {
            device: device.into(),
            result,
            done,
        }
    }

    /// Object path of the emitting device
    pub fn device(&self) -> &str {
        match self {
            Self::Status { device, .. } | Self::Other { device, .. } => device,
        }
    }

    /// The scan outcome, if this is a status event for `device`
    pub fn result_for(&self, device: &str) -> Option<&VerifyResult> {
        match self {
            Self::Status {
                device: source,
                result,
                ..
            } if source == device => Some(result),
            _ => None,
        }
    }
}
