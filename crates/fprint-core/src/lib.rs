//! fprint-core - Fingerprint verification session and device abstraction
//!
//! This crate provides the state machine that authenticates a user against
//! a fingerprint scanner: claim the device, start verification, interpret
//! status events, retry non-matching scans up to a bound and always release
//! the device before reporting an outcome.
//!
//! The scanner itself is reached through the [`FingerprintDevice`] trait.
//!
//! # Features
//!
//! - `mock` - Enable the scripted [`mock::MockDevice`] for testing

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod session;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::{BusKind, VerifyConfig};
pub use device::{ClaimGuard, EventStream, FingerprintDevice};
pub use error::{ConfigError, RemoteError, RemoteErrorKind, Result, VerifyError};
pub use event::{VerificationEvent, VerifyResult};
pub use session::{FailureKind, SessionState, SessionUpdate, VerificationSession, Verified};
