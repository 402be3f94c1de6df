//! Fingerprint device abstraction
//!
//! A [`FingerprintDevice`] is a thin handle on one remote scanner. It
//! forwards the three remote operations used by a verification session and
//! exposes the device's status signals as a stream. The D-Bus backed
//! implementation lives in `fprint-dbus`; tests use the scripted device in
//! [`crate::mock`].
//!
//! Claims are exclusive and must be released explicitly. [`ClaimGuard`]
//! ties a release to each successful claim.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tracing::{debug, error, warn};

use crate::error::RemoteError;
use crate::event::VerificationEvent;

/// Fixed fprintd names
pub const FPRINT_SERVICE: &str = "net.reactivated.Fprint";
pub const FPRINT_DEVICE_INTERFACE: &str = "net.reactivated.Fprint.Device";
pub const DEFAULT_DEVICE_PATH: &str = "/net/reactivated/Fprint/Device/0";

/// Finger selector matching any enrolled finger
pub const ANY_FINGER: &str = "any";

/// Ordered stream of device events; ends when the connection goes away
pub type EventStream = BoxStream<'static, VerificationEvent>;

/// Remote fingerprint scanner
#[async_trait]
pub trait FingerprintDevice: Send + Sync {
    /// Object path identifying the device
    fn object_path(&self) -> &str;

    /// Take exclusive ownership of the device
    ///
    /// An empty `username` claims on behalf of the calling user.
    async fn claim(&self, username: &str) -> Result<(), RemoteError>;

    /// Give up a previously acquired claim
    async fn release(&self) -> Result<(), RemoteError>;

    /// Begin a verification cycle against `finger` (`"any"` for all fingers)
    async fn verify_start(&self, finger: &str) -> Result<(), RemoteError>;

    /// Subscribe to signals emitted for this device
    async fn events(&self) -> Result<EventStream, RemoteError>;
}

/// A held claim on a device
///
/// Call [`ClaimGuard::release`] to give the claim back and observe the
/// result. If the guard is dropped while still held (the owning future was
/// cancelled or panicked) a release is spawned on the current tokio runtime.
pub struct ClaimGuard<D: FingerprintDevice + ?Sized + 'static> {
    device: Option<Arc<D>>,
}

impl<D: FingerprintDevice + ?Sized + 'static> ClaimGuard<D> {
    /// Claim `device` for `username`
    pub async fn acquire(device: Arc<D>, username: &str) -> Result<Self, RemoteError> {
        device.claim(username).await?;
        debug!("Claimed {}", device.object_path());
        Ok(Self {
            device: Some(device),
        })
    }

    /// The claimed device
    pub fn device(&self) -> Option<&D> {
        self.device.as_deref()
    }

    /// Release the claim
    ///
    /// The guard is consumed either way, so a failed release is never
    /// retried from `Drop`.
    pub async fn release(mut self) -> Result<(), RemoteError> {
        let Some(device) = self.device.take() else {
            return Ok(());
        };
        device.release().await?;
        debug!("Released {}", device.object_path());
        Ok(())
    }
}

impl<D: FingerprintDevice + ?Sized + 'static> Drop for ClaimGuard<D> {
    fn drop(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };

        warn!(
            "Claim on {} dropped while held, releasing in background",
            device.object_path()
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = device.release().await {
                        error!("Background release of {} failed: {}", device.object_path(), e);
                    }
                });
            }
            Err(_) => {
                error!(
                    "No runtime available to release {}; the claim ends when the bus connection closes",
                    device.object_path()
                );
            }
        }
    }
}
