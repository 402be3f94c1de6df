//! fprintd-backed fingerprint device

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{future, StreamExt};
use tracing::{debug, info};
use zbus::Connection;

use fprint_core::device::{EventStream, FingerprintDevice};
use fprint_core::event::VERIFY_STATUS_MEMBER;
use fprint_core::{BusKind, RemoteError, VerificationEvent, VerifyConfig, VerifyResult};

use crate::error::remote_error;
use crate::proxy::DeviceProxy;

/// Connect to the configured message bus
pub async fn connect(bus: BusKind) -> Result<Connection, RemoteError> {
    let connection = match bus {
        BusKind::System => Connection::system().await,
        BusKind::Session => Connection::session().await,
    };
    connection.map_err(remote_error)
}

/// A scanner exposed by fprintd
pub struct DbusDevice {
    proxy: DeviceProxy<'static>,
    path: String,
    /// A verify operation was started and not yet stopped
    verifying: AtomicBool,
}

impl DbusDevice {
    /// Bind to `path` on `service` over an existing connection
    pub async fn new(
        connection: &Connection,
        service: &str,
        path: &str,
    ) -> Result<Self, RemoteError> {
        let proxy = DeviceProxy::builder(connection)
            .destination(service.to_string())
            .map_err(remote_error)?
            .path(path.to_string())
            .map_err(remote_error)?
            .build()
            .await
            .map_err(remote_error)?;

        Ok(Self {
            proxy,
            path: path.to_string(),
            verifying: AtomicBool::new(false),
        })
    }

    /// Connect to the bus and bind to the configured device
    pub async fn connect(config: &VerifyConfig) -> Result<Self, RemoteError> {
        let connection = connect(config.bus).await?;
        info!(
            "Connected to {:?} bus, using {} at {}",
            config.bus, config.service, config.device_path
        );
        Self::new(&connection, &config.service, &config.device_path).await
    }
}

#[async_trait]
impl FingerprintDevice for DbusDevice {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn claim(&self, username: &str) -> Result<(), RemoteError> {
        self.proxy.claim(username).await.map_err(remote_error)
    }

    async fn release(&self) -> Result<(), RemoteError> {
        // fprintd expects VerifyStop before Release once a verify has
        // started; it reports an error if nothing is in progress.
        if self.verifying.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.proxy.verify_stop().await {
                debug!("VerifyStop on {} failed: {}", self.path, remote_error(e));
            }
        }
        self.proxy.release().await.map_err(remote_error)
    }

    async fn verify_start(&self, finger: &str) -> Result<(), RemoteError> {
        self.proxy
            .verify_start(finger)
            .await
            .map_err(remote_error)?;
        self.verifying.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn events(&self) -> Result<EventStream, RemoteError> {
        let signals = self
            .proxy
            .inner()
            .receive_all_signals()
            .await
            .map_err(remote_error)?;

        let path = self.path.clone();
        Ok(signals
            .filter_map(move |message| future::ready(decode_signal(&message, &path)))
            .boxed())
    }
}

/// Turn a device signal into an event
///
/// Signals with no member are dropped; a `VerifyStatus` with an
/// unexpected body is reported as an unrecognized result.
pub fn decode_signal(message: &zbus::Message, default_path: &str) -> Option<VerificationEvent> {
    let header = message.header();
    let member = header.member()?.to_string();
    let device = header
        .path()
        .map(|p| p.to_string())
        .unwrap_or_else(|| default_path.to_string());

    if member != VERIFY_STATUS_MEMBER {
        return Some(VerificationEvent::Other { device, member });
    }

    let event = match message.body().deserialize::<(String, bool)>() {
        Ok((result, done)) => VerificationEvent::status(device, VerifyResult::parse(&result), done),
        Err(e) => {
            debug!("Malformed VerifyStatus body: {}", e);
            VerificationEvent::status(
                device,
                VerifyResult::Unrecognized(format!("malformed: {}", e)),
                false,
            )
        }
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/net/reactivated/Fprint/Device/0";
    const IFACE: &str = "net.reactivated.Fprint.Device";

    #[test]
    fn test_decode_verify_status() {
        let message = zbus::Message::signal(PATH, IFACE, "VerifyStatus")
            .unwrap()
            .build(&("verify-no-match", true))
            .unwrap();

        let event = decode_signal(&message, PATH).unwrap();
        assert_eq!(
            event,
            VerificationEvent::status(PATH, VerifyResult::NoMatch, true)
        );
    }

    #[test]
    fn test_decode_other_member() {
        let message = zbus::Message::signal(PATH, IFACE, "VerifyFingerSelected")
            .unwrap()
            .build(&("any",))
            .unwrap();

        let event = decode_signal(&message, PATH).unwrap();
        assert_eq!(
            event,
            VerificationEvent::Other {
                device: PATH.to_string(),
                member: "VerifyFingerSelected".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_malformed_status_is_ignored_by_session() {
        let message = zbus::Message::signal(PATH, IFACE, "VerifyStatus")
            .unwrap()
            .build(&(42u32,))
            .unwrap();

        let event = decode_signal(&message, PATH).unwrap();
        let result = event.result_for(PATH).unwrap();
        assert!(!result.is_scan_outcome());
    }
}
