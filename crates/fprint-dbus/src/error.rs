//! Mapping zbus failures onto remote errors

use fprint_core::{RemoteError, RemoteErrorKind};
use zbus::DBusError;

/// Convert a zbus error into the domain error
pub fn remote_error(err: zbus::Error) -> RemoteError {
    match err {
        zbus::Error::MethodError(name, detail, _) => {
            RemoteError::from_reply(name.to_string(), detail.unwrap_or_default())
        }
        zbus::Error::FDO(fdo) => RemoteError::from_reply(
            fdo.name().to_string(),
            fdo.description().unwrap_or_default().to_string(),
        ),
        zbus::Error::InputOutput(e) => {
            RemoteError::new(RemoteErrorKind::Disconnected, format!("Bus I/O error: {}", e))
        }
        other => RemoteError::new(RemoteErrorKind::Other, other.to_string()),
    }
}
