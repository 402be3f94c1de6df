//! fprint-dbus - fprintd backend for fingerprint verification
//!
//! Implements [`fprint_core::FingerprintDevice`] on top of the
//! `net.reactivated.Fprint.Device` D-Bus interface using `zbus`.

pub mod device;
pub mod error;
pub mod proxy;

pub use device::{connect, decode_signal, DbusDevice};
pub use error::remote_error;
