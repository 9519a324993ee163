//! A pure Rust, Tokio-based D-Bus client library.
//!
//! This crate implements the D-Bus wire protocol (marshalling, message
//! framing, the SASL `EXTERNAL` handshake) and a small async connection
//! built on top of it. It does not implement a bus daemon, and it does not
//! pass file descriptors over the wire.
//!
//! The core codec modules ([`buffer`], [`signature`], [`value`],
//! [`message`], [`sasl`], [`object_path`]) have no dependency on Tokio and
//! can be used to marshal and unmarshal D-Bus messages in any runtime.
//! [`transport`], [`connection`], and [`org_freedesktop_dbus`] require the
//! `tokio` feature (enabled by default) and provide an actual client.

pub mod buffer;
pub mod error;
pub mod introspect;
pub mod message;
pub mod object_path;
pub mod protocol;
pub mod sasl;
pub mod signature;
pub mod value;

#[cfg(feature = "tokio")]
pub mod connection;
#[cfg(feature = "tokio")]
pub mod org_freedesktop_dbus;
#[cfg(feature = "tokio")]
pub mod transport;

pub use error::{Error, ErrorKind, Result};
pub use message::Message;
pub use object_path::ObjectPath;
pub use signature::Type;
pub use value::Value;

#[cfg(feature = "tokio")]
pub use connection::{Connection, SignalHandler};
