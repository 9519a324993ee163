//! Thin wrappers over `org.freedesktop.DBus` methods a client typically
//! needs right after `Hello`.

use crate::connection::Connection;
use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::object_path::ObjectPath;
use crate::signature::Type;
use crate::value::Value;

/// The bus daemon's own well-known name.
pub const BUS_NAME: &str = "org.freedesktop.DBus";
/// The bus daemon's own object path.
pub const BUS_PATH: &str = "/org/freedesktop/DBus";
/// The bus daemon's own interface name.
pub const BUS_INTERFACE: &str = "org.freedesktop.DBus";

/// Flags accepted by `RequestName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NameFlags(u32);

impl NameFlags {
    /// No flags.
    pub const NONE: NameFlags = NameFlags(0);
    /// Allow another owner to replace us if it also requests with
    /// `ALLOW_REPLACEMENT`.
    pub const ALLOW_REPLACEMENT: NameFlags = NameFlags(0x1);
    /// Attempt to replace the current owner, if any, and it allows it.
    pub const REPLACE_EXISTING: NameFlags = NameFlags(0x2);
    /// Do not queue for ownership if the name is already taken; fail
    /// instead.
    pub const DO_NOT_QUEUE: NameFlags = NameFlags(0x4);

    /// Combine this flag set with another.
    pub const fn or(self, other: NameFlags) -> NameFlags {
        NameFlags(self.0 | other.0)
    }

    fn bits(self) -> u32 {
        self.0
    }
}

/// Outcome of a `RequestName` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameReply {
    /// The caller is now the primary owner of the name.
    PrimaryOwner,
    /// The name was already owned, and the caller has been placed in the
    /// wait queue.
    InQueue,
    /// The name was already owned and `DO_NOT_QUEUE` was set.
    Exists,
    /// The caller already owns the name.
    AlreadyOwner,
}

impl NameReply {
    fn from_code(code: u32) -> Result<NameReply> {
        Ok(match code {
            1 => NameReply::PrimaryOwner,
            2 => NameReply::InQueue,
            3 => NameReply::Exists,
            4 => NameReply::AlreadyOwner,
            other => {
                return Err(Error::new(ErrorKind::BusError {
                    name: "org.freedesktop.DBus.Error.Failed".into(),
                    message: format!("unrecognized RequestName reply code {other}").into(),
                }))
            }
        })
    }
}

/// Outcome of a `ReleaseName` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseNameReply {
    /// The name was released.
    Released,
    /// The name was not owned by anyone.
    NonExistent,
    /// The caller was not the owner of the name.
    NotOwner,
}

impl ReleaseNameReply {
    fn from_code(code: u32) -> Result<ReleaseNameReply> {
        Ok(match code {
            1 => ReleaseNameReply::Released,
            2 => ReleaseNameReply::NonExistent,
            3 => ReleaseNameReply::NotOwner,
            other => {
                return Err(Error::new(ErrorKind::BusError {
                    name: "org.freedesktop.DBus.Error.Failed".into(),
                    message: format!("unrecognized ReleaseName reply code {other}").into(),
                }))
            }
        })
    }
}

fn bus_call(member: &str) -> Message {
    Message::method_call(ObjectPath::new(BUS_PATH).expect("BUS_PATH is a valid path"), BUS_INTERFACE, member)
        .with_destination(BUS_NAME)
}

fn first_u32(reply: &Message) -> Result<u32> {
    match &reply.body {
        Value::Uint32(v) => Ok(*v),
        _ => Err(Error::new(ErrorKind::BusError {
            name: "org.freedesktop.DBus.Error.Failed".into(),
            message: "expected a uint32 reply body".into(),
        })),
    }
}

/// Request ownership of `name` on the bus.
pub async fn request_name(conn: &Connection, name: &str, flags: NameFlags) -> Result<NameReply> {
    let call = bus_call("RequestName").with_body(
        &Type::Tuple(vec![Type::String, Type::Uint32]),
        Value::Struct(vec![Value::String(name.to_string()), Value::Uint32(flags.bits())]),
    );

    let reply = conn.call(call).await?;
    NameReply::from_code(first_u32(&reply)?)
}

/// Release ownership of `name`.
pub async fn release_name(conn: &Connection, name: &str) -> Result<ReleaseNameReply> {
    let call = bus_call("ReleaseName").with_body(&Type::String, Value::String(name.to_string()));
    let reply = conn.call(call).await?;
    ReleaseNameReply::from_code(first_u32(&reply)?)
}

/// Test whether `name` currently has an owner.
pub async fn name_has_owner(conn: &Connection, name: &str) -> Result<bool> {
    let call = bus_call("NameHasOwner").with_body(&Type::String, Value::String(name.to_string()));
    let reply = conn.call(call).await?;

    match reply.body {
        Value::Boolean(b) => Ok(b),
        _ => Err(Error::new(ErrorKind::BusError {
            name: "org.freedesktop.DBus.Error.Failed".into(),
            message: "expected a boolean reply body".into(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_reply_codes_match_the_bus_protocol() {
        assert_eq!(NameReply::from_code(1).unwrap(), NameReply::PrimaryOwner);
        assert_eq!(NameReply::from_code(4).unwrap(), NameReply::AlreadyOwner);
        assert!(NameReply::from_code(99).is_err());
    }

    #[test]
    fn release_name_reply_codes_match_the_bus_protocol() {
        assert_eq!(
            ReleaseNameReply::from_code(1).unwrap(),
            ReleaseNameReply::Released
        );
        assert!(ReleaseNameReply::from_code(0).is_err());
    }

    #[test]
    fn flags_combine_with_or() {
        let flags = NameFlags::ALLOW_REPLACEMENT.or(NameFlags::REPLACE_EXISTING);
        assert_eq!(flags.bits(), 0x3);
    }
}
