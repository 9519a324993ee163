//! Reading and writing complete D-Bus messages: fixed header, header-field
//! array, and body.

use crate::buffer::Buffer;
use crate::error::{Error, ErrorKind, Result};
use crate::object_path::ObjectPath;
use crate::protocol::{Endianness, Flags, HeaderField, MessageType};
use crate::signature::Type;
use crate::value::{read_value, write_value, Value};

/// Current D-Bus wire protocol version. There has only ever been one.
pub const PROTOCOL_VERSION: u8 = 1;

/// A complete D-Bus message: fixed header, header fields, and body.
///
/// The header fields that the D-Bus specification defines are exposed as
/// named, typed fields rather than as a generic map, since every field's
/// type is fixed by its code (see the header field table). `body` carries
/// whatever the `signature` field describes; a message with no `signature`
/// has an empty body, represented as `Value::Struct(vec![])`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Byte order the message was (or will be) marshalled in.
    pub endianness: Endianness,
    /// The message type.
    pub message_type: MessageType,
    /// Flags carried in the fixed header.
    pub flags: Flags,
    /// Wire protocol version; always [`PROTOCOL_VERSION`] for messages this
    /// crate produces.
    pub version: u8,
    /// The serial number assigned by the sender.
    pub serial: u32,
    /// `PATH` header: the object a call targets or a signal originates from.
    pub path: Option<ObjectPath>,
    /// `INTERFACE` header.
    pub interface: Option<String>,
    /// `MEMBER` header: the method or signal name.
    pub member: Option<String>,
    /// `ERROR_NAME` header, present on `ERROR` messages.
    pub error_name: Option<String>,
    /// `REPLY_SERIAL` header: the serial of the call being replied to.
    pub reply_serial: Option<u32>,
    /// `DESTINATION` header: the bus name this message is addressed to.
    pub destination: Option<String>,
    /// `SENDER` header, filled in by the bus.
    pub sender: Option<String>,
    /// `SIGNATURE` header: the signature of `body`. `None` means an empty
    /// body.
    pub signature: Option<String>,
    /// `UNIX_FDS` header: count of file descriptors accompanying the
    /// message. This crate does not pass file descriptors and always
    /// leaves this unset on messages it builds.
    pub unix_fds: Option<u32>,
    /// The message body.
    pub body: Value,
}

impl Message {
    /// Construct a minimal method call, ready to have its `serial` assigned
    /// by a connection.
    pub fn method_call(path: ObjectPath, interface: &str, member: &str) -> Message {
        Message {
            endianness: Endianness::NATIVE,
            message_type: MessageType::MethodCall,
            flags: Flags::EMPTY,
            version: PROTOCOL_VERSION,
            serial: 0,
            path: Some(path),
            interface: Some(interface.to_string()),
            member: Some(member.to_string()),
            error_name: None,
            reply_serial: None,
            destination: None,
            sender: None,
            signature: None,
            unix_fds: None,
            body: Value::Struct(Vec::new()),
        }
    }

    /// Set the message body, deriving `signature` from `ty`'s rendering.
    pub fn with_body(mut self, ty: &Type, body: Value) -> Message {
        let rendered = ty.render();
        self.signature = if rendered.is_empty() {
            None
        } else {
            Some(rendered)
        };
        self.body = body;
        self
    }

    /// Set the `destination` header.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Message {
        self.destination = Some(destination.into());
        self
    }

    /// Build a `METHOD_RETURN` addressed back at `self`'s sender, replying
    /// to `self`'s serial.
    pub fn method_return(&self) -> Message {
        Message {
            endianness: Endianness::NATIVE,
            message_type: MessageType::MethodReturn,
            flags: Flags::EMPTY,
            version: PROTOCOL_VERSION,
            serial: 0,
            path: None,
            interface: None,
            member: None,
            error_name: None,
            reply_serial: Some(self.serial),
            destination: self.sender.clone(),
            sender: None,
            signature: None,
            unix_fds: None,
            body: Value::Struct(Vec::new()),
        }
    }

    fn header_fields(&self) -> Vec<(HeaderField, Type, Value)> {
        let mut fields = Vec::new();

        if let Some(path) = &self.path {
            fields.push((
                HeaderField::Path,
                Type::ObjectPath,
                Value::ObjectPath(path.as_str().to_string()),
            ));
        }

        if let Some(interface) = &self.interface {
            fields.push((HeaderField::Interface, Type::String, Value::String(interface.clone())));
        }

        if let Some(member) = &self.member {
            fields.push((HeaderField::Member, Type::String, Value::String(member.clone())));
        }

        if let Some(error_name) = &self.error_name {
            fields.push((
                HeaderField::ErrorName,
                Type::String,
                Value::String(error_name.clone()),
            ));
        }

        if let Some(reply_serial) = self.reply_serial {
            fields.push((
                HeaderField::ReplySerial,
                Type::Uint32,
                Value::Uint32(reply_serial),
            ));
        }

        if let Some(destination) = &self.destination {
            fields.push((
                HeaderField::Destination,
                Type::String,
                Value::String(destination.clone()),
            ));
        }

        if let Some(sender) = &self.sender {
            fields.push((HeaderField::Sender, Type::String, Value::String(sender.clone())));
        }

        if let Some(signature) = &self.signature {
            fields.push((
                HeaderField::Signature,
                Type::Signature,
                Value::Signature(signature.clone()),
            ));
        }

        if let Some(unix_fds) = self.unix_fds {
            fields.push((HeaderField::UnixFds, Type::Uint32, Value::Uint32(unix_fds)));
        }

        fields
    }
}

/// Write a complete message (header and, if present, body) into `buf`
/// starting at its current cursor, which is treated as the message origin
/// for alignment purposes.
pub fn write_message(buf: &mut Buffer, msg: &Message) -> Result<()> {
    let origin = buf.cursor();
    buf.set_endianness(msg.endianness);
    buf.write_bytes(&[msg.endianness.tag()]);
    buf.write_bytes(&[msg.message_type as u8, msg.flags.bits(), msg.version]);

    let body_length_at = buf.cursor();
    write_value(buf, origin, &Type::Uint32, &Value::Uint32(0))?;
    write_value(buf, origin, &Type::Uint32, &Value::Uint32(msg.serial))?;

    let header_fields = msg.header_fields();
    let header_items: Vec<Value> = header_fields
        .into_iter()
        .map(|(field, ty, value)| {
            Value::Struct(vec![
                Value::Byte(field.code()),
                Value::Variant(Box::new(ty), Box::new(value)),
            ])
        })
        .collect();

    let header_field_ty = Type::Struct(vec![Type::Byte, Type::Variant]);
    write_value(
        buf,
        origin,
        &Type::Array(Box::new(header_field_ty)),
        &Value::Array(header_items),
    )?;

    buf.align_write(origin, 8);

    let body_start = buf.cursor();

    if let Some(signature) = &msg.signature {
        let body_ty = Type::parse(signature)?;
        write_value(buf, origin, &body_ty, &msg.body)?;
    }

    let body_len = (buf.cursor() - body_start) as u32;
    let end = buf.cursor();
    buf.set_cursor(body_length_at);
    write_value(buf, origin, &Type::Uint32, &Value::Uint32(body_len))?;
    buf.set_cursor(end);

    Ok(())
}

/// Read a message's fixed header and header-field array, without reading
/// the body. `body_length` and `signature` in the result tell the caller
/// how many more bytes to make available before calling [`read_body`].
pub fn read_message_header(buf: &mut Buffer) -> Result<(Message, u32)> {
    let origin = buf.cursor();
    let tag = buf.read_bytes(1)?[0];
    let endianness = Endianness::from_tag(tag)?;
    buf.set_endianness(endianness);

    let type_flags_version = buf.read_bytes(3)?;
    let message_type = MessageType::from_code(type_flags_version[0])?;
    let flags = Flags::from_bits(type_flags_version[1]);
    let version = type_flags_version[2];

    let Value::Uint32(body_length) = read_value(buf, origin, &Type::Uint32)? else {
        unreachable!("Type::Uint32 always reads a Value::Uint32")
    };

    let Value::Uint32(serial) = read_value(buf, origin, &Type::Uint32)? else {
        unreachable!("Type::Uint32 always reads a Value::Uint32")
    };

    let header_field_ty = Type::Array(Box::new(Type::Struct(vec![Type::Byte, Type::Variant])));
    let Value::Array(entries) = read_value(buf, origin, &header_field_ty)? else {
        unreachable!("Type::Array always reads a Value::Array")
    };

    let mut msg = Message {
        endianness,
        message_type,
        flags,
        version,
        serial,
        path: None,
        interface: None,
        member: None,
        error_name: None,
        reply_serial: None,
        destination: None,
        sender: None,
        signature: None,
        unix_fds: None,
        body: Value::Struct(Vec::new()),
    };

    for entry in entries {
        let Value::Struct(fields) = entry else {
            return Err(Error::new(ErrorKind::TruncatedMessage));
        };

        let [Value::Byte(code), Value::Variant(_, value)] = <[Value; 2]>::try_from(fields)
            .map_err(|_| Error::new(ErrorKind::TruncatedMessage))?
        else {
            return Err(Error::new(ErrorKind::TruncatedMessage));
        };

        let field = HeaderField::from_code(code)?;

        match (field, *value) {
            (HeaderField::Path, Value::ObjectPath(path)) => {
                msg.path = Some(ObjectPath::new(path)?);
            }
            (HeaderField::Interface, Value::String(s)) => msg.interface = Some(s),
            (HeaderField::Member, Value::String(s)) => msg.member = Some(s),
            (HeaderField::ErrorName, Value::String(s)) => msg.error_name = Some(s),
            (HeaderField::ReplySerial, Value::Uint32(v)) => msg.reply_serial = Some(v),
            (HeaderField::Destination, Value::String(s)) => msg.destination = Some(s),
            (HeaderField::Sender, Value::String(s)) => msg.sender = Some(s),
            (HeaderField::Signature, Value::Signature(s)) => msg.signature = Some(s),
            (HeaderField::UnixFds, Value::Uint32(v)) => msg.unix_fds = Some(v),
            _ => return Err(Error::new(ErrorKind::TruncatedMessage)),
        }
    }

    buf.align_read(origin, 8)?;

    Ok((msg, body_length))
}

/// Read a body value of the shape described by `signature`.
pub fn read_body(buf: &mut Buffer, origin: usize, signature: &str) -> Result<Value> {
    let body_ty = Type::parse(signature)?;
    read_value(buf, origin, &body_ty)
}

/// Read a complete message: header, then body if `signature` is present.
pub fn read_message(buf: &mut Buffer) -> Result<Message> {
    let origin = buf.cursor();
    let (mut msg, body_length) = read_message_header(buf)?;

    if let Some(signature) = msg.signature.clone() {
        if body_length > 0 {
            msg.body = read_body(buf, origin, &signature)?;
        }
    }

    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_call_round_trips() {
        let mut msg = Message::method_call(
            ObjectPath::new("/org/freedesktop/DBus").unwrap(),
            "org.freedesktop.DBus",
            "Hello",
        )
        .with_destination("org.freedesktop.DBus");
        msg.serial = 1;

        let mut buf = Buffer::new();
        write_message(&mut buf, &msg).unwrap();
        buf.flip();

        let read_back = read_message(&mut buf).unwrap();
        assert_eq!(read_back.message_type, MessageType::MethodCall);
        assert_eq!(read_back.member.as_deref(), Some("Hello"));
        assert_eq!(read_back.interface.as_deref(), Some("org.freedesktop.DBus"));
        assert_eq!(read_back.destination.as_deref(), Some("org.freedesktop.DBus"));
        assert_eq!(read_back.serial, 1);
        assert_eq!(read_back.signature, None);
    }

    #[test]
    fn method_call_with_body_round_trips() {
        let mut msg = Message::method_call(
            ObjectPath::new("/org/freedesktop/DBus").unwrap(),
            "org.freedesktop.DBus",
            "RequestName",
        )
        .with_body(
            &Type::Tuple(vec![Type::String, Type::Uint32]),
            Value::Struct(vec![Value::String("com.example.Foo".into()), Value::Uint32(4)]),
        );
        msg.serial = 2;

        let mut buf = Buffer::new();
        write_message(&mut buf, &msg).unwrap();
        buf.flip();

        let read_back = read_message(&mut buf).unwrap();
        assert_eq!(read_back.signature.as_deref(), Some("su"));
        assert_eq!(
            read_back.body,
            Value::Struct(vec![Value::String("com.example.Foo".into()), Value::Uint32(4)])
        );
    }

    #[test]
    fn method_return_carries_reply_serial() {
        let mut call = Message::method_call(ObjectPath::root(), "org.example.I", "M");
        call.serial = 7;
        call.sender = Some(":1.42".into());

        let reply = call.method_return();
        assert_eq!(reply.reply_serial, Some(7));
        assert_eq!(reply.destination.as_deref(), Some(":1.42"));
    }
}
