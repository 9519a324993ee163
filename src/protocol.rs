//! Wire-level constants for the D-Bus protocol: endianness tags, message
//! types, header flags, and the header field code table.

use std::fmt;
use std::ops::{BitAnd, BitOr};

use crate::error::{Error, ErrorKind, Result};

/// The byte-order a message was (or will be) marshalled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Endianness {
    /// Little endian, tagged `'l'` on the wire.
    Little = b'l',
    /// Big endian, tagged `'B'` on the wire.
    Big = b'B',
}

impl Endianness {
    /// The endianness of the machine this code runs on.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = Self::Little;
    /// The endianness of the machine this code runs on.
    #[cfg(target_endian = "big")]
    pub const NATIVE: Self = Self::Big;

    /// Decode the wire tag byte.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            b'l' => Ok(Self::Little),
            b'B' => Ok(Self::Big),
            _ => Err(Error::new(ErrorKind::InvalidHeaderField(tag))),
        }
    }

    /// The wire tag byte for this endianness.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Self::NATIVE
    }
}

/// The type of a message, stored as the third byte of the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// A method call, which may prompt a `METHOD_RETURN` or `ERROR` reply.
    MethodCall = 1,
    /// A successful reply to a method call.
    MethodReturn = 2,
    /// An error reply to a method call.
    Error = 3,
    /// A signal emission; never replied to.
    Signal = 4,
}

impl MessageType {
    pub(crate) fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            1 => Self::MethodCall,
            2 => Self::MethodReturn,
            3 => Self::Error,
            4 => Self::Signal,
            _ => return Err(Error::new(ErrorKind::InvalidHeaderField(code))),
        })
    }
}

/// A set of flags carried in the fixed header.
///
/// # Examples
///
/// ```
/// use zephyr_dbus::protocol::Flags;
///
/// let flags = Flags::EMPTY;
/// assert!(!(flags & Flags::NO_REPLY_EXPECTED));
///
/// let flags = Flags::EMPTY | Flags::NO_REPLY_EXPECTED;
/// assert!(flags & Flags::NO_REPLY_EXPECTED);
/// assert!(!(flags & Flags::NO_AUTO_START));
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Flags(pub(crate) u8);

impl Flags {
    /// No flags set.
    pub const EMPTY: Self = Self(0);
    /// The sender does not want a reply, even for a message type that would
    /// normally warrant one.
    pub const NO_REPLY_EXPECTED: Self = Self(0x01);
    /// The bus must not auto-start a service to own the destination name.
    pub const NO_AUTO_START: Self = Self(0x02);
    /// The caller is prepared to wait for interactive authorization. The
    /// D-Bus specification assigns this bit `0x04`; some older
    /// implementations mistakenly use `0x03`, which this crate does not.
    pub const ALLOW_INTERACTIVE_AUTHORIZATION: Self = Self(0x04);

    pub(crate) fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub(crate) fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Flags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for Flags {
    type Output = bool;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        self.0 & rhs.0 != 0
    }
}

/// A header field code, as carried in the `(byte, variant)` pairs of the
/// header field array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeaderField {
    /// The object path a call targets or a signal is emitted from.
    Path = 1,
    /// The interface a call or signal belongs to.
    Interface = 2,
    /// The method or signal name.
    Member = 3,
    /// The error name, present only on `ERROR` messages.
    ErrorName = 4,
    /// The serial number of the message being replied to.
    ReplySerial = 5,
    /// The bus name this message is addressed to.
    Destination = 6,
    /// The unique name of the sender, set by the bus.
    Sender = 7,
    /// The signature of the message body.
    Signature = 8,
    /// The number of file descriptors accompanying the message.
    UnixFds = 9,
}

impl HeaderField {
    pub(crate) fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            1 => Self::Path,
            2 => Self::Interface,
            3 => Self::Member,
            4 => Self::ErrorName,
            5 => Self::ReplySerial,
            6 => Self::Destination,
            7 => Self::Sender,
            8 => Self::Signature,
            9 => Self::UnixFds,
            other => return Err(Error::new(ErrorKind::InvalidHeaderField(other))),
        })
    }

    pub(crate) fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeaderField::Path => "PATH",
            HeaderField::Interface => "INTERFACE",
            HeaderField::Member => "MEMBER",
            HeaderField::ErrorName => "ERROR_NAME",
            HeaderField::ReplySerial => "REPLY_SERIAL",
            HeaderField::Destination => "DESTINATION",
            HeaderField::Sender => "SENDER",
            HeaderField::Signature => "SIGNATURE",
            HeaderField::UnixFds => "UNIX_FDS",
        };
        f.write_str(name)
    }
}
