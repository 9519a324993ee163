//! The crate-wide error type.

use std::fmt;
use std::io;
use std::str::Utf8Error;

/// Result alias using [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    /// Test if the error indicates that the underlying socket operation
    /// would have blocked and should be retried.
    #[inline]
    pub(crate) fn would_block(&self) -> bool {
        matches!(self.kind, ErrorKind::Io(ref e) if e.kind() == io::ErrorKind::WouldBlock)
    }

    /// Access the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::new(ErrorKind::Io(error))
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Utf8(error) => Some(error),
            _ => None,
        }
    }
}

/// The specific kind of error produced by this crate.
///
/// Matched on by callers that want to distinguish between, say, a bus error
/// reply and a transport failure. See the crate documentation for the
/// taxonomy this follows.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A socket read, write, or connect failed, or the peer closed the
    /// connection (EOF while expecting more bytes).
    Io(io::Error),
    /// A string read from a buffer was not valid UTF-8.
    Utf8(Utf8Error),
    /// The SASL handshake did not produce an `OK` response.
    AuthenticationFailed(Box<str>),
    /// A signature string was malformed or contained an unbalanced or
    /// out-of-context construct.
    InvalidSignature(Box<str>),
    /// A wire boolean was neither `0` nor `1`.
    InvalidBoolean(u32),
    /// A header field code fell outside `1..=9`.
    InvalidHeaderField(u8),
    /// A read ran past the bytes available in the buffer.
    TruncatedMessage,
    /// A read or write landed on a boundary that was not a multiple of the
    /// alignment required at that point in the message.
    BadAlignment,
    /// Buffer growth was refused; this should not normally happen since
    /// buffers grow automatically.
    BufferExhausted,
    /// A value could not be mapped to a D-Bus type at marshalling time.
    UnknownType,
    /// `send` was called after the background read loop had already
    /// terminated.
    ConnectionClosed,
    /// The peer returned an `ERROR` message in reply to a method call.
    BusError {
        /// The `ERROR_NAME` header of the reply.
        name: Box<str>,
        /// The human-readable message from the body, if any.
        message: Box<str>,
    },
    /// The `Introspect` reply's XML body could not be parsed.
    Introspection(Box<str>),
    /// Neither `DBUS_SESSION_BUS_ADDRESS`/`DBUS_SYSTEM_BUS_ADDRESS` was set
    /// nor a default address applied.
    MissingBus,
    /// A bus address did not match the `unix:path=...` form this crate
    /// supports.
    InvalidAddress(Box<str>),
    /// An object path failed validation.
    InvalidObjectPath(Box<str>),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Utf8(error) => error.fmt(f),
            ErrorKind::AuthenticationFailed(reason) => {
                write!(f, "SASL authentication failed: {reason}")
            }
            ErrorKind::InvalidSignature(sig) => write!(f, "invalid signature `{sig}`"),
            ErrorKind::InvalidBoolean(value) => write!(f, "invalid boolean wire value {value}"),
            ErrorKind::InvalidHeaderField(code) => write!(f, "invalid header field code {code}"),
            ErrorKind::TruncatedMessage => write!(f, "message was truncated"),
            ErrorKind::BadAlignment => write!(f, "read or write at incorrect alignment"),
            ErrorKind::BufferExhausted => write!(f, "buffer exhausted and growth was refused"),
            ErrorKind::UnknownType => write!(f, "value has no corresponding D-Bus type"),
            ErrorKind::ConnectionClosed => write!(f, "connection is closed"),
            ErrorKind::BusError { name, message } => write!(f, "{name}: {message}"),
            ErrorKind::Introspection(reason) => write!(f, "failed to parse introspection xml: {reason}"),
            ErrorKind::MissingBus => write!(f, "no bus address available"),
            ErrorKind::InvalidAddress(address) => write!(f, "invalid bus address `{address}`"),
            ErrorKind::InvalidObjectPath(path) => write!(f, "invalid object path `{path}`"),
        }
    }
}
