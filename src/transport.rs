//! The Unix-domain socket transport and the SASL handshake that brings it
//! up to the point where binary D-Bus messages can flow.

use std::env;

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::{Error, ErrorKind, Result};
use crate::sasl;

const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
const DEFAULT_SYSTEM_BUS_PATH: &str = "/run/dbus/system_bus_socket";

/// A transport that has completed the SASL handshake and is ready to carry
/// binary D-Bus messages.
pub struct Transport {
    stream: UnixStream,
    /// Bytes read past the `BEGIN` acknowledgement that already belong to
    /// the binary stream.
    pub leftover: Vec<u8>,
}

impl Transport {
    /// Connect to the session bus named by `DBUS_SESSION_BUS_ADDRESS` and
    /// perform the SASL handshake.
    pub async fn session_bus() -> Result<Self> {
        let path = resolve_session_address()?;
        Self::connect_and_handshake(&path).await
    }

    /// Connect to the system bus (`DBUS_SYSTEM_BUS_ADDRESS`, falling back to
    /// the well-known path) and perform the SASL handshake.
    pub async fn system_bus() -> Result<Self> {
        let path = resolve_system_address()?;
        Self::connect_and_handshake(&path).await
    }

    async fn connect_and_handshake(path: &str) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        let mut transport = Transport {
            stream,
            leftover: Vec::new(),
        };
        transport.handshake().await?;
        Ok(transport)
    }

    /// Run the SASL `EXTERNAL` handshake: NUL byte, `AUTH EXTERNAL`, `DATA`
    /// (empty field, deferring to the peer credential already attached to
    /// the socket), `NEGOTIATE_UNIX_FD`, `BEGIN`, then read until `OK` (and
    /// any `AGREE_UNIX_FD`) is seen. Bytes read past the point the server
    /// acknowledges `BEGIN` already belong to the binary stream and are
    /// kept in `self.leftover`.
    async fn handshake(&mut self) -> Result<()> {
        tracing::debug!("starting SASL EXTERNAL handshake");

        let mut out = Vec::new();
        out.push(0u8);
        out.extend_from_slice(sasl::AUTH_EXTERNAL.as_bytes());
        out.extend_from_slice(sasl::DATA.as_bytes());
        out.extend_from_slice(sasl::NEGOTIATE_UNIX_FD.as_bytes());
        out.extend_from_slice(sasl::BEGIN.as_bytes());
        self.stream.write_all(&out).await?;

        let mut pending = Vec::new();
        let mut read_buf = [0u8; 1024];
        let mut authenticated = false;

        loop {
            while let Some(pos) = find_crlf(&pending) {
                let line = pending.drain(..pos + 2).collect::<Vec<u8>>();
                let line = std::str::from_utf8(&line)?;

                match sasl::parse_reply(line)? {
                    sasl::SaslReply::Ok(guid) => {
                        tracing::debug!(guid = %guid, "SASL handshake succeeded");
                        authenticated = true;
                    }
                    sasl::SaslReply::AgreeUnixFd => {}
                    sasl::SaslReply::Rejected(mechanisms) => {
                        tracing::warn!(mechanisms = %mechanisms, "bus rejected EXTERNAL authentication");
                        return Err(Error::new(ErrorKind::AuthenticationFailed(
                            format!("server rejected EXTERNAL, offers: {mechanisms}").into(),
                        )));
                    }
                    sasl::SaslReply::Error(message) => {
                        tracing::warn!(message = %message, "bus reported a SASL protocol error");
                        return Err(Error::new(ErrorKind::AuthenticationFailed(message.into())));
                    }
                }

                if authenticated {
                    self.leftover = pending;
                    return Ok(());
                }
            }

            let n = self.stream.read(&mut read_buf).await?;

            if n == 0 {
                tracing::warn!("connection closed during SASL handshake");
                return Err(Error::new(ErrorKind::AuthenticationFailed(
                    "connection closed during SASL handshake".into(),
                )));
            }

            pending.extend_from_slice(&read_buf[..n]);
        }
    }

    /// Write raw bytes to the socket.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Read at least one byte from the socket, appending to `buf`. Returns
    /// the number of bytes read; `0` means the peer closed the connection.
    pub async fn read_some(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        if !self.leftover.is_empty() {
            let leftover = std::mem::take(&mut self.leftover);
            let n = leftover.len();
            buf.extend_from_slice(&leftover);
            return Ok(n);
        }

        let mut scratch = [0u8; 4096];
        let n = self.stream.read(&mut scratch).await?;
        buf.extend_from_slice(&scratch[..n]);
        Ok(n)
    }

    /// Split into owned halves for independent concurrent read/write tasks,
    /// handing back any bytes already read past the SASL handshake so the
    /// caller can fold them into its first read.
    pub fn into_split(self) -> (UnixStream, Vec<u8>) {
        (self.stream, self.leftover)
    }
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\r\n")
}

fn resolve_session_address() -> Result<String> {
    let address = env::var(ENV_SESSION_BUS).map_err(|_| Error::new(ErrorKind::MissingBus))?;
    parse_unix_path(&address)
}

fn resolve_system_address() -> Result<String> {
    match env::var(ENV_SYSTEM_BUS) {
        Ok(address) => parse_unix_path(&address),
        Err(_) => Ok(DEFAULT_SYSTEM_BUS_PATH.to_string()),
    }
}

/// Parse a `unix:path=<fs-path>` bus address.
fn parse_unix_path(address: &str) -> Result<String> {
    let re = Regex::new(r"unix:path=(.*)").expect("static regex is valid");

    match re.captures(address) {
        Some(captures) => Ok(captures[1].to_string()),
        None => Err(Error::new(ErrorKind::InvalidAddress(address.into()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_path_address() {
        assert_eq!(
            parse_unix_path("unix:path=/run/user/1000/bus").unwrap(),
            "/run/user/1000/bus"
        );
    }

    #[test]
    fn rejects_non_unix_address() {
        assert!(parse_unix_path("tcp:host=localhost,port=1234").is_err());
    }

    #[test]
    fn finds_crlf() {
        assert_eq!(find_crlf(b"OK guid\r\nrest"), Some(7));
        assert_eq!(find_crlf(b"no terminator"), None);
    }
}
