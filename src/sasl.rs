//! The SASL `EXTERNAL` handshake D-Bus uses to authenticate a freshly
//! connected Unix domain socket.

use crate::error::{Error, ErrorKind, Result};

/// The `AUTH EXTERNAL\r\n` line that starts the handshake. The EXTERNAL
/// mechanism's data field is left for the following `DATA` line.
pub const AUTH_EXTERNAL: &str = "AUTH EXTERNAL\r\n";

/// The `DATA\r\n` line with an empty data field: the bus accepts this as
/// "use the peer credential already attached to the socket" rather than
/// requiring the client to restate its uid.
pub const DATA: &str = "DATA\r\n";

/// The `NEGOTIATE_UNIX_FD\r\n` line. This crate never actually passes file
/// descriptors but still negotiates the capability, matching what real bus
/// daemons expect to see during the handshake.
pub const NEGOTIATE_UNIX_FD: &str = "NEGOTIATE_UNIX_FD\r\n";

/// The `BEGIN\r\n` line that ends the SASL phase and switches the socket
/// over to the binary D-Bus wire protocol.
pub const BEGIN: &str = "BEGIN\r\n";

/// A line received from the server during the SASL phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslReply {
    /// `OK <guid>`: authentication succeeded; `guid` identifies the server.
    Ok(String),
    /// `AGREE_UNIX_FD`: the server accepts unix-fd passing.
    AgreeUnixFd,
    /// `REJECTED <mechanisms>`: authentication failed; lists mechanisms the
    /// server would accept instead.
    Rejected(String),
    /// `ERROR <message>`: the server could not parse the previous line.
    Error(String),
}

/// Parse one CRLF-terminated line received during the SASL phase.
pub fn parse_reply(line: &str) -> Result<SaslReply> {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(guid) = line.strip_prefix("OK ") {
        return Ok(SaslReply::Ok(guid.to_string()));
    }

    if line == "AGREE_UNIX_FD" {
        return Ok(SaslReply::AgreeUnixFd);
    }

    if let Some(mechanisms) = line.strip_prefix("REJECTED") {
        return Ok(SaslReply::Rejected(mechanisms.trim().to_string()));
    }

    if let Some(message) = line.strip_prefix("ERROR") {
        return Ok(SaslReply::Error(message.trim().to_string()));
    }

    Err(Error::new(ErrorKind::AuthenticationFailed(
        format!("unrecognized SASL reply line: {line:?}").into(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_data_lines_carry_no_payload() {
        assert_eq!(AUTH_EXTERNAL, "AUTH EXTERNAL\r\n");
        assert_eq!(DATA, "DATA\r\n");
    }

    #[test]
    fn parses_ok_reply_with_guid() {
        assert_eq!(
            parse_reply("OK 1234deadbeef\r\n").unwrap(),
            SaslReply::Ok("1234deadbeef".to_string())
        );
    }

    #[test]
    fn parses_rejected_and_error() {
        assert_eq!(
            parse_reply("REJECTED EXTERNAL DBUS_COOKIE_SHA1\r\n").unwrap(),
            SaslReply::Rejected("EXTERNAL DBUS_COOKIE_SHA1".to_string())
        );
        assert!(matches!(parse_reply("ERROR\r\n").unwrap(), SaslReply::Error(_)));
    }

    #[test]
    fn rejects_unrecognized_line() {
        assert!(parse_reply("NONSENSE\r\n").is_err());
    }
}
