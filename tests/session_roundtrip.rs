//! Exercises the SASL handshake and the `Hello` call against a fake bus
//! daemon speaking the real wire protocol over a loopback Unix socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

use zephyr_dbus::buffer::Buffer;
use zephyr_dbus::connection::Connection;
use zephyr_dbus::message::{read_message, write_message, Message};
use zephyr_dbus::signature::Type;
use zephyr_dbus::value::Value;

#[tokio::test]
async fn hello_handshake_round_trips_over_a_fake_bus() {
    let path = std::env::temp_dir().join(format!("zephyr-dbus-test-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let listener = UnixListener::bind(&path).expect("bind fake bus socket");

    std::env::set_var(
        "DBUS_SESSION_BUS_ADDRESS",
        format!("unix:path={}", path.display()),
    );

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");

        let mut pending = Vec::new();
        let mut scratch = [0u8; 1024];

        while !pending.ends_with(b"BEGIN\r\n") {
            let n = stream.read(&mut scratch).await.expect("read sasl");
            pending.extend_from_slice(&scratch[..n]);
        }

        stream
            .write_all(b"OK 0123456789abcdef0123456789abcdef\r\n")
            .await
            .expect("write OK");

        let mut raw = Vec::new();

        let hello = loop {
            let mut buf = Buffer::new();
            buf.write_bytes(&raw);
            buf.flip();

            match read_message(&mut buf) {
                Ok(msg) => break msg,
                Err(_) => {
                    let n = stream.read(&mut scratch).await.expect("read hello");
                    raw.extend_from_slice(&scratch[..n]);
                }
            }
        };

        assert_eq!(hello.member.as_deref(), Some("Hello"));
        assert_eq!(hello.interface.as_deref(), Some("org.freedesktop.DBus"));

        let mut reply = hello
            .method_return()
            .with_body(&Type::String, Value::String(":1.1".to_string()));
        reply.serial = 1;

        let mut out = Buffer::new();
        write_message(&mut out, &reply).expect("write reply");
        out.flip();
        stream.write_all(out.remaining()).await.expect("write reply bytes");
    });

    let handler: Arc<dyn Fn(Message) + Send + Sync> = Arc::new(|_msg: Message| {});

    let conn = tokio::time::timeout(Duration::from_secs(5), Connection::session_bus(handler))
        .await
        .expect("connect timed out")
        .expect("connect failed");

    assert_eq!(conn.unique_name().as_deref(), Some(":1.1"));

    server.await.expect("server task panicked");
    let _ = std::fs::remove_file(&path);
}
