//! The connection state machine: a background read loop, serial allocation,
//! and reply correlation on top of a handshaked [`Transport`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::AsyncReadExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::buffer::Buffer;
use crate::error::{Error, ErrorKind, Result};
use crate::message::{read_message, write_message, Message};
use crate::object_path::ObjectPath;
use crate::protocol::{Endianness, Flags, MessageType};
use crate::transport::Transport;
use crate::value::Value;

/// Called for every message the background read loop observes, including
/// ones that also resolve a pending reply. Signals are only ever delivered
/// this way.
pub type SignalHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// A live connection to a bus, past the SASL handshake and `Hello` call.
///
/// Cloning a `Connection` is not supported; wrap it in an `Arc` to share it
/// across tasks. `send`/`call` take `&self` and may be called concurrently
/// from multiple tasks, serialized internally by the write lock.
pub struct Connection {
    write_half: AsyncMutex<OwnedWriteHalf>,
    serial: AtomicU32,
    pending: Arc<StdMutex<HashMap<u32, oneshot::Sender<Result<Message>>>>>,
    terminal_error: Arc<StdMutex<Option<String>>>,
    unique_name: StdMutex<Option<String>>,
    read_task: JoinHandle<()>,
}

impl Connection {
    /// Connect to the session bus and complete the `Hello` handshake.
    pub async fn session_bus(handler: SignalHandler) -> Result<Connection> {
        Self::new(Transport::session_bus().await?, handler).await
    }

    /// Connect to the system bus and complete the `Hello` handshake.
    pub async fn system_bus(handler: SignalHandler) -> Result<Connection> {
        Self::new(Transport::system_bus().await?, handler).await
    }

    async fn new(transport: Transport, handler: SignalHandler) -> Result<Connection> {
        let (stream, leftover) = transport.into_split();
        let (read_half, write_half) = stream.into_split();

        let pending = Arc::new(StdMutex::new(HashMap::new()));
        let terminal_error = Arc::new(StdMutex::new(None));

        let read_task = tokio::spawn(read_loop(
            read_half,
            leftover,
            pending.clone(),
            terminal_error.clone(),
            handler,
        ));

        let conn = Connection {
            write_half: AsyncMutex::new(write_half),
            serial: AtomicU32::new(0),
            pending,
            terminal_error,
            unique_name: StdMutex::new(None),
            read_task,
        };

        conn.hello().await?;
        Ok(conn)
    }

    /// This connection's bus-assigned unique name, such as `:1.42`, set
    /// once `Hello` completes.
    pub fn unique_name(&self) -> Option<String> {
        self.unique_name.lock().unwrap().clone()
    }

    fn next_serial(&self) -> u32 {
        self.serial.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Send `msg`, assigning it a fresh serial. Returns the reply if one is
    /// expected (a `METHOD_CALL` without `NO_REPLY_EXPECTED`), or `None`
    /// otherwise.
    ///
    /// Serial allocation happens under the write-half lock, not before it:
    /// two callers racing here must not be able to allocate serials in one
    /// order and then flush to the socket in the other, which would break
    /// the connection's FIFO-serial guarantee.
    pub async fn send(&self, mut msg: Message) -> Result<Option<Message>> {
        if self.terminal_error.lock().unwrap().is_some() {
            return Err(Error::new(ErrorKind::ConnectionClosed));
        }

        msg.endianness = Endianness::NATIVE;

        let expects_reply =
            msg.message_type == MessageType::MethodCall && !(msg.flags & Flags::NO_REPLY_EXPECTED);

        let mut write_half = self.write_half.lock().await;

        let serial = self.next_serial();
        msg.serial = serial;

        let receiver = if expects_reply {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().insert(serial, tx);
            Some(rx)
        } else {
            None
        };

        let mut buf = Buffer::new();
        if let Err(err) = write_message(&mut buf, &msg) {
            if let Some(tx) = self.pending.lock().unwrap().remove(&serial) {
                let _ = tx.send(Err(Error::new(ErrorKind::ConnectionClosed)));
            }
            return Err(err);
        }
        buf.flip();

        if let Err(err) = write_all(&mut write_half, buf.remaining()).await {
            if let Some(tx) = self.pending.lock().unwrap().remove(&serial) {
                let _ = tx.send(Err(Error::new(ErrorKind::ConnectionClosed)));
            }
            return Err(err);
        }

        drop(write_half);

        match receiver {
            Some(rx) => match rx.await {
                Ok(result) => result.map(Some),
                Err(_) => Err(Error::new(ErrorKind::ConnectionClosed)),
            },
            None => Ok(None),
        }
    }

    /// Send a `METHOD_CALL` and await its reply, failing if the reply is an
    /// `ERROR` message or if the call used `NO_REPLY_EXPECTED` (in which
    /// case there is nothing to await).
    pub async fn call(&self, msg: Message) -> Result<Message> {
        let reply = self
            .send(msg)
            .await?
            .ok_or_else(|| Error::new(ErrorKind::ConnectionClosed))?;

        if reply.message_type == MessageType::Error {
            let name = reply.error_name.clone().unwrap_or_default();
            let message = match &reply.body {
                Value::String(s) => s.clone(),
                _ => String::new(),
            };
            tracing::debug!(error_name = %name, "bus call returned an error reply");
            return Err(Error::new(ErrorKind::BusError {
                name: name.into(),
                message: message.into(),
            }));
        }

        Ok(reply)
    }

    async fn hello(&self) -> Result<()> {
        let call = Message::method_call(ObjectPath::root(), "org.freedesktop.DBus", "Hello")
            .with_destination("org.freedesktop.DBus");

        let reply = self.call(call).await?;

        let Value::String(name) = reply.body else {
            return Err(Error::new(ErrorKind::BusError {
                name: "org.freedesktop.DBus.Error.Failed".into(),
                message: "Hello reply did not contain a unique name".into(),
            }));
        };

        tracing::debug!(unique_name = %name, "Hello completed");
        *self.unique_name.lock().unwrap() = Some(name);
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

async fn write_all(write_half: &mut OwnedWriteHalf, bytes: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;
    write_half.write_all(bytes).await?;
    Ok(())
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    leftover: Vec<u8>,
    pending: Arc<StdMutex<HashMap<u32, oneshot::Sender<Result<Message>>>>>,
    terminal_error: Arc<StdMutex<Option<String>>>,
    handler: SignalHandler,
) {
    let mut carry = leftover;

    loop {
        match read_one_message(&mut read_half, &mut carry).await {
            Ok(msg) => {
                if let Some(reply_serial) = msg.reply_serial {
                    if let Some(tx) = pending.lock().unwrap().remove(&reply_serial) {
                        let _ = tx.send(Ok(msg.clone()));
                    }
                }

                handler(msg);
            }
            Err(err) => {
                tracing::error!(error = %err, "read loop terminated");
                *terminal_error.lock().unwrap() = Some(err.to_string());
                break;
            }
        }
    }

    for (_, tx) in pending.lock().unwrap().drain() {
        let _ = tx.send(Err(Error::new(ErrorKind::ConnectionClosed)));
    }
}

async fn read_one_message(read_half: &mut OwnedReadHalf, carry: &mut Vec<u8>) -> Result<Message> {
    loop {
        let mut buf = Buffer::new();
        buf.write_bytes(carry);
        buf.flip();

        match read_message(&mut buf) {
            Ok(msg) => {
                let consumed = buf.cursor();
                carry.drain(..consumed);
                return Ok(msg);
            }
            Err(err) if matches!(err.kind(), ErrorKind::TruncatedMessage) => {
                let mut scratch = [0u8; 4096];
                let n = read_half.read(&mut scratch).await?;

                if n == 0 {
                    return Err(Error::new(ErrorKind::ConnectionClosed));
                }

                carry.extend_from_slice(&scratch[..n]);
            }
            Err(err) => return Err(err),
        }
    }
}
