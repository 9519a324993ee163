//! A small demo binary layered over [`zephyr_dbus::Connection`]: connects,
//! completes `Hello`, and issues one method call named on the command
//! line. Not a general-purpose `dbus-send` replacement.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use zephyr_dbus::connection::Connection;
use zephyr_dbus::message::Message;
use zephyr_dbus::object_path::ObjectPath;
use zephyr_dbus::signature::Type;
use zephyr_dbus::value::Value;

/// Call a single D-Bus method and print the reply.
#[derive(Parser, Debug)]
#[command(name = "dbus-cli", version, about)]
struct Args {
    /// Connect to the system bus instead of the session bus.
    #[arg(long)]
    system: bool,

    /// Destination bus name, e.g. `org.freedesktop.DBus`.
    #[arg(long)]
    destination: String,

    /// Object path the method is called on.
    #[arg(long)]
    path: String,

    /// Interface the method belongs to.
    #[arg(long)]
    interface: String,

    /// Method name to call.
    #[arg(long)]
    method: String,

    /// A single string argument to pass to the method, if any.
    #[arg(long)]
    arg: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            warn!(error = %err, "call failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> zephyr_dbus::Result<()> {
    let handler: Arc<dyn Fn(Message) + Send + Sync> = Arc::new(|msg: Message| {
        info!(message_type = ?msg.message_type, member = ?msg.member, "received message");
    });

    info!(system = args.system, "connecting");

    let conn = if args.system {
        Connection::system_bus(handler).await?
    } else {
        Connection::session_bus(handler).await?
    };

    info!(unique_name = ?conn.unique_name(), "connected");

    let path = ObjectPath::new(args.path)?;
    let mut call = Message::method_call(path, &args.interface, &args.method)
        .with_destination(&args.destination);

    if let Some(arg) = args.arg {
        call = call.with_body(&Type::String, Value::String(arg));
    }

    let reply = conn.call(call).await?;
    info!(body = ?reply.body, "reply received");
    println!("{:#?}", reply.body);

    Ok(())
}
